//! Order notification emails.
//!
//! Notifications are dispatched to the [`TaskQueue`]; an order is never rolled
//! back or delayed because an email could not be sent.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType,
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;

use bytestall_core::{Email, Order};

use super::tasks::TaskQueue;
use crate::config::EmailConfig;

/// Errors that can occur when sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

/// The parts of an order that go into a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub order_id: String,
    pub customer_email: Email,
    pub customer_name: String,
    pub total: String,
    pub status: String,
    pub payment_method: String,
    pub items: Vec<String>,
}

impl OrderSummary {
    #[must_use]
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id.to_string(),
            customer_email: order.user_email.clone(),
            customer_name: order.user_name.clone(),
            total: order.total_price().display(),
            status: order.status.label().to_owned(),
            payment_method: order.payment_method.clone(),
            items: order
                .items
                .iter()
                .map(|line| format!("{} x{}", line.title, line.quantity))
                .collect(),
        }
    }

    fn body(&self, greeting: &str) -> String {
        format!(
            "{greeting}\n\nOrder: {}\nCustomer: {} <{}>\nPayment method: {}\nStatus: {}\nTotal: {}\n\nItems:\n{}\n",
            self.order_id,
            self.customer_name,
            self.customer_email,
            self.payment_method,
            self.status,
            self.total,
            self.items
                .iter()
                .map(|item| format!("  - {item}"))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

/// Outbound order notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tell the operator a new order needs attention.
    async fn notify_admin(&self, summary: &OrderSummary) -> Result<(), NotifyError>;

    /// Confirm the order to the customer.
    async fn notify_customer(&self, summary: &OrderSummary) -> Result<(), NotifyError>;
}

/// SMTP notifier.
#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    admin_address: Email,
}

impl SmtpNotifier {
    /// Create a new SMTP notifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            admin_address: config.admin_address.clone(),
        })
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| NotifyError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| NotifyError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify_admin(&self, summary: &OrderSummary) -> Result<(), NotifyError> {
        self.send(
            self.admin_address.as_str(),
            &format!("New order {} awaiting verification", summary.order_id),
            summary.body("A new order was placed."),
        )
        .await
    }

    async fn notify_customer(&self, summary: &OrderSummary) -> Result<(), NotifyError> {
        self.send(
            summary.customer_email.as_str(),
            &format!("We received your order {}", summary.order_id),
            summary.body(&format!(
                "Hi {}, thanks for your order. We'll email you once payment is verified.",
                summary.customer_name
            )),
        )
        .await
    }
}

/// Notifier that only logs. Used when SMTP is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_admin(&self, summary: &OrderSummary) -> Result<(), NotifyError> {
        tracing::info!(order_id = %summary.order_id, total = %summary.total, "Admin notification (SMTP disabled)");
        Ok(())
    }

    async fn notify_customer(&self, summary: &OrderSummary) -> Result<(), NotifyError> {
        tracing::info!(order_id = %summary.order_id, to = %summary.customer_email, "Customer notification (SMTP disabled)");
        Ok(())
    }
}

/// Dispatches notifications onto the background queue.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    queue: TaskQueue,
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>, queue: TaskQueue) -> Self {
        Self { notifier, queue }
    }

    /// Queue the admin and customer emails for a newly placed order.
    pub fn order_placed(&self, order: &Order) {
        let summary = Arc::new(OrderSummary::from_order(order));

        let notifier = Arc::clone(&self.notifier);
        let admin_summary = Arc::clone(&summary);
        self.queue.dispatch("notify.admin", async move {
            notifier.notify_admin(&admin_summary).await?;
            Ok(())
        });

        let notifier = Arc::clone(&self.notifier);
        self.queue.dispatch("notify.customer", async move {
            notifier.notify_customer(&summary).await?;
            Ok(())
        });
    }
}
