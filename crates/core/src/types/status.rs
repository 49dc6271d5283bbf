//! Order status and its transition table.

use serde::{Deserialize, Serialize};

/// Order payment/fulfillment status.
///
/// ```text
/// payment_submitted ─┐
///        │           ├──> verified ──> completed
///        v           │
///     pending ───────┘
///
/// pending | payment_submitted ──> cancelled (terminal)
/// ```
///
/// `payment_submitted` is the entry state of the manual-proof path (a proof image
/// was attached when the order was created); `pending` is the entry state of the
/// redirect path and the resting state of anything awaiting an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "storefront.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    PaymentSubmitted,
    Verified,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::PaymentSubmitted,
        Self::Pending,
        Self::Verified,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Wire/database name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PaymentSubmitted => "payment_submitted",
            Self::Verified => "verified",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Customer-facing label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending Verification",
            Self::PaymentSubmitted => "Payment Submitted",
            Self::Verified => "Verified",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Badge tone used by order views.
    #[must_use]
    pub const fn tone(self) -> &'static str {
        match self {
            Self::Pending => "warning",
            Self::PaymentSubmitted => "info",
            Self::Verified | Self::Completed => "success",
            Self::Cancelled => "danger",
        }
    }

    /// Whether the status is awaiting payment verification.
    #[must_use]
    pub const fn is_awaiting_verification(self) -> bool {
        matches!(self, Self::Pending | Self::PaymentSubmitted)
    }

    /// Whether no further transitions are allowed (outside the admin override).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether the digital asset may be delivered for this status.
    #[must_use]
    pub const fn grants_access(self) -> bool {
        matches!(self, Self::Verified | Self::Completed)
    }

    /// Whether `self -> next` is a legal lifecycle transition.
    ///
    /// Transitions only move forward; `cancelled` is reachable only while the
    /// order is still awaiting verification.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::PaymentSubmitted, Self::Pending | Self::Verified | Self::Cancelled)
                | (Self::Pending, Self::Verified | Self::Cancelled)
                | (Self::Verified, Self::Completed)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid order status: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(OrderStatus::PaymentSubmitted.can_transition_to(OrderStatus::Verified));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Verified));
        assert!(OrderStatus::Verified.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!OrderStatus::Verified.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Verified.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Pending));
        for status in OrderStatus::ALL {
            assert!(!OrderStatus::Completed.can_transition_to(status));
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_round_trip_names() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&OrderStatus::PaymentSubmitted).ok();
        assert_eq!(json.as_deref(), Some("\"payment_submitted\""));
    }
}
