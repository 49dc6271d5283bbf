//! Continuation tokens for resuming checkout after a payment redirect.
//!
//! The return URLs handed to the gateway carry the token in the query string:
//! `?paymongo=success&orderId=<id>` or `?paymongo=cancel&orderId=<id>`. Tokens
//! are single-use. The checkout page handles a token and immediately redirects
//! to the URL returned by [`ContinuationToken::strip`], so a refresh never sees
//! the token again. A token that reached a final outcome is remembered by
//! [`ReplayGuard`]; the order's own status is what keeps a forgotten token from
//! confirming twice.

use std::fmt;
use std::time::Duration;

use moka::future::Cache;
use url::Url;

use bytestall_core::OrderId;

/// Query parameter carrying the outcome.
pub const OUTCOME_PARAM: &str = "paymongo";

/// Query parameter carrying the order id.
pub const ORDER_PARAM: &str = "orderId";

/// How long consumed tokens are remembered.
pub const REPLAY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on remembered tokens.
const REPLAY_CAPACITY: u64 = 100_000;

/// What the customer did on the provider's page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContinuationOutcome {
    Success,
    Cancel,
}

impl ContinuationOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Cancel => "cancel",
        }
    }
}

/// A resumable checkout: which order, and what happened to its payment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContinuationToken {
    pub outcome: ContinuationOutcome,
    /// Always present on success; optional on cancel.
    pub order_id: Option<OrderId>,
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.order_id {
            Some(id) => write!(f, "{}:{id}", self.outcome.as_str()),
            None => f.write_str(self.outcome.as_str()),
        }
    }
}

impl ContinuationToken {
    #[must_use]
    pub const fn success(order_id: OrderId) -> Self {
        Self {
            outcome: ContinuationOutcome::Success,
            order_id: Some(order_id),
        }
    }

    #[must_use]
    pub const fn cancel(order_id: OrderId) -> Self {
        Self {
            outcome: ContinuationOutcome::Cancel,
            order_id: Some(order_id),
        }
    }

    /// `base` with this token appended to its query.
    #[must_use]
    pub fn embed(&self, base: &Url) -> Url {
        let mut url = Self::strip(base);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(OUTCOME_PARAM, self.outcome.as_str());
            if let Some(id) = &self.order_id {
                query.append_pair(ORDER_PARAM, id.as_str());
            }
        }
        url
    }

    /// Read a token from query pairs.
    ///
    /// Returns `None` when no token is present or it is malformed: an unknown
    /// outcome, or a success without an order id.
    pub fn from_query<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Option<Self> {
        let mut outcome = None;
        let mut order_id = None;
        for (key, value) in pairs {
            match key {
                OUTCOME_PARAM => outcome = Some(value),
                ORDER_PARAM if !value.trim().is_empty() => order_id = Some(OrderId::new(value)),
                _ => {}
            }
        }

        match outcome? {
            "success" => Some(Self {
                outcome: ContinuationOutcome::Success,
                order_id: Some(order_id?),
            }),
            "cancel" => Some(Self {
                outcome: ContinuationOutcome::Cancel,
                order_id,
            }),
            _ => None,
        }
    }

    /// Read a token from a URL's query.
    #[must_use]
    pub fn from_url(url: &Url) -> Option<Self> {
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        Self::from_query(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// `url` without token parameters; every other parameter is kept.
    #[must_use]
    pub fn strip(url: &Url) -> Url {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .into_owned()
            .filter(|(k, _)| k != OUTCOME_PARAM && k != ORDER_PARAM)
            .collect();

        let mut stripped = url.clone();
        if kept.is_empty() {
            stripped.set_query(None);
        } else {
            stripped.query_pairs_mut().clear().extend_pairs(kept);
        }
        stripped
    }
}

/// Remembers consumed tokens so each is handled at most once.
#[derive(Clone)]
pub struct ReplayGuard {
    seen: Cache<String, ()>,
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(REPLAY_WINDOW)
    }
}

impl ReplayGuard {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            seen: Cache::builder()
                .max_capacity(REPLAY_CAPACITY)
                .time_to_live(window)
                .build(),
        }
    }

    /// Whether `token` has already been consumed.
    #[must_use]
    pub fn is_consumed(&self, token: &ContinuationToken) -> bool {
        self.seen.contains_key(&token.to_string())
    }

    /// Mark `token` consumed. Returns `true` only the first time.
    pub async fn consume(&self, token: &ContinuationToken) -> bool {
        self.seen
            .entry(token.to_string())
            .or_insert(())
            .await
            .is_fresh()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn checkout() -> Url {
        Url::parse("https://shop.example/checkout?step=payment").unwrap()
    }

    #[test]
    fn test_embed_then_parse() {
        let url = ContinuationToken::success(OrderId::new("ord_42")).embed(&checkout());
        assert_eq!(
            url.as_str(),
            "https://shop.example/checkout?step=payment&paymongo=success&orderId=ord_42"
        );
        assert_eq!(
            ContinuationToken::from_url(&url),
            Some(ContinuationToken::success(OrderId::new("ord_42")))
        );
    }

    #[test]
    fn test_strip_keeps_other_params() {
        let url = Url::parse("https://shop.example/checkout?paymongo=success&orderId=x&step=2")
            .unwrap();
        assert_eq!(
            ContinuationToken::strip(&url).as_str(),
            "https://shop.example/checkout?step=2"
        );

        let bare = Url::parse("https://shop.example/checkout?paymongo=cancel").unwrap();
        assert_eq!(
            ContinuationToken::strip(&bare).as_str(),
            "https://shop.example/checkout"
        );
    }

    #[test]
    fn test_malformed_tokens_are_ignored() {
        assert_eq!(ContinuationToken::from_query([("paymongo", "success")]), None);
        assert_eq!(ContinuationToken::from_query([("paymongo", "maybe"), ("orderId", "x")]), None);
        assert_eq!(ContinuationToken::from_query([("step", "2")]), None);
        assert_eq!(
            ContinuationToken::from_query([("paymongo", "cancel")]),
            Some(ContinuationToken {
                outcome: ContinuationOutcome::Cancel,
                order_id: None
            })
        );
    }

    #[tokio::test]
    async fn test_replay_guard_is_single_use() {
        let guard = ReplayGuard::default();
        let token = ContinuationToken::success(OrderId::new("ord_1"));

        assert!(!guard.is_consumed(&token));
        assert!(guard.consume(&token).await);
        assert!(guard.is_consumed(&token));
        assert!(!guard.consume(&token).await);
        assert!(guard.consume(&ContinuationToken::success(OrderId::new("ord_2"))).await);
    }
}
