//! Purchase-fact boundary: the external commerce provider that confirms
//! purchases and reports who referred a buyer.

use crate::domain::{AffiliateId, ReferralCode, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod http;
pub mod mock;

pub use http::HttpPurchaseSource;
pub use mock::MockPurchaseSource;

/// What the provider knows about a buyer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseFacts {
    /// Whether the buyer has completed a qualifying purchase.
    pub purchased: bool,
    /// The buyer's direct referrer, if any.
    #[serde(default)]
    pub referrer_id: Option<AffiliateId>,
}

/// Source of purchase facts.
///
/// Implementations must handle retry/backoff and rate limiting.
#[async_trait]
pub trait PurchaseSource: Send + Sync + fmt::Debug {
    /// Look up purchase facts for a buyer.
    ///
    /// # Arguments
    /// * `buyer` - User identity of the buyer
    /// * `referral_code` - Code from the affiliate link used, if any
    async fn purchase_facts(
        &self,
        buyer: &UserId,
        referral_code: Option<&ReferralCode>,
    ) -> Result<PurchaseFacts, DataSourceError>;
}

/// Error type for data source operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded (caller should implement backoff)
    RateLimited,
    /// Other error
    Other(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
            DataSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datasource_error_display() {
        let err = DataSourceError::HttpError {
            status: 503,
            message: "Server error".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 503: Server error");
        assert_eq!(DataSourceError::RateLimited.to_string(), "Rate limited");
    }

    #[test]
    fn test_purchase_facts_wire_format() {
        let facts: PurchaseFacts =
            serde_json::from_str(r#"{"purchased": true, "referrerId": "aff-1"}"#).unwrap();
        assert!(facts.purchased);
        assert_eq!(facts.referrer_id, Some(AffiliateId::new("aff-1")));

        let facts: PurchaseFacts = serde_json::from_str(r#"{"purchased": false}"#).unwrap();
        assert_eq!(facts, PurchaseFacts::default());
    }
}
