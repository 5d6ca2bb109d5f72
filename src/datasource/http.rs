//! HTTP client for the commerce provider's purchase-facts endpoint.

use super::{DataSourceError, PurchaseFacts, PurchaseSource};
use crate::domain::{ReferralCode, UserId};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Purchase source backed by `POST {base_url}/purchase-facts`.
///
/// Request body: `{"buyer": "...", "referralCode": "..."|null}`.
/// Response body: `{"purchased": bool, "referrerId": "..."|null}`.
#[derive(Debug, Clone)]
pub struct HttpPurchaseSource {
    client: Client,
    base_url: String,
    max_elapsed: Duration,
}

impl HttpPurchaseSource {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_elapsed: Duration::from_secs(30),
        }
    }

    /// Bound the total time spent retrying transient failures.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    pub fn facts_url(&self) -> String {
        format!("{}/purchase-facts", self.base_url)
    }

    async fn post_json(
        &self,
        payload: serde_json::Value,
    ) -> Result<PurchaseFacts, DataSourceError> {
        let url = self.facts_url();
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<PurchaseFacts>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl PurchaseSource for HttpPurchaseSource {
    async fn purchase_facts(
        &self,
        buyer: &UserId,
        referral_code: Option<&ReferralCode>,
    ) -> Result<PurchaseFacts, DataSourceError> {
        debug!(buyer = %buyer, referral_code = ?referral_code, "Fetching purchase facts");

        let payload = serde_json::json!({
            "buyer": buyer.as_str(),
            "referralCode": referral_code.map(|c| c.as_str()),
        });

        self.post_json(payload).await
    }
}
