//! Mock purchase source for testing without network calls.

use super::{DataSourceError, PurchaseFacts, PurchaseSource};
use crate::domain::{AffiliateId, ReferralCode, UserId};
use async_trait::async_trait;
use std::collections::HashMap;

/// Mock purchase source that returns predefined facts per buyer.
///
/// Unknown buyers have not purchased. When a referral code is passed and the
/// buyer has no configured referrer, codes registered with `with_code` resolve
/// to their affiliate.
#[derive(Debug, Clone, Default)]
pub struct MockPurchaseSource {
    facts: HashMap<UserId, PurchaseFacts>,
    codes: HashMap<ReferralCode, AffiliateId>,
    failure: Option<DataSourceError>,
}

impl MockPurchaseSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a buyer as having purchased, optionally with a known referrer.
    pub fn with_purchase(mut self, buyer: UserId, referrer_id: Option<AffiliateId>) -> Self {
        self.facts.insert(
            buyer,
            PurchaseFacts {
                purchased: true,
                referrer_id,
            },
        );
        self
    }

    /// Register a referral code the provider can resolve.
    pub fn with_code(mut self, code: ReferralCode, affiliate_id: AffiliateId) -> Self {
        self.codes.insert(code, affiliate_id);
        self
    }

    /// Make every lookup fail with `error`.
    pub fn failing(mut self, error: DataSourceError) -> Self {
        self.failure = Some(error);
        self
    }
}

#[async_trait]
impl PurchaseSource for MockPurchaseSource {
    async fn purchase_facts(
        &self,
        buyer: &UserId,
        referral_code: Option<&ReferralCode>,
    ) -> Result<PurchaseFacts, DataSourceError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let mut facts = self.facts.get(buyer).cloned().unwrap_or_default();
        if facts.referrer_id.is_none() {
            facts.referrer_id = referral_code.and_then(|code| self.codes.get(code).cloned());
        }
        Ok(facts)
    }
}
