use crate::datasource::{DataSourceError, PurchaseSource};
use crate::db::Repository;
use crate::domain::{
    Affiliate, AffiliateId, AffiliateStatus, Decimal, Order, OrderId, OrderStatus, ReferralCode,
    UserId,
};
use crate::engine::{CommissionDistributor, Distribution, DistributionError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A purchase reported by the commerce provider's webhook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEvent {
    pub order_id: OrderId,
    pub buyer: UserId,
    pub amount: Decimal,
    pub status: OrderStatus,
    /// Code from the affiliate link the buyer arrived through.
    #[serde(default)]
    pub referral_code: Option<ReferralCode>,
    /// Name used if the buyer is enrolled as a new affiliate.
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOutcome {
    /// The buyer's affiliate record.
    pub affiliate: Affiliate,
    /// True when this purchase enrolled the buyer.
    pub enrolled: bool,
    /// Commissions paid for the order, when the buyer had a referrer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Distribution>,
}

#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("purchase provider has no completed purchase for buyer {0}")]
    NotPurchased(UserId),
    #[error("purchase provider unavailable: {0}")]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Turns purchase webhooks into affiliate enrollment and commission runs.
///
/// The provider is the source of truth for whether the buyer purchased and
/// who referred them. A buyer becomes an affiliate on their first confirmed
/// purchase, placed under that referrer.
#[derive(Clone)]
pub struct PurchaseProcessor {
    source: Arc<dyn PurchaseSource>,
    repo: Arc<Repository>,
    distributor: Arc<CommissionDistributor>,
}

impl PurchaseProcessor {
    pub fn new(
        source: Arc<dyn PurchaseSource>,
        repo: Arc<Repository>,
        distributor: Arc<CommissionDistributor>,
    ) -> Self {
        Self {
            source,
            repo,
            distributor,
        }
    }

    pub async fn process(&self, event: PurchaseEvent) -> Result<PurchaseOutcome, PurchaseError> {
        if event.status != OrderStatus::Completed {
            return Err(DistributionError::OrderNotCompleted {
                order_id: event.order_id,
                status: event.status,
            }
            .into());
        }

        let facts = self
            .source
            .purchase_facts(&event.buyer, event.referral_code.as_ref())
            .await?;
        if !facts.purchased {
            return Err(PurchaseError::NotPurchased(event.buyer));
        }

        let referrer = self
            .resolve_referrer(facts.referrer_id, event.referral_code.as_ref())
            .await?;

        let (affiliate, enrolled) = self
            .ensure_affiliate(&event.buyer, event.display_name.as_deref(), referrer.as_ref())
            .await?;

        let referrer = referrer.filter(|id| {
            let own = *id == affiliate.id;
            if own {
                debug!(affiliate_id = %id, "Ignoring self-referral");
            }
            !own
        });

        let distribution = match referrer {
            Some(referrer) => {
                let order = Order {
                    id: event.order_id,
                    buyer: event.buyer,
                    amount: event.amount,
                    status: event.status,
                    referred_by: Some(referrer.clone()),
                };
                Some(self.distributor.distribute(&order, &referrer).await?)
            }
            None => {
                debug!(order_id = %event.order_id, "Order has no referrer, no commissions");
                None
            }
        };

        Ok(PurchaseOutcome {
            affiliate,
            enrolled,
            distribution,
        })
    }

    /// The provider's referrer wins. A link code is the fallback.
    ///
    /// A referrer that does not exist locally fails the purchase before
    /// anything is written.
    async fn resolve_referrer(
        &self,
        provider_referrer: Option<AffiliateId>,
        code: Option<&ReferralCode>,
    ) -> Result<Option<AffiliateId>, PurchaseError> {
        if let Some(id) = provider_referrer {
            if self.repo.get_affiliate(&id).await?.is_none() {
                return Err(DistributionError::ReferrerNotFound(id).into());
            }
            return Ok(Some(id));
        }

        let Some(code) = code else {
            return Ok(None);
        };
        match self.repo.find_affiliate_by_code(code).await? {
            Some(affiliate) => Ok(Some(affiliate.id)),
            None => {
                warn!(code = %code, "Unknown referral code on purchase");
                Ok(None)
            }
        }
    }

    async fn ensure_affiliate(
        &self,
        buyer: &UserId,
        display_name: Option<&str>,
        referrer: Option<&AffiliateId>,
    ) -> Result<(Affiliate, bool), PurchaseError> {
        if let Some(existing) = self.repo.find_affiliate_by_user(buyer).await? {
            return Ok((existing, false));
        }

        let affiliate = Affiliate::new(
            buyer.clone(),
            display_name.unwrap_or(buyer.as_str()).to_string(),
            referrer.cloned(),
            AffiliateStatus::Active,
        );

        match self.repo.insert_affiliate(&affiliate).await {
            Ok(()) => {
                info!(affiliate_id = %affiliate.id, user_id = %buyer, "Enrolled buyer as affiliate");
                Ok((affiliate, true))
            }
            // A concurrent purchase by the same buyer enrolled them first.
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                let existing = self
                    .repo
                    .find_affiliate_by_user(buyer)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                Ok((existing, false))
            }
            Err(e) => Err(e.into()),
        }
    }
}
