//! Upline resolution: walk `referred_by` pointers from an affiliate toward the root.

use crate::domain::{Affiliate, AffiliateId, UserId};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

/// Keyed affiliate lookup used by the upline walk.
///
/// Implemented by `SqliteConnection` (so the walk can run inside the
/// distribution transaction) and by the in-memory `NetworkSnapshot`.
#[async_trait]
pub trait AffiliateSource: Send {
    async fn affiliate(&mut self, id: &AffiliateId) -> Result<Option<Affiliate>, sqlx::Error>;
}

/// One ancestor in an upline chain. Level 1 is the starting affiliate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UplineEntry {
    pub level: u32,
    pub affiliate_id: AffiliateId,
    pub user_id: UserId,
    pub display_name: String,
}

/// Malformed referral data found during a traversal.
///
/// Anomalies truncate the traversal where they occur and are reported
/// alongside the result; they never fail the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GraphAnomaly {
    /// `affiliate_id` was reached a second time.
    #[serde(rename_all = "camelCase")]
    CycleDetected { affiliate_id: AffiliateId },
    /// A `referred_by` pointer names an affiliate that does not exist.
    #[serde(rename_all = "camelCase")]
    DanglingReferrer { missing: AffiliateId },
}

/// Ordered ancestor chain, nearest first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Upline {
    pub entries: Vec<UplineEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<GraphAnomaly>,
}

impl Upline {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve up to `max_levels` ancestors starting at `start` (level 1).
///
/// Stops at the end of the chain, at `max_levels`, or when an id repeats.
/// A missing `start` yields an empty chain; callers that need it to exist
/// check beforehand.
pub async fn resolve_upline<S>(
    source: &mut S,
    start: &AffiliateId,
    max_levels: u32,
) -> Result<Upline, sqlx::Error>
where
    S: AffiliateSource + ?Sized,
{
    let mut upline = Upline::default();
    let mut visited: HashSet<AffiliateId> = HashSet::new();
    let mut next = Some(start.clone());

    while let Some(id) = next.take() {
        if upline.entries.len() as u32 >= max_levels {
            break;
        }

        if !visited.insert(id.clone()) {
            warn!(start = %start, affiliate_id = %id, "Cycle in referral chain, truncating upline");
            upline.anomaly = Some(GraphAnomaly::CycleDetected { affiliate_id: id });
            break;
        }

        let Some(affiliate) = source.affiliate(&id).await? else {
            if !upline.entries.is_empty() {
                warn!(start = %start, missing = %id, "Dangling referrer in chain, truncating upline");
                upline.anomaly = Some(GraphAnomaly::DanglingReferrer { missing: id });
            }
            break;
        };

        upline.entries.push(UplineEntry {
            level: upline.entries.len() as u32 + 1,
            affiliate_id: affiliate.id,
            user_id: affiliate.user_id,
            display_name: affiliate.display_name,
        });
        next = affiliate.referred_by;
    }

    Ok(upline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AffiliateStatus;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapSource(HashMap<AffiliateId, Affiliate>);

    impl MapSource {
        fn link(mut self, id: &str, referred_by: Option<&str>) -> Self {
            let mut a = Affiliate::new(
                UserId::new(format!("user-{}", id)),
                id.to_uppercase(),
                referred_by.map(AffiliateId::new),
                AffiliateStatus::Active,
            );
            a.id = AffiliateId::new(id);
            self.0.insert(a.id.clone(), a);
            self
        }
    }

    #[async_trait]
    impl AffiliateSource for MapSource {
        async fn affiliate(&mut self, id: &AffiliateId) -> Result<Option<Affiliate>, sqlx::Error> {
            Ok(self.0.get(id).cloned())
        }
    }

    fn ids(upline: &Upline) -> Vec<&str> {
        upline.entries.iter().map(|e| e.affiliate_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_walks_to_root_with_levels() {
        let mut src = MapSource::default()
            .link("a", Some("b"))
            .link("b", Some("c"))
            .link("c", None);

        let upline = resolve_upline(&mut src, &AffiliateId::new("a"), 10).await.unwrap();
        assert_eq!(ids(&upline), vec!["a", "b", "c"]);
        assert_eq!(
            upline.entries.iter().map(|e| e.level).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(upline.entries[1].display_name, "B");
        assert!(upline.anomaly.is_none());
    }

    #[tokio::test]
    async fn test_respects_max_levels() {
        let mut src = MapSource::default()
            .link("a", Some("b"))
            .link("b", Some("c"))
            .link("c", None);

        let upline = resolve_upline(&mut src, &AffiliateId::new("a"), 2).await.unwrap();
        assert_eq!(ids(&upline), vec!["a", "b"]);

        let empty = resolve_upline(&mut src, &AffiliateId::new("a"), 0).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_terminates_within_distinct_count() {
        let mut src = MapSource::default()
            .link("x", Some("y"))
            .link("y", Some("z"))
            .link("z", Some("x"));

        let upline = resolve_upline(&mut src, &AffiliateId::new("x"), 100).await.unwrap();
        assert_eq!(ids(&upline), vec!["x", "y", "z"]);
        assert_eq!(
            upline.anomaly,
            Some(GraphAnomaly::CycleDetected {
                affiliate_id: AffiliateId::new("x")
            })
        );
    }

    #[tokio::test]
    async fn test_self_referral_stops_after_one() {
        let mut src = MapSource::default().link("x", Some("x"));
        let upline = resolve_upline(&mut src, &AffiliateId::new("x"), 5).await.unwrap();
        assert_eq!(ids(&upline), vec!["x"]);
        assert!(matches!(upline.anomaly, Some(GraphAnomaly::CycleDetected { .. })));
    }

    #[tokio::test]
    async fn test_dangling_referrer_truncates() {
        let mut src = MapSource::default().link("a", Some("gone"));
        let upline = resolve_upline(&mut src, &AffiliateId::new("a"), 5).await.unwrap();
        assert_eq!(ids(&upline), vec!["a"]);
        assert_eq!(
            upline.anomaly,
            Some(GraphAnomaly::DanglingReferrer {
                missing: AffiliateId::new("gone")
            })
        );
    }

    #[tokio::test]
    async fn test_missing_start_is_empty() {
        let mut src = MapSource::default();
        let upline = resolve_upline(&mut src, &AffiliateId::new("nobody"), 5).await.unwrap();
        assert!(upline.is_empty());
        assert!(upline.anomaly.is_none());
    }
}
