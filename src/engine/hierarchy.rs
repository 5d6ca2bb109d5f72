//! Downline tree materialization from a bulk-loaded network snapshot.
//!
//! The aggregator issues exactly two reads (all affiliates, all commissions),
//! indexes them by id in memory and assembles the tree without further queries.

use crate::db::Repository;
use crate::domain::{
    Affiliate, AffiliateId, AffiliateStatus, Commission, Decimal, ReferralCode,
};
use crate::engine::upline::{AffiliateSource, GraphAnomaly};
use crate::engine::QueryError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

/// One affiliate in a downline tree.
///
/// `level` counts hops from the queried root (root = 0). Commission records
/// keep their own level, which counts from the purchase's buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub affiliate_id: AffiliateId,
    pub level: u32,
    pub name: String,
    pub code: ReferralCode,
    pub status: AffiliateStatus,
    pub total_earnings: Decimal,
    pub commissions: Vec<Commission>,
    pub children: Vec<TreeNode>,
}

impl Drop for TreeNode {
    // Unlinks descendants one at a time; the derived drop would recurse once per level.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateTree {
    pub root: TreeNode,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<GraphAnomaly>,
}

/// Roll-up of a tree for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeSummary {
    /// Descendants of the root, excluding the root itself.
    pub downline_count: usize,
    pub depth: u32,
    /// Number of affiliates at each relative level.
    pub per_level: BTreeMap<u32, usize>,
    /// Sum of commission amounts embedded in descendant nodes.
    pub downline_commission: Decimal,
}

impl AffiliateTree {
    pub fn summary(&self) -> TreeSummary {
        let mut summary = TreeSummary::default();
        let mut stack: Vec<&TreeNode> = self.root.children.iter().collect();
        while let Some(node) = stack.pop() {
            summary.downline_count += 1;
            summary.depth = summary.depth.max(node.level);
            *summary.per_level.entry(node.level).or_default() += 1;
            summary.downline_commission +=
                node.commissions.iter().map(|c| c.amount).sum::<Decimal>();
            stack.extend(node.children.iter());
        }
        summary
    }

    /// Remove every node deeper than `max_level`. Returns how many were removed.
    pub fn prune_deeper_than(&mut self, max_level: u32) -> usize {
        let mut removed = 0;
        let mut stack: Vec<&mut TreeNode> = vec![&mut self.root];
        while let Some(node) = stack.pop() {
            if node.level < max_level {
                stack.extend(node.children.iter_mut());
                continue;
            }
            let mut pending = std::mem::take(&mut node.children);
            while let Some(mut cut) = pending.pop() {
                removed += 1;
                pending.append(&mut cut.children);
            }
        }
        removed
    }

    /// Every affiliate id in the tree, root first, in depth-first order.
    pub fn ids(&self) -> Vec<&AffiliateId> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            out.push(&node.affiliate_id);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

/// In-memory arena of the whole network, keyed by affiliate id.
#[derive(Debug, Default)]
pub struct NetworkSnapshot {
    affiliates: HashMap<AffiliateId, Affiliate>,
    children: HashMap<AffiliateId, Vec<AffiliateId>>,
    commissions: HashMap<AffiliateId, Vec<Commission>>,
}

impl NetworkSnapshot {
    pub fn new(affiliates: Vec<Affiliate>, commissions: Vec<Commission>) -> Self {
        let mut children: HashMap<AffiliateId, Vec<AffiliateId>> = HashMap::new();
        let mut ordered: Vec<&Affiliate> = affiliates.iter().collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        for affiliate in ordered {
            if let Some(parent) = &affiliate.referred_by {
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(affiliate.id.clone());
            }
        }

        let mut by_beneficiary: HashMap<AffiliateId, Vec<Commission>> = HashMap::new();
        for commission in commissions {
            by_beneficiary
                .entry(commission.affiliate_id.clone())
                .or_default()
                .push(commission);
        }

        Self {
            affiliates: affiliates.into_iter().map(|a| (a.id.clone(), a)).collect(),
            children,
            commissions: by_beneficiary,
        }
    }

    pub fn get(&self, id: &AffiliateId) -> Option<&Affiliate> {
        self.affiliates.get(id)
    }

    pub fn len(&self) -> usize {
        self.affiliates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.affiliates.is_empty()
    }

    fn node(&self, affiliate: &Affiliate, level: u32) -> TreeNode {
        TreeNode {
            affiliate_id: affiliate.id.clone(),
            level,
            name: affiliate.display_name.clone(),
            code: affiliate.code.clone(),
            status: affiliate.status,
            total_earnings: affiliate.total_earnings,
            commissions: self.commissions.get(&affiliate.id).cloned().unwrap_or_default(),
            children: Vec::new(),
        }
    }

    /// Materialize the downline of `root`, or `None` if `root` is unknown.
    ///
    /// Each affiliate appears at most once. An edge back to an already
    /// visited affiliate is dropped and reported as a cycle. Uses an explicit
    /// stack so long chains cannot exhaust the call stack.
    pub fn build_tree(&self, root: &AffiliateId) -> Option<AffiliateTree> {
        let root_affiliate = self.affiliates.get(root)?;

        // Preorder: (affiliate, level, parent index).
        let mut preorder: Vec<(&Affiliate, u32, Option<usize>)> = Vec::new();
        let mut visited: HashSet<&AffiliateId> = HashSet::new();
        let mut anomalies = Vec::new();
        let mut stack: Vec<(&Affiliate, u32, Option<usize>)> = vec![(root_affiliate, 0, None)];
        visited.insert(&root_affiliate.id);

        while let Some((affiliate, level, parent)) = stack.pop() {
            let index = preorder.len();
            preorder.push((affiliate, level, parent));

            let Some(child_ids) = self.children.get(&affiliate.id) else {
                continue;
            };
            for child_id in child_ids.iter().rev() {
                let Some(child) = self.affiliates.get(child_id) else {
                    continue;
                };
                if !visited.insert(&child.id) {
                    warn!(root = %root, affiliate_id = %child.id, "Cycle in referral tree, skipping subtree");
                    anomalies.push(GraphAnomaly::CycleDetected {
                        affiliate_id: child.id.clone(),
                    });
                    continue;
                }
                stack.push((child, level + 1, Some(index)));
            }
        }

        // Children always follow their parent in preorder, so walking it
        // backwards completes every subtree before attaching it.
        let mut nodes: Vec<Option<TreeNode>> = preorder
            .iter()
            .map(|(affiliate, level, _)| Some(self.node(affiliate, *level)))
            .collect();
        for index in (1..preorder.len()).rev() {
            let Some(mut node) = nodes[index].take() else {
                continue;
            };
            node.children.reverse();
            if let Some(parent) = preorder[index].2.and_then(|p| nodes[p].as_mut()) {
                parent.children.push(node);
            }
        }

        let mut root_node = nodes.first_mut().and_then(Option::take)?;
        root_node.children.reverse();

        Some(AffiliateTree {
            root: root_node,
            anomalies,
        })
    }
}

#[async_trait]
impl AffiliateSource for NetworkSnapshot {
    async fn affiliate(&mut self, id: &AffiliateId) -> Result<Option<Affiliate>, sqlx::Error> {
        Ok(self.affiliates.get(id).cloned())
    }
}

/// Builds downline trees from two concurrent bulk reads.
#[derive(Clone)]
pub struct HierarchyAggregator {
    repo: Arc<Repository>,
}

impl HierarchyAggregator {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    pub async fn snapshot(&self) -> Result<NetworkSnapshot, sqlx::Error> {
        let (affiliates, commissions) =
            futures::try_join!(self.repo.list_affiliates(), self.repo.list_commissions())?;
        Ok(NetworkSnapshot::new(affiliates, commissions))
    }

    pub async fn build_tree(&self, root: &AffiliateId) -> Result<AffiliateTree, QueryError> {
        let snapshot = self.snapshot().await?;
        snapshot
            .build_tree(root)
            .ok_or_else(|| QueryError::AffiliateNotFound(root.clone()))
    }
}
