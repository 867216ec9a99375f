//! Tier-by-tier greedy attachment.
//!
//! RNG draw order: for each tier ascending, one shuffle of the tier's
//! items, then one jitter draw per scored candidate in candidate order.

use std::collections::BTreeMap;

use generational_arena::Index;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, instrument, trace};

use super::{attach, connect_leftovers, tag_themes, uniform, ForceConnectWeights, GrowthContext, GrowthOutcome, GrowthStrategy};
use crate::domain::arena::TreeArena;
use crate::domain::build_config::StrategyKind;
use crate::domain::entities::Tier;
use crate::domain::error::{DomainError, DomainResult};

/// Extra children a parent may take in the last-resort search.
const OVERFLOW_SLACK: usize = 2;
/// Distance surcharge for last-resort candidates.
const OVERFLOW_DISTANCE: usize = 5;

#[derive(Debug, Default, Clone, Copy)]
pub struct TierGreedy;

impl GrowthStrategy for TierGreedy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TierGreedy
    }

    #[instrument(level = "debug", skip_all, fields(school = ctx.school))]
    fn grow(&self, tree: &mut TreeArena, ctx: &GrowthContext<'_>, rng: &mut StdRng) -> DomainResult<GrowthOutcome> {
        let root = tree
            .root()
            .ok_or_else(|| DomainError::EmptySchool(ctx.school.to_string()))?;
        tag_themes(tree, ctx);

        let max = ctx.max_children();
        let mut buckets: BTreeMap<usize, Vec<Index>> = BTreeMap::new();
        buckets.entry(0).or_default().push(root);
        let mut connected: Vec<Index> = vec![root];

        for tier in Tier::ALL {
            let t = tier.index();
            let mut tier_items: Vec<Index> = tree
                .nodes()
                .filter(|(idx, n)| n.tier == tier && *idx != root)
                .map(|(idx, _)| idx)
                .collect();
            if tier_items.is_empty() {
                continue;
            }
            tier_items.shuffle(rng);

            let mut placed = Vec::new();
            for node in tier_items {
                let Some((parent, overflow)) = find_parent(tree, ctx, &buckets, &connected, node, t, rng) else {
                    trace!(node = %tree.node(node).form_id, "no parent found");
                    continue;
                };
                if overflow {
                    attach(tree, parent, node, max);
                } else {
                    tree.link(parent, node);
                }
                connected.push(node);

                if !tree.has_capacity(parent, max) {
                    for bucket in buckets.values_mut() {
                        bucket.retain(|&p| p != parent);
                    }
                }
                // Same-tier parents are only allowed on the lowest tier.
                if t == 0 {
                    buckets.entry(0).or_default().push(node);
                } else {
                    placed.push(node);
                }
            }
            buckets.entry(t).or_default().extend(placed);
            debug!(tier = %tier, connected = connected.len(), "tier placed");
        }

        connect_leftovers(tree, ctx.sims, max, ForceConnectWeights::default());
        Ok(GrowthOutcome::default())
    }
}

/// Best parent for `node` and whether it came from the last-resort search.
fn find_parent(
    tree: &TreeArena,
    ctx: &GrowthContext<'_>,
    buckets: &BTreeMap<usize, Vec<Index>>,
    connected: &[Index],
    node: Index,
    tier: usize,
    rng: &mut StdRng,
) -> Option<(Index, bool)> {
    let max = ctx.max_children();
    let with_capacity = |bucket: usize| -> Vec<Index> {
        buckets
            .get(&bucket)
            .map(|b| b.iter().copied().filter(|&p| p != node && tree.has_capacity(p, max)).collect())
            .unwrap_or_default()
    };

    for dist in 1..=tier {
        let candidates = with_capacity(tier - dist);
        if !candidates.is_empty() {
            let scored: Vec<(Index, usize)> = candidates.into_iter().map(|c| (c, dist)).collect();
            return best_candidate(tree, ctx, node, tier, &scored, rng).map(|p| (p, false));
        }
    }
    if tier == 0 {
        let candidates = with_capacity(0);
        if !candidates.is_empty() {
            let scored: Vec<(Index, usize)> = candidates.into_iter().map(|c| (c, 0)).collect();
            return best_candidate(tree, ctx, node, tier, &scored, rng).map(|p| (p, false));
        }
    }

    let scored: Vec<(Index, usize)> = connected
        .iter()
        .copied()
        .filter(|&c| c != node)
        .filter(|&c| tree.node(c).tier_index() <= tier && tree.children_count(c) < max + OVERFLOW_SLACK)
        .map(|c| (c, tier.abs_diff(tree.node(c).tier_index()) + OVERFLOW_DISTANCE))
        .collect();
    best_candidate(tree, ctx, node, tier, &scored, rng).map(|p| (p, true))
}

/// Highest scoring candidate; the first wins ties. One jitter draw each.
fn best_candidate(
    tree: &TreeArena,
    ctx: &GrowthContext<'_>,
    node: Index,
    tier: usize,
    candidates: &[(Index, usize)],
    rng: &mut StdRng,
) -> Option<Index> {
    let n = tree.node(node);
    let mut best: Option<(f64, Index)> = None;
    for &(cand, dist) in candidates {
        let c = tree.node(cand);
        let pair = ctx.sims.between(tree, node, cand);

        let mut score = -(dist.saturating_sub(1) as f64) * 5.0;
        score += pair.label * 40.0;
        match (&n.theme, &c.theme) {
            (Some(a), Some(b)) if a == b => score += if pair.label > 0.5 { 25.0 } else { 15.0 },
            (Some(_), Some(_)) => score -= 10.0,
            _ => {}
        }
        score += (pair.text * 0.4 + pair.name * 0.6) * 30.0;
        score -= c.children.len() as f64 * 8.0;
        if tier >= 1 && c.depth == tier - 1 {
            score += 10.0;
        } else if tier >= 2 && c.depth == tier - 2 {
            score += 5.0;
        }
        score += uniform(rng, -2.0, 2.0);

        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, cand));
        }
    }
    best.map(|(_, idx)| idx)
}
