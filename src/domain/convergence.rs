//! Extra prerequisites for high-tier items so they require more than one
//! branch to be unlocked.

use std::collections::HashSet;

use generational_arena::Index;
use tracing::{debug, instrument};

use crate::domain::arena::TreeArena;
use crate::domain::entities::Tier;
use crate::domain::similarity::SimilarityIndex;

/// Total prerequisites wanted for a node of `tier`.
pub fn required_prerequisites(tier: Tier) -> usize {
    match tier {
        Tier::Expert => 2,
        Tier::Master => 3,
        _ => 1,
    }
}

/// Add prerequisite-only links until every Expert/Master node meets its
/// quota or runs out of candidates. Returns the number of links added.
#[instrument(level = "debug", skip(tree, sims))]
pub fn add_convergence(tree: &mut TreeArena, sims: &SimilarityIndex) -> usize {
    let reachable = tree.reachable_from_root();
    let nodes: Vec<Index> = tree.indices().collect();
    let mut added = 0;

    for &node in &nodes {
        let wanted = required_prerequisites(tree.node(node).tier);
        if tree.node(node).is_root || !reachable.contains(&node) {
            continue;
        }
        while tree.node(node).prerequisites.len() < wanted {
            let Some(extra) = best_candidate(tree, sims, node, &nodes, &reachable) else {
                break;
            };
            tree.add_prerequisite(node, extra);
            added += 1;
        }
    }
    if added > 0 {
        debug!(added, "convergence links added");
    }
    added
}

fn best_candidate(
    tree: &TreeArena,
    sims: &SimilarityIndex,
    node: Index,
    order: &[Index],
    reachable: &HashSet<Index>,
) -> Option<Index> {
    let n = tree.node(node);
    let mut best: Option<(f64, Index)> = None;
    for &cand in order {
        let c = tree.node(cand);
        if cand == node
            || !reachable.contains(&cand)
            || c.depth >= n.depth
            || c.tier > n.tier
            || n.prerequisites.contains(&cand)
            || tree.is_descendant(node, cand)
            || tree.requires(cand, node)
        {
            continue;
        }
        let depth_gap = (n.depth - c.depth) as f64;
        let mut score = sims.between(tree, node, cand).text * 40.0 + (20.0 - 10.0 * depth_gap).max(0.0);
        if c.theme != n.theme {
            score += 10.0;
        }
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, cand));
        }
    }
    best.map(|(_, idx)| idx)
}
