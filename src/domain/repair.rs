//! Post-construction repair passes shared by every strategy.
//!
//! - branching: no node keeps more than `max_children` children
//! - tier order: a primary edge never points to a lower tier
//! - depths and sections derived from the final shape

use std::collections::{HashSet, VecDeque};

use generational_arena::Index;
use tracing::{debug, instrument};

use crate::domain::arena::{Section, TreeArena};
use crate::domain::similarity::SimilarityIndex;

pub const BRANCHING_PASSES: usize = 10;
pub const TIER_ORDER_PASSES: usize = 5;

/// What the repair passes changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairStats {
    pub rerouted: usize,
    pub reordered: usize,
    pub sent_to_root: usize,
}

/// Reroute surplus children until every node fits `max_children`, or the
/// pass budget is spent. Nodes that still exceed it are flagged `overflow`.
#[instrument(level = "debug", skip(tree, sims))]
pub fn constrain_branching(tree: &mut TreeArena, sims: &SimilarityIndex, max_children: usize) -> usize {
    let mut rerouted = 0;
    for pass in 0..BRANCHING_PASSES {
        let mut changed = false;
        let parents: Vec<Index> = tree.indices().collect();
        for parent in parents {
            let kids = tree.node(parent).children.clone();
            if kids.len() <= max_children {
                continue;
            }

            let mut scored: Vec<(f64, Index)> = kids
                .iter()
                .map(|&child| {
                    let pair = sims.between(tree, parent, child);
                    (pair.label * 30.0 + pair.text * 20.0 + pair.name * 10.0, child)
                })
                .collect();
            // stable: ties keep their current order
            scored.sort_by(|a, b| b.0.total_cmp(&a.0));
            let keep: Vec<Index> = scored.iter().take(max_children).map(|&(_, c)| c).collect();
            let extra: Vec<Index> = scored.iter().skip(max_children).map(|&(_, c)| c).collect();

            for child in extra {
                if let Some(target) = reroute_target(tree, sims, &keep, child, max_children) {
                    tree.reparent(child, target);
                    rerouted += 1;
                    changed = true;
                }
            }
        }
        if !changed {
            debug!(pass, rerouted, "branching stable");
            break;
        }
    }

    let over: Vec<Index> = tree
        .indices()
        .filter(|&idx| tree.children_count(idx) > max_children)
        .collect();
    for idx in over {
        tree.node_mut(idx).overflow = true;
    }
    rerouted
}

fn reroute_target(
    tree: &TreeArena,
    sims: &SimilarityIndex,
    siblings: &[Index],
    child: Index,
    max_children: usize,
) -> Option<Index> {
    let mut best: Option<(f64, Index)> = None;
    for &sib in siblings {
        if sib == child || !tree.has_capacity(sib, max_children) {
            continue;
        }
        let pair = sims.between(tree, child, sib);
        let score = pair.label * 30.0 + pair.text * 20.0 - tree.children_count(sib) as f64 * 5.0;
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, sib));
        }
    }
    if let Some((_, sib)) = best {
        return Some(sib);
    }

    let child_tier = tree.node(child).tier;
    tree.indices().find(|&cand| {
        cand != child
            && tree.has_capacity(cand, max_children)
            && tree.node(cand).tier <= child_tier
            && !tree.is_descendant(child, cand)
    })
}

/// Move children whose tier does not exceed their parent's under a lower
/// tier node; afterwards every strictly backward edge goes to the root.
#[instrument(level = "debug", skip(tree, sims))]
pub fn enforce_tier_ordering(tree: &mut TreeArena, sims: &SimilarityIndex, max_children: usize) -> RepairStats {
    let mut stats = RepairStats::default();
    let Some(root) = tree.root() else {
        return stats;
    };

    for _ in 0..TIER_ORDER_PASSES {
        let mut changed = false;
        let nodes: Vec<Index> = tree.indices().collect();
        for child in nodes {
            let Some(parent) = tree.primary_parent(child) else {
                continue;
            };
            if parent == root || tree.node(child).tier > tree.node(parent).tier {
                continue;
            }
            if let Some(better) = lower_tier_parent(tree, sims, child, max_children) {
                tree.reparent(child, better);
                stats.reordered += 1;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let backward: Vec<Index> = tree
        .indices()
        .filter(|&child| {
            tree.primary_parent(child)
                .is_some_and(|p| p != root && tree.node(child).tier < tree.node(p).tier)
        })
        .collect();
    for child in backward {
        tree.reparent(child, root);
        stats.sent_to_root += 1;
    }
    if tree.children_count(root) > max_children {
        tree.node_mut(root).overflow = true;
    }
    if stats.reordered + stats.sent_to_root > 0 {
        debug!(?stats, "tier order repaired");
    }
    stats
}

fn lower_tier_parent(tree: &TreeArena, sims: &SimilarityIndex, child: Index, max_children: usize) -> Option<Index> {
    let child_tier = tree.node(child).tier_index() as f64;
    let mut best: Option<(f64, Index)> = None;
    for cand in tree.indices() {
        let c = tree.node(cand);
        if cand == child
            || c.tier_index() as f64 >= child_tier
            || !tree.has_capacity(cand, max_children)
            || tree.is_descendant(child, cand)
        {
            continue;
        }
        let pair = sims.between(tree, child, cand);
        let score = pair.label * 20.0 + pair.text * 15.0
            - c.children.len() as f64 * 5.0
            - (child_tier - c.tier_index() as f64 - 1.0).abs() * 3.0;
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, cand));
        }
    }
    best.map(|(_, idx)| idx)
}

/// BFS distance from the root over children; unvisited nodes take their
/// tier ordinal.
#[instrument(level = "debug", skip(tree))]
pub fn assign_depths(tree: &mut TreeArena) {
    let Some(root) = tree.root() else {
        return;
    };
    let mut depth: Vec<(Index, usize)> = Vec::with_capacity(tree.len());
    let mut seen = HashSet::from([root]);
    let mut queue = VecDeque::from([(root, 0usize)]);
    while let Some((cur, d)) = queue.pop_front() {
        depth.push((cur, d));
        for &child in &tree.node(cur).children {
            if seen.insert(child) {
                queue.push_back((child, d + 1));
            }
        }
    }

    let unvisited: Vec<Index> = tree.indices().filter(|idx| !seen.contains(idx)).collect();
    for (idx, d) in depth {
        tree.node_mut(idx).depth = d;
    }
    for idx in unvisited {
        let node = tree.node_mut(idx);
        node.depth = node.tier_index();
    }
}

/// Depth cut-offs `(root, trunk)` for a tree of the given max depth.
pub fn section_cutoffs(max_depth: usize, root_pct: f64, trunk_pct: f64) -> (usize, usize) {
    let root_cut = (max_depth as f64 * root_pct).floor() as usize;
    let trunk_cut = ((max_depth as f64 * (root_pct + trunk_pct)).floor() as usize).max(root_cut + 1);
    (root_cut, trunk_cut)
}

pub fn assign_sections(tree: &mut TreeArena, root_pct: f64, trunk_pct: f64) {
    let (root_cut, trunk_cut) = section_cutoffs(tree.max_depth(), root_pct, trunk_pct);
    let nodes: Vec<Index> = tree.indices().collect();
    for idx in nodes {
        let node = tree.node_mut(idx);
        node.section = if node.is_root || node.depth <= root_cut {
            Section::Root
        } else if node.depth <= trunk_cut {
            Section::Trunk
        } else {
            Section::Branch
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Item, Tier};
    use rstest::rstest;

    fn tree_of(tiers: &[Tier]) -> (TreeArena, Vec<Index>) {
        let items: Vec<Item> = tiers
            .iter()
            .enumerate()
            .map(|(i, t)| Item::new(&format!("{i:02}"), &format!("Spell {i}"), *t, "Illusion"))
            .collect();
        let (mut tree, _) = TreeArena::from_items(&items);
        let idx: Vec<Index> = tree.indices().collect();
        tree.set_root(idx[0]);
        (tree, idx)
    }

    #[test]
    fn given_wide_node_when_constraining_then_extras_move_to_siblings() {
        // Arrange
        let (mut tree, idx) = tree_of(&[Tier::Novice; 6]);
        for &child in &idx[1..] {
            tree.link(idx[0], child);
        }

        // Act
        let moved = constrain_branching(&mut tree, &SimilarityIndex::default(), 2);

        // Assert
        assert_eq!(moved, 3);
        assert!(tree.nodes().all(|(_, n)| n.children.len() <= 2 && !n.overflow));
        assert_eq!(tree.reachable_from_root().len(), 6);
    }

    #[test]
    fn given_same_tier_edge_when_enforcing_order_then_child_moves_below_lower_tier() {
        let (mut tree, idx) = tree_of(&[Tier::Novice, Tier::Apprentice, Tier::Adept, Tier::Adept]);
        tree.link(idx[0], idx[1]);
        tree.link(idx[1], idx[2]);
        tree.link(idx[2], idx[3]);

        let stats = enforce_tier_ordering(&mut tree, &SimilarityIndex::default(), 3);

        assert_eq!(stats.reordered, 1);
        assert_eq!(tree.primary_parent(idx[3]), Some(idx[1]));
    }

    #[test]
    fn given_backward_edge_without_alternative_when_enforcing_then_goes_to_root() {
        let (mut tree, idx) = tree_of(&[Tier::Novice, Tier::Master, Tier::Apprentice]);
        tree.link(idx[0], idx[1]);
        tree.link(idx[1], idx[2]);

        let stats = enforce_tier_ordering(&mut tree, &SimilarityIndex::default(), 1);

        assert_eq!(stats.sent_to_root, 1);
        assert_eq!(tree.primary_parent(idx[2]), Some(idx[0]));
        assert!(tree.node(idx[0]).overflow);
    }

    #[rstest]
    #[case(10, (2, 7))]
    #[case(1, (0, 1))]
    #[case(0, (0, 1))]
    fn given_depth_when_cutting_sections_then_trunk_follows_root(#[case] max: usize, #[case] expected: (usize, usize)) {
        assert_eq!(section_cutoffs(max, 0.2, 0.5), expected);
    }

    #[test]
    fn given_chain_when_assigning_depths_then_bfs_distance() {
        let (mut tree, idx) = tree_of(&[Tier::Novice, Tier::Novice, Tier::Master, Tier::Expert]);
        tree.link(idx[0], idx[1]);
        tree.link(idx[1], idx[2]);

        assign_depths(&mut tree);
        assign_sections(&mut tree, 0.2, 0.5);

        assert_eq!(tree.node(idx[2]).depth, 2);
        assert_eq!(tree.node(idx[3]).depth, 3);
        assert_eq!(tree.node(idx[0]).section, Section::Root);
        assert_eq!(tree.node(idx[3]).section, Section::Branch);
    }
}
