//! Minimum-cost spanning arborescence over a sparse candidate graph.
//!
//! RNG draw order: one jitter draw per (child, candidate parent) pair, with
//! children and candidates both in arena order. On solver failure the
//! tier-greedy strategy continues on the same generator.

use std::collections::HashMap;

use generational_arena::Index;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use rand::rngs::StdRng;
use tracing::{debug, instrument, warn};

use super::edmonds::{min_arborescence, Edge};
use super::{tag_themes, uniform, GrowthContext, GrowthOutcome, GrowthStrategy, TierGreedy};
use crate::domain::arena::{TreeArena, TreeNode};
use crate::domain::build_config::StrategyKind;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::similarity::PairScores;

const MIN_EDGE_COST: f64 = 0.001;

/// Candidate edges; node weights are item identities, node `i` is the
/// `i`-th node of the tree in arena order.
pub type CandidateGraph = DiGraph<String, f64>;

/// Extracts a spanning arborescence from a candidate graph.
pub trait ArborescenceSolver {
    fn name(&self) -> &str;

    /// Chosen `(parent, child)` edges, one per non-root node.
    fn solve(&self, graph: &CandidateGraph, root: NodeIndex) -> DomainResult<Vec<(NodeIndex, NodeIndex)>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EdmondsSolver;

impl ArborescenceSolver for EdmondsSolver {
    fn name(&self) -> &str {
        "chu-liu-edmonds"
    }

    #[instrument(level = "debug", skip_all, fields(nodes = graph.node_count(), edges = graph.edge_count()))]
    fn solve(&self, graph: &CandidateGraph, root: NodeIndex) -> DomainResult<Vec<(NodeIndex, NodeIndex)>> {
        let infeasible = |unreached: usize| DomainError::ArborescenceInfeasible {
            root: graph.node_weight(root).cloned().unwrap_or_default(),
            unreached,
        };

        let mut bfs = Bfs::new(graph, root);
        let mut reached = 0;
        while bfs.next(graph).is_some() {
            reached += 1;
        }
        if reached < graph.node_count() {
            return Err(infeasible(graph.node_count() - reached));
        }

        let edges: Vec<Edge> = graph
            .edge_references()
            .map(|e| Edge::new(e.source().index(), e.target().index(), *e.weight()))
            .collect();
        let chosen = min_arborescence(graph.node_count(), root.index(), &edges).ok_or_else(|| infeasible(0))?;
        Ok(chosen
            .into_iter()
            .map(|i| (NodeIndex::new(edges[i].from), NodeIndex::new(edges[i].to)))
            .collect())
    }
}

/// Graph-optimal strategy with a pluggable solver.
pub struct Arborescence {
    solver: Box<dyn ArborescenceSolver>,
}

impl Arborescence {
    pub fn new(solver: Box<dyn ArborescenceSolver>) -> Self {
        Self { solver }
    }
}

/// Edge cost parent → child; lower is better.
pub(crate) fn edge_cost(parent: &TreeNode, child: &TreeNode, pair: PairScores, chaos: f64) -> f64 {
    let gap = child.tier_index() as i64 - parent.tier_index() as i64;
    let tier_term = match gap {
        1 => 0.0,
        2 => 10.0,
        g if g >= 3 => 5.0 * (g - 1) as f64,
        g => 50.0 + 30.0 * g.unsigned_abs() as f64,
    };
    let school_term = if parent.school == child.school { -5.0 } else { 15.0 };
    let meta = tier_term + school_term - pair.label * 30.0 - pair.name * 10.0;
    let nlp = (1.0 - pair.text) * 60.0;
    (1.0 - chaos) * meta + chaos * nlp
}

impl Arborescence {
    fn candidate_graph(
        &self,
        tree: &TreeArena,
        ctx: &GrowthContext<'_>,
        root: Index,
        rng: &mut StdRng,
    ) -> (CandidateGraph, Vec<Index>) {
        let order: Vec<Index> = tree.indices().collect();
        let mut graph = CandidateGraph::with_capacity(order.len(), order.len() * (ctx.config.candidate_k + 1));
        let position: HashMap<Index, NodeIndex> = order
            .iter()
            .map(|&idx| (idx, graph.add_node(tree.node(idx).form_id.clone())))
            .collect();
        let jitter_scale = ctx.config.force_balance * 5.0;

        for &child in order.iter().filter(|&&c| c != root) {
            let c = tree.node(child);
            let mut candidates: Vec<(f64, Index)> = Vec::new();
            for &parent in order.iter().filter(|&&p| p != child) {
                let p = tree.node(parent);
                if p.tier_index() > c.tier_index() + 1 {
                    continue;
                }
                let pair = ctx.sims.between(tree, parent, child);
                let cost = edge_cost(p, c, pair, ctx.config.chaos) + uniform(rng, 0.0, jitter_scale);
                candidates.push((cost.max(MIN_EDGE_COST), parent));
            }
            candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

            let root_edge = candidates.iter().find(|(_, p)| *p == root).copied();
            candidates.truncate(ctx.config.candidate_k);
            if let Some(edge) = root_edge {
                if !candidates.iter().any(|(_, p)| *p == root) {
                    candidates.push(edge);
                }
            }
            for (cost, parent) in candidates {
                graph.add_edge(position[&parent], position[&child], cost);
            }
        }
        (graph, order)
    }
}

impl GrowthStrategy for Arborescence {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Arborescence
    }

    #[instrument(level = "debug", skip_all, fields(school = ctx.school, solver = self.solver.name()))]
    fn grow(&self, tree: &mut TreeArena, ctx: &GrowthContext<'_>, rng: &mut StdRng) -> DomainResult<GrowthOutcome> {
        let root = tree
            .root()
            .ok_or_else(|| DomainError::EmptySchool(ctx.school.to_string()))?;
        tag_themes(tree, ctx);

        let (graph, order) = self.candidate_graph(tree, ctx, root, rng);
        let root_node = order
            .iter()
            .position(|&idx| idx == root)
            .map(NodeIndex::new)
            .ok_or_else(|| DomainError::UnknownNode(tree.node(root).form_id.clone()))?;

        match self.solver.solve(&graph, root_node) {
            Ok(mut edges) => {
                edges.sort_by_key(|(_, child)| child.index());
                for (parent, child) in edges {
                    tree.link(order[parent.index()], order[child.index()]);
                }
                debug!(edges = graph.edge_count(), "arborescence extracted");
                Ok(GrowthOutcome::default())
            }
            Err(e) => {
                warn!(school = ctx.school, error = %e, "arborescence failed, falling back to tier-greedy");
                let mut outcome = TierGreedy.grow(tree, ctx, rng)?;
                outcome.fallback = true;
                Ok(outcome)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::*;
    use crate::domain::build_config::BuildConfig;
    use crate::domain::entities::{Item, Tier};
    use rstest::rstest;

    struct Unavailable;

    impl ArborescenceSolver for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }

        fn solve(&self, _: &CandidateGraph, _: NodeIndex) -> DomainResult<Vec<(NodeIndex, NodeIndex)>> {
            Err(DomainError::SolverUnavailable("disabled".into()))
        }
    }

    fn node(tier: Tier) -> TreeNode {
        TreeNode::from_item(&Item::new("01", "x", tier, "Alteration"), 0)
    }

    #[rstest]
    #[case(Tier::Novice, Tier::Apprentice, -5.0)]
    #[case(Tier::Novice, Tier::Adept, 5.0)]
    #[case(Tier::Novice, Tier::Master, 10.0)]
    #[case(Tier::Adept, Tier::Adept, 45.0)]
    #[case(Tier::Adept, Tier::Apprentice, 75.0)]
    fn given_tier_gap_when_costing_then_prefers_one_tier_up(
        #[case] parent: Tier,
        #[case] child: Tier,
        #[case] expected: f64,
    ) {
        let cost = edge_cost(&node(parent), &node(child), PairScores::default(), 0.0);
        assert!((cost - expected).abs() < 1e-9, "cost {cost}");
    }

    #[test]
    fn given_full_chaos_when_costing_then_only_text_counts() {
        let pair = PairScores {
            text: 0.5,
            name: 1.0,
            label: 1.0,
        };
        let cost = edge_cost(&node(Tier::Novice), &node(Tier::Master), pair, 1.0);
        assert!((cost - 30.0).abs() < 1e-9);
    }

    #[test]
    fn given_tiered_items_when_growing_then_every_node_has_one_parent() {
        let fixture = Fixture::tiers(
            &[Tier::Novice, Tier::Novice, Tier::Apprentice, Tier::Adept, Tier::Expert, Tier::Master],
            BuildConfig::default().with_strategy(StrategyKind::Arborescence),
        );

        let (tree, outcome) = fixture.run(&Arborescence::new(Box::new(EdmondsSolver)), 5);

        assert!(!outcome.fallback);
        assert_eq!(tree.reachable_from_root().len(), 6);
        let root = tree.root().expect("root");
        for (idx, _) in tree.nodes().filter(|(i, _)| *i != root) {
            assert_eq!(tree.node(idx).prerequisites.len(), 1);
        }
    }

    #[test]
    fn given_unavailable_solver_when_growing_then_falls_back_to_tier_greedy() {
        let fixture = Fixture::tiers(
            &[Tier::Novice, Tier::Apprentice, Tier::Adept],
            BuildConfig::default().with_strategy(StrategyKind::Arborescence),
        );

        let (tree, outcome) = fixture.run(&Arborescence::new(Box::new(Unavailable)), 5);

        assert!(outcome.fallback);
        assert_eq!(tree.reachable_from_root().len(), 3);
    }
}
