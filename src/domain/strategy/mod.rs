//! Growth strategies and the helpers they share.
//!
//! Every strategy receives a tree whose root is already chosen (see
//! [`pick_root`]) and must leave every node reachable from it. Repair,
//! convergence and validation run afterwards and draw no randomness.

mod arborescence;
mod chain;
pub mod edmonds;
mod thematic;
mod tier_greedy;

use std::collections::{HashSet, VecDeque};

use generational_arena::Index;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::arena::TreeArena;
use crate::domain::build_config::{BuildConfig, StrategyKind};
use crate::domain::entities::{Chain, Item};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::similarity::SimilarityIndex;
use crate::domain::themes::theme_tag;

pub use arborescence::{Arborescence, ArborescenceSolver, CandidateGraph, EdmondsSolver};
pub use chain::ChainLanes;
pub use thematic::Thematic;
pub use tier_greedy::TierGreedy;

/// A theme cluster hung off one attachment point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub theme: String,
    pub attachment: Option<String>,
    pub items: Vec<String>,
}

/// A wired chain or lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub name: String,
    pub narrative: String,
    pub items: Vec<String>,
}

/// Strategy metadata carried into the output document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrowthOutcome {
    pub branches: Vec<Branch>,
    pub chains: Vec<ChainInfo>,
    /// Arborescence fell back to tier-greedy.
    pub fallback: bool,
}

/// Read-only inputs for growing one school.
pub struct GrowthContext<'a> {
    pub school: &'a str,
    /// School items in ordinal order.
    pub items: &'a [&'a Item],
    pub sims: &'a SimilarityIndex,
    pub config: &'a BuildConfig,
    pub themes: &'a [String],
    pub chains: &'a [Chain],
}

impl GrowthContext<'_> {
    pub fn max_children(&self) -> usize {
        self.config.max_children
    }

    pub fn item(&self, tree: &TreeArena, idx: Index) -> &Item {
        self.items[tree.node(idx).ordinal]
    }
}

pub trait GrowthStrategy {
    fn kind(&self) -> StrategyKind;

    /// Connect every node of `tree` under its root.
    fn grow(&self, tree: &mut TreeArena, ctx: &GrowthContext<'_>, rng: &mut StdRng) -> DomainResult<GrowthOutcome>;
}

/// Default strategy instance for `kind`.
pub fn strategy_for(kind: StrategyKind) -> Box<dyn GrowthStrategy> {
    match kind {
        StrategyKind::TierGreedy => Box::new(TierGreedy),
        StrategyKind::Arborescence => Box::new(Arborescence::new(Box::new(EdmondsSolver))),
        StrategyKind::Thematic => Box::new(Thematic),
        StrategyKind::Chain => Box::new(ChainLanes),
    }
}

/// Uniform draw in `[lo, hi)`; always consumes exactly one value.
pub(crate) fn uniform(rng: &mut StdRng, lo: f64, hi: f64) -> f64 {
    lo + rng.gen::<f64>() * (hi - lo)
}

/// Choose the school root. Consumes at most one draw.
///
/// A configured override wins when it names an item of this school;
/// otherwise the lowest non-empty tier is used, preferring base-game items.
#[instrument(level = "debug", skip(tree, ctx, rng), fields(school = ctx.school))]
pub fn pick_root(tree: &TreeArena, ctx: &GrowthContext<'_>, rng: &mut StdRng) -> DomainResult<Index> {
    if let Some(idx) = ctx
        .config
        .selected_roots
        .get(ctx.school)
        .and_then(|id| tree.index_of(id))
    {
        debug!(root = %tree.node(idx).form_id, "using selected root");
        return Ok(idx);
    }

    let lowest = tree
        .nodes()
        .map(|(_, n)| n.tier)
        .min()
        .ok_or_else(|| DomainError::EmptySchool(ctx.school.to_string()))?;
    let tier_nodes: Vec<Index> = tree
        .nodes()
        .filter(|(_, n)| n.tier == lowest)
        .map(|(idx, _)| idx)
        .collect();

    let vanilla: Vec<Index> = if ctx.config.prefer_vanilla_roots {
        tier_nodes
            .iter()
            .copied()
            .filter(|&idx| ctx.item(tree, idx).is_vanilla())
            .collect()
    } else {
        Vec::new()
    };
    let pool = if vanilla.is_empty() { &tier_nodes } else { &vanilla };

    let chosen = if pool.len() == 1 {
        pool[0]
    } else {
        pool[rng.gen_range(0..pool.len())]
    };
    debug!(root = %tree.node(chosen).form_id, candidates = pool.len(), "picked root");
    Ok(chosen)
}

/// Tag nodes with their best-fit theme (score above the grouping floor).
pub fn tag_themes(tree: &mut TreeArena, ctx: &GrowthContext<'_>) {
    if ctx.themes.is_empty() {
        return;
    }
    let indices: Vec<Index> = tree.indices().collect();
    for idx in indices {
        let theme = theme_tag(ctx.item(tree, idx), ctx.themes);
        tree.node_mut(idx).theme = theme;
    }
}

/// Order by tier, then cost, then name.
pub fn sort_by_tier_and_cost(tree: &TreeArena, nodes: &mut [Index]) {
    nodes.sort_by(|&a, &b| {
        let (na, nb) = (tree.node(a), tree.node(b));
        na.tier
            .cmp(&nb.tier)
            .then_with(|| na.cost.total_cmp(&nb.cost))
            .then_with(|| na.name.cmp(&nb.name))
    });
}

/// Weights of the last-resort attachment score.
#[derive(Debug, Clone, Copy)]
pub struct ForceConnectWeights {
    pub same_theme: f64,
    pub per_child: f64,
    pub text: f64,
    pub name: f64,
}

impl Default for ForceConnectWeights {
    fn default() -> Self {
        Self {
            same_theme: 15.0,
            per_child: 8.0,
            text: 0.0,
            name: 0.0,
        }
    }
}

/// Attach `node` to the best connected node, heavily penalizing higher-tier
/// candidates. Falls back to the root. Returns the chosen parent.
#[instrument(level = "trace", skip(tree, sims, weights))]
pub fn force_connect(
    tree: &mut TreeArena,
    sims: &SimilarityIndex,
    node: Index,
    max_children: usize,
    weights: ForceConnectWeights,
) -> Option<Index> {
    let root = tree.root()?;
    let reachable = tree.reachable_from_root();
    let node_tier = tree.node(node).tier_index() as f64;

    let mut best: Option<(f64, Index)> = None;
    for cand in tree.indices().filter(|c| reachable.contains(c) && *c != node) {
        let c = tree.node(cand);
        let cand_tier = c.tier_index() as f64;
        let pair = sims.between(tree, node, cand);
        let mut score = if cand_tier <= node_tier {
            100.0 - 5.0 * (node_tier - cand_tier)
        } else {
            -200.0
        };
        score += pair.label * 30.0 + pair.text * weights.text + pair.name * weights.name;
        if c.shares_theme(tree.node(node)) {
            score += weights.same_theme;
        }
        score -= c.children.len() as f64 * weights.per_child;
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, cand));
        }
    }

    let parent = best.map_or(root, |(_, idx)| idx);
    attach(tree, parent, node, max_children);
    Some(parent)
}

/// Link and flag the parent when it went past `max_children`.
pub(crate) fn attach(tree: &mut TreeArena, parent: Index, child: Index, max_children: usize) {
    tree.link(parent, child);
    if tree.children_count(parent) > max_children {
        tree.node_mut(parent).overflow = true;
    }
}

/// Connected node with the fewest children among those with spare capacity
/// (arena order on ties).
pub(crate) fn least_loaded(tree: &TreeArena, limit: usize, exclude: Index) -> Option<Index> {
    let reachable = tree.reachable_from_root();
    tree.indices()
        .filter(|idx| *idx != exclude && reachable.contains(idx) && tree.children_count(*idx) < limit)
        .min_by_key(|&idx| tree.children_count(idx))
}

/// Nearest node with spare capacity, walking prerequisites and children
/// breadth-first from `start`.
pub(crate) fn nearest_with_capacity(tree: &TreeArena, start: Index, max_children: usize) -> Option<Index> {
    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(cur) = queue.pop_front() {
        if tree.has_capacity(cur, max_children) {
            return Some(cur);
        }
        let node = tree.node(cur);
        for &next in node.prerequisites.iter().chain(node.children.iter()) {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    None
}

/// Attach every node still unreachable from the root.
pub fn connect_leftovers(
    tree: &mut TreeArena,
    sims: &SimilarityIndex,
    max_children: usize,
    weights: ForceConnectWeights,
) -> usize {
    let mut attached = 0;
    loop {
        let reachable = tree.reachable_from_root();
        let Some(next) = tree.indices().find(|idx| !reachable.contains(idx)) else {
            break;
        };
        tree.detach(next);
        if force_connect(tree, sims, next, max_children, weights).is_none() {
            break;
        }
        attached += 1;
    }
    if attached > 0 {
        debug!(attached, "force-connected leftovers");
    }
    attached
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::entities::Tier;
    use crate::domain::similarity::SimilarityThresholds;

    /// Owned inputs for building a `GrowthContext` in unit tests.
    pub struct Fixture {
        pub items: Vec<Item>,
        pub config: BuildConfig,
        pub themes: Vec<String>,
        pub chains: Vec<Chain>,
    }

    impl Fixture {
        pub fn new(items: Vec<Item>, config: BuildConfig) -> Self {
            Self {
                items,
                config: config.normalized(),
                themes: Vec::new(),
                chains: Vec::new(),
            }
        }

        pub fn tiers(tiers: &[Tier], config: BuildConfig) -> Self {
            let items = tiers
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    Item::new(&format!("{:08X}", 0x0500_0000 + i), &format!("Spell {i}"), *t, "Alteration")
                        .with_cost(i as f64)
                })
                .collect();
            Self::new(items, config)
        }

        pub fn run(&self, strategy: &dyn GrowthStrategy, seed: u64) -> (TreeArena, GrowthOutcome) {
            use rand::SeedableRng;
            let refs: Vec<&Item> = self.items.iter().collect();
            let sims = SimilarityIndex::build(&refs, SimilarityThresholds::default());
            let ctx = GrowthContext {
                school: "Alteration",
                items: &refs,
                sims: &sims,
                config: &self.config,
                themes: &self.themes,
                chains: &self.chains,
            };
            let mut rng = StdRng::seed_from_u64(seed);
            let (mut tree, _) = TreeArena::from_items(&self.items);
            let root = pick_root(&tree, &ctx, &mut rng).expect("non-empty school");
            tree.set_root(root);
            let outcome = strategy.grow(&mut tree, &ctx, &mut rng).expect("strategy grows");
            (tree, outcome)
        }
    }
}
