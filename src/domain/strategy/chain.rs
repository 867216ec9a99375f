//! Chain wiring: externally supplied ordered chains, or theme lanes when a
//! school has none. Draws no randomness.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use generational_arena::Index;
use rand::rngs::StdRng;
use tracing::{debug, instrument};

use super::{
    attach, connect_leftovers, force_connect, least_loaded, sort_by_tier_and_cost, ChainInfo, ForceConnectWeights,
    GrowthContext, GrowthOutcome, GrowthStrategy,
};
use crate::domain::arena::TreeArena;
use crate::domain::build_config::{ChainStyle, StrategyKind};
use crate::domain::entities::Chain;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::themes::{group_best_fit, UNASSIGNED};

const GENERAL_LANE: &str = "General";
const NAME_OVERLAP: f64 = 0.5;
/// Lanes up to this length stay linear in branching style.
const BRANCHING_MIN_LEN: usize = 4;

const CHAIN_WEIGHTS: ForceConnectWeights = ForceConnectWeights {
    same_theme: 25.0,
    per_child: 10.0,
    text: 0.0,
    name: 0.0,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct ChainLanes;

/// A chain resolved against the school's nodes.
#[derive(Debug, Clone)]
struct Lane {
    name: String,
    narrative: String,
    nodes: Vec<Index>,
}

fn name_words(name: &str) -> BTreeSet<String> {
    name.split_whitespace().map(str::to_lowercase).collect()
}

/// Share of the smaller word set found in the other one.
fn name_overlap(a: &str, b: &str) -> f64 {
    let (wa, wb) = (name_words(a), name_words(b));
    let smaller = wa.len().min(wb.len());
    if smaller == 0 {
        return 0.0;
    }
    wa.intersection(&wb).count() as f64 / smaller as f64
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Resolve ids, dedupe across chains, drop empties, merge near-duplicate
/// names and give unmentioned nodes to the last chain.
fn normalize(tree: &TreeArena, chains: &[Chain], root: Index) -> Vec<Lane> {
    let mut seen: HashSet<Index> = HashSet::from([root]);
    let mut lanes: Vec<Lane> = Vec::new();
    for chain in chains {
        let nodes: Vec<Index> = chain
            .spell_ids
            .iter()
            .filter_map(|id| tree.index_of(id))
            .filter(|idx| seen.insert(*idx))
            .collect();
        if nodes.is_empty() {
            continue;
        }
        match lanes
            .iter_mut()
            .find(|l| name_overlap(&l.name, &chain.name) >= NAME_OVERLAP)
        {
            Some(existing) => existing.nodes.extend(nodes),
            None => lanes.push(Lane {
                name: chain.name.clone(),
                narrative: chain.narrative.clone(),
                nodes,
            }),
        }
    }
    if let Some(last) = lanes.last_mut() {
        last.nodes.extend(tree.indices().filter(|idx| !seen.contains(idx)));
    }
    lanes
}

impl ChainLanes {
    fn lanes_from_themes(tree: &TreeArena, ctx: &GrowthContext<'_>, root: Index) -> (Vec<Lane>, Vec<Index>) {
        let mut by_ordinal: BTreeMap<usize, Index> = BTreeMap::new();
        for (idx, node) in tree.nodes() {
            if idx != root {
                by_ordinal.insert(node.ordinal, idx);
            }
        }
        if ctx.themes.is_empty() {
            let lane = Lane {
                name: GENERAL_LANE.to_string(),
                narrative: String::new(),
                nodes: by_ordinal.into_values().collect(),
            };
            return (vec![lane], Vec::new());
        }

        let mut unassigned = Vec::new();
        let mut lanes = Vec::new();
        for (theme, ordinals) in group_best_fit(ctx.items, ctx.themes) {
            let nodes: Vec<Index> = ordinals.iter().filter_map(|o| by_ordinal.get(o).copied()).collect();
            if theme == UNASSIGNED {
                unassigned = nodes;
            } else if !nodes.is_empty() {
                lanes.push(Lane {
                    name: theme,
                    narrative: String::new(),
                    nodes,
                });
            }
        }
        (lanes, unassigned)
    }

    /// Head under the root (or the least-loaded node), the rest in sequence.
    /// Branching lanes longer than [`BRANCHING_MIN_LEN`] run their first half
    /// in sequence and fork the rest into two runs from its last item.
    fn wire_lane(tree: &mut TreeArena, root: Index, lane: &mut Lane, max: usize, style: ChainStyle) {
        sort_by_tier_and_cost(tree, &mut lane.nodes);
        for &node in &lane.nodes {
            tree.node_mut(node).theme = Some(lane.name.clone());
        }

        let nodes = &lane.nodes;
        if style == ChainStyle::Branching && nodes.len() > BRANCHING_MIN_LEN {
            let (trunk, rest) = nodes.split_at(nodes.len() / 2);
            let fork = Self::wire_run(tree, root, None, trunk, max);
            let (left, right) = rest.split_at(rest.len() / 2);
            Self::wire_run(tree, root, fork, left, max);
            Self::wire_run(tree, root, fork, right, max);
            debug!(lane = %lane.name, trunk = trunk.len(), "lane forked");
        } else {
            Self::wire_run(tree, root, None, nodes, max);
        }
    }

    /// Link `nodes` one after another, starting below `start` (the lane head
    /// when `None`). Returns the last node wired.
    fn wire_run(
        tree: &mut TreeArena,
        root: Index,
        start: Option<Index>,
        nodes: &[Index],
        max: usize,
    ) -> Option<Index> {
        let mut previous = start;
        for &node in nodes {
            let parent = match previous {
                None if tree.has_capacity(root, max) => root,
                None => least_loaded(tree, max, node).unwrap_or(root),
                Some(prev) if tree.has_capacity(prev, max) => prev,
                Some(_) => least_loaded(tree, max + 2, node).unwrap_or(root),
            };
            attach(tree, parent, node, max);
            previous = Some(node);
        }
        previous
    }
}

impl GrowthStrategy for ChainLanes {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Chain
    }

    #[instrument(level = "debug", skip_all, fields(school = ctx.school, chains = ctx.chains.len()))]
    fn grow(&self, tree: &mut TreeArena, ctx: &GrowthContext<'_>, _rng: &mut StdRng) -> DomainResult<GrowthOutcome> {
        let root = tree
            .root()
            .ok_or_else(|| DomainError::EmptySchool(ctx.school.to_string()))?;
        let max = ctx.max_children();

        let mut lanes = normalize(tree, ctx.chains, root);
        let mut unassigned = Vec::new();
        if lanes.is_empty() {
            (lanes, unassigned) = Self::lanes_from_themes(tree, ctx, root);
            debug!(lanes = lanes.len(), unassigned = unassigned.len(), "using theme lanes");
        }

        for lane in lanes.iter_mut() {
            Self::wire_lane(tree, root, lane, max, ctx.config.chain_style);
        }

        sort_by_tier_and_cost(tree, &mut unassigned);
        for node in unassigned {
            let reachable = tree.reachable_from_root();
            let node_tier = tree.node(node).tier;
            let parent = tree
                .indices()
                .filter(|&c| c != node && reachable.contains(&c) && tree.node(c).tier <= node_tier)
                .filter(|&c| tree.has_capacity(c, max))
                .min_by_key(|&c| tree.children_count(c));
            match parent {
                Some(parent) => tree.link(parent, node),
                None => {
                    force_connect(tree, ctx.sims, node, max, CHAIN_WEIGHTS);
                }
            }
        }
        connect_leftovers(tree, ctx.sims, max, CHAIN_WEIGHTS);

        let chains = lanes
            .into_iter()
            .map(|lane| ChainInfo {
                name: capitalize(&lane.name),
                narrative: lane.narrative,
                items: lane.nodes.iter().map(|&i| tree.node(i).form_id.clone()).collect(),
            })
            .collect();
        Ok(GrowthOutcome {
            chains,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::*;
    use crate::domain::build_config::BuildConfig;
    use crate::domain::entities::{Item, Tier};
    use rstest::rstest;

    fn items() -> Vec<Item> {
        vec![
            Item::new("01", "Candlelight", Tier::Novice, "Alteration"),
            Item::new("02", "Oakflesh", Tier::Novice, "Alteration").with_labels(&["Armor"]),
            Item::new("03", "Stoneflesh", Tier::Apprentice, "Alteration").with_labels(&["Armor"]),
            Item::new("04", "Ironflesh", Tier::Adept, "Alteration").with_labels(&["Armor"]),
            Item::new("05", "Detect Life", Tier::Apprentice, "Alteration"),
            Item::new("06", "Detect Dead", Tier::Adept, "Alteration"),
        ]
    }

    #[rstest]
    #[case("Stone Armor", "armor of stone", 1.0)]
    #[case("Fire Path", "Frost Path", 0.5)]
    #[case("Fire", "Frost", 0.0)]
    fn given_chain_names_when_comparing_then_overlap_relative_to_smaller(
        #[case] a: &str,
        #[case] b: &str,
        #[case] expected: f64,
    ) {
        assert_eq!(name_overlap(a, b), expected);
    }

    #[test]
    fn given_supplied_chains_when_growing_then_chains_are_wired_in_order() {
        // Arrange
        let mut config = BuildConfig::default().with_strategy(StrategyKind::Chain);
        config.selected_roots.insert("Alteration".into(), "01".into());
        let mut fixture = Fixture::new(items(), config);
        fixture.chains = vec![
            Chain::new("flesh path", &["04", "02", "03", "99"]),
            Chain::new("Flesh Path Two", &["05"]),
            Chain::new("detection", &["06", "02"]),
        ];

        // Act
        let (tree, outcome) = fixture.run(&ChainLanes, 3);

        // Assert
        assert_eq!(outcome.chains.len(), 2);
        assert_eq!(outcome.chains[0].name, "Flesh path");
        assert_eq!(outcome.chains[0].items, vec!["02", "05", "03", "04"]);
        assert_eq!(outcome.chains[1].items, vec!["06"]);
        let idx = |id: &str| tree.index_of(id).expect("known id");
        assert_eq!(tree.primary_parent(idx("02")), Some(idx("01")));
        assert_eq!(tree.primary_parent(idx("05")), Some(idx("02")));
        assert_eq!(tree.primary_parent(idx("03")), Some(idx("05")));
        assert_eq!(tree.node(idx("04")).theme.as_deref(), Some("flesh path"));
        assert_eq!(tree.reachable_from_root().len(), 6);
    }

    #[rstest]
    #[case(ChainStyle::Linear, "03")]
    #[case(ChainStyle::Branching, "05")]
    fn given_five_item_chain_when_growing_then_style_decides_fork(
        #[case] style: ChainStyle,
        #[case] parent_of_06: &str,
    ) {
        // Arrange
        let mut config = BuildConfig::default().with_strategy(StrategyKind::Chain);
        config.selected_roots.insert("Alteration".into(), "01".into());
        config.chain_style = style;
        let mut fixture = Fixture::new(items(), config);
        fixture.chains = vec![Chain::new("flesh", &["02", "03", "04", "05", "06"])];

        // Act
        let (tree, outcome) = fixture.run(&ChainLanes, 3);

        // Assert
        let idx = |id: &str| tree.index_of(id).expect("known id");
        assert_eq!(outcome.chains[0].items, vec!["02", "05", "03", "06", "04"]);
        assert_eq!(tree.primary_parent(idx("02")), Some(idx("01")));
        assert_eq!(tree.primary_parent(idx("05")), Some(idx("02")));
        assert_eq!(tree.primary_parent(idx("03")), Some(idx("05")));
        assert_eq!(tree.primary_parent(idx("06")), Some(idx(parent_of_06)));
        assert_eq!(tree.primary_parent(idx("04")), Some(idx("06")));
        let forks = if style == ChainStyle::Branching { 2 } else { 1 };
        assert_eq!(tree.children_count(idx("05")), forks);
    }

    #[test]
    fn given_short_chain_when_branching_style_then_stays_linear() {
        let mut config = BuildConfig::default().with_strategy(StrategyKind::Chain);
        config.selected_roots.insert("Alteration".into(), "01".into());
        config.chain_style = ChainStyle::Branching;
        let mut fixture = Fixture::new(items(), config);
        fixture.chains = vec![Chain::new("flesh", &["02", "03", "04", "05"])];

        let (tree, _) = fixture.run(&ChainLanes, 3);

        let idx = |id: &str| tree.index_of(id).expect("known id");
        assert_eq!(tree.children_count(idx("05")), 1);
        assert_eq!(tree.primary_parent(idx("04")), Some(idx("03")));
    }

    #[test]
    fn given_no_chains_and_no_themes_when_growing_then_single_general_lane() {
        let mut config = BuildConfig::default().with_strategy(StrategyKind::Chain);
        config.selected_roots.insert("Alteration".into(), "01".into());
        let fixture = Fixture::new(items(), config);

        let (tree, outcome) = fixture.run(&ChainLanes, 3);

        assert_eq!(outcome.chains.len(), 1);
        assert_eq!(outcome.chains[0].name, GENERAL_LANE);
        assert_eq!(outcome.chains[0].items.len(), 5);
        assert_eq!(tree.reachable_from_root().len(), 6);
    }
}
