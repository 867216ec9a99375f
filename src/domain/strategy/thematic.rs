//! Theme-clustered growth: a trunk from the largest theme, then the other
//! themes attached where they fit best.
//!
//! RNG draw order per round: one affinity-noise draw per remaining theme
//! (theme name order), then two draws per attachment candidate (placed
//! order). No draws while wiring or sweeping orphans.

use std::collections::{BTreeMap, HashSet, VecDeque};

use generational_arena::Index;
use rand::rngs::StdRng;
use tracing::{debug, instrument};

use super::{
    attach, connect_leftovers, force_connect, nearest_with_capacity, sort_by_tier_and_cost, uniform, Branch,
    ForceConnectWeights, GrowthContext, GrowthOutcome, GrowthStrategy,
};
use crate::domain::arena::TreeArena;
use crate::domain::build_config::{BranchStyle, StrategyKind};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::themes::{group_best_fit, UNASSIGNED};

const ALL_THEMES: &str = "_all";
const OTHER_BRANCH: &str = "other";

const ORPHAN_WEIGHTS: ForceConnectWeights = ForceConnectWeights {
    same_theme: 15.0,
    per_child: 8.0,
    text: 15.0,
    name: 10.0,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct Thematic;

/// Hang `items` below `attach_at` in the configured style. Returns the
/// nodes actually linked.
pub(crate) fn wire_group(
    tree: &mut TreeArena,
    attach_at: Index,
    items: &[Index],
    style: BranchStyle,
    max_children: usize,
) -> Vec<Index> {
    let mut queue = VecDeque::from([attach_at]);
    let mut previous = attach_at;
    let mut wired = Vec::with_capacity(items.len());

    for &item in items {
        let parent = match style {
            BranchStyle::Bfs => {
                while queue.front().is_some_and(|&p| !tree.has_capacity(p, max_children)) {
                    queue.pop_front();
                }
                queue.front().copied()
            }
            BranchStyle::Chain => Some(previous).filter(|&p| tree.has_capacity(p, max_children)),
        };
        let parent = parent
            .or_else(|| nearest_with_capacity(tree, attach_at, max_children))
            .unwrap_or(attach_at);
        attach(tree, parent, item, max_children);
        queue.push_back(item);
        previous = item;
        wired.push(item);
    }
    wired
}

impl Thematic {
    fn groups(tree: &TreeArena, ctx: &GrowthContext<'_>) -> (BTreeMap<String, Vec<Index>>, Vec<Index>) {
        let order: Vec<Index> = tree.indices().collect();
        let mut by_ordinal = vec![None; ctx.items.len()];
        for &idx in &order {
            by_ordinal[tree.node(idx).ordinal] = Some(idx);
        }
        let resolve = |ordinals: Vec<usize>| -> Vec<Index> {
            ordinals.into_iter().filter_map(|o| by_ordinal.get(o).copied().flatten()).collect()
        };

        let mut groups: BTreeMap<String, Vec<Index>> = group_best_fit(ctx.items, ctx.themes)
            .into_iter()
            .map(|(theme, ordinals)| (theme, resolve(ordinals)))
            .collect();
        let orphans = groups.remove(UNASSIGNED).unwrap_or_default();
        if groups.is_empty() {
            groups.insert(ALL_THEMES.to_string(), order);
            return (groups, Vec::new());
        }
        (groups, orphans)
    }

    /// Average best affinity of a theme's items to the placed set, scaled.
    fn affinity(tree: &TreeArena, ctx: &GrowthContext<'_>, items: &[Index], placed: &[Index]) -> f64 {
        if items.is_empty() {
            return 0.0;
        }
        let total: f64 = items
            .iter()
            .map(|&item| {
                placed
                    .iter()
                    .map(|&p| {
                        let pair = ctx.sims.between(tree, item, p);
                        pair.label * 0.6 + pair.text * 0.4
                    })
                    .fold(0.0, f64::max)
            })
            .sum();
        total / items.len() as f64 * 100.0 + items.len().min(20) as f64 * 0.5
    }

    fn attachment_point(
        tree: &TreeArena,
        ctx: &GrowthContext<'_>,
        representative: Index,
        placed: &[Index],
        rng: &mut StdRng,
    ) -> Option<Index> {
        let rep_tier = tree.node(representative).tier;
        let lower: Vec<Index> = placed
            .iter()
            .copied()
            .filter(|&p| tree.node(p).tier <= rep_tier)
            .collect();
        let pool = if lower.is_empty() { placed } else { &lower };
        let chaos = ctx.config.chaos;

        let mut best: Option<(f64, Index)> = None;
        for &cand in pool {
            let c = tree.node(cand);
            let pair = ctx.sims.between(tree, representative, cand);
            let score = pair.label * 35.0 + pair.text * 25.0 + pair.name * 20.0
                - c.tier_index() as f64 * 5.0
                - c.children.len() as f64 * 8.0
                + chaos * uniform(rng, -20.0, 20.0)
                + uniform(rng, -1.0, 1.0);
            if best.map_or(true, |(s, _)| score > s) {
                best = Some((score, cand));
            }
        }
        best.map(|(_, idx)| idx)
    }
}

impl GrowthStrategy for Thematic {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Thematic
    }

    #[instrument(level = "debug", skip_all, fields(school = ctx.school))]
    fn grow(&self, tree: &mut TreeArena, ctx: &GrowthContext<'_>, rng: &mut StdRng) -> DomainResult<GrowthOutcome> {
        let root = tree
            .root()
            .ok_or_else(|| DomainError::EmptySchool(ctx.school.to_string()))?;
        let max = ctx.max_children();
        let style = ctx.config.branch_style;

        let (mut groups, mut orphans) = Self::groups(tree, ctx);
        for (theme, members) in &groups {
            if theme == ALL_THEMES {
                continue;
            }
            for &idx in members {
                tree.node_mut(idx).theme = Some(theme.clone());
            }
        }
        for members in groups.values_mut() {
            members.retain(|&idx| idx != root);
            sort_by_tier_and_cost(tree, members);
        }

        // largest group wins; BTreeMap order breaks ties by name
        let trunk_name = groups
            .iter()
            .fold(None::<(&String, usize)>, |best, (name, members)| match best {
                Some((_, size)) if size >= members.len() => best,
                _ => Some((name, members.len())),
            })
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| ALL_THEMES.to_string());
        let trunk = groups.remove(&trunk_name).unwrap_or_default();

        let wired = wire_group(tree, root, &trunk, style, max);
        let mut placed: Vec<Index> = vec![root];
        placed.extend(&wired);
        let mut branches = vec![Branch {
            theme: trunk_name.clone(),
            attachment: Some(tree.node(root).form_id.clone()),
            items: wired.iter().map(|&i| tree.node(i).form_id.clone()).collect(),
        }];
        debug!(trunk = %trunk_name, size = wired.len(), "trunk wired");

        let mut remaining: BTreeMap<String, Vec<Index>> = groups.into_iter().filter(|(_, m)| !m.is_empty()).collect();
        while !remaining.is_empty() {
            let mut best: Option<(f64, String)> = None;
            for (theme, members) in &remaining {
                let score =
                    Self::affinity(tree, ctx, members, &placed) + ctx.config.chaos * uniform(rng, -10.0, 10.0);
                if best.as_ref().map_or(true, |(s, _)| score > *s) {
                    best = Some((score, theme.clone()));
                }
            }
            let Some((_, theme)) = best else { break };
            let members = remaining.remove(&theme).unwrap_or_default();
            let Some(&representative) = members.first() else {
                continue;
            };

            let attach_at = Self::attachment_point(tree, ctx, representative, &placed, rng).unwrap_or(root);
            let wired = wire_group(tree, attach_at, &members, style, max);
            debug!(theme = %theme, attach_at = %tree.node(attach_at).form_id, size = wired.len(), "branch attached");
            branches.push(Branch {
                theme,
                attachment: Some(tree.node(attach_at).form_id.clone()),
                items: wired.iter().map(|&i| tree.node(i).form_id.clone()).collect(),
            });
            placed.extend(wired);
        }

        orphans.retain(|&idx| idx != root);
        sort_by_tier_and_cost(tree, &mut orphans);
        for orphan in orphans {
            force_connect(tree, ctx.sims, orphan, max, ORPHAN_WEIGHTS);
        }
        connect_leftovers(tree, ctx.sims, max, ORPHAN_WEIGHTS);

        let in_branch: HashSet<&String> = branches.iter().flat_map(|b| b.items.iter()).collect();
        let other: Vec<String> = tree
            .iter()
            .filter(|(idx, n)| *idx != root && !in_branch.contains(&n.form_id))
            .map(|(_, n)| n.form_id.clone())
            .collect();
        if !other.is_empty() {
            branches.push(Branch {
                theme: OTHER_BRANCH.to_string(),
                attachment: None,
                items: other,
            });
        }

        Ok(GrowthOutcome {
            branches,
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

    fn fixture(style: BranchStyle) -> Fixture {
        let items = vec![
            Item::new("01", "Flames", Tier::Novice, "Destruction").with_labels(&["Fire Damage"]),
            Item::new("02", "Firebolt", Tier::Apprentice, "Destruction").with_labels(&["Fire Damage"]),
            Item::new("03", "Fireball", Tier::Adept, "Destruction").with_labels(&["Fire Damage"]),
            Item::new("04", "Incinerate", Tier::Expert, "Destruction").with_labels(&["Fire Damage"]),
            Item::new("05", "Frostbite", Tier::Novice, "Destruction").with_labels(&["Frost Damage"]),
            Item::new("06", "Ice Spike", Tier::Apprentice, "Destruction").with_labels(&["Frost Damage"]),
            Item::new("07", "Zzyzx", Tier::Adept, "Destruction"),
        ];
        let mut config = BuildConfig::default().with_strategy(StrategyKind::Thematic);
        config.branch_style = style;
        let mut fixture = Fixture::new(items, config);
        fixture.themes = vec!["fire".into(), "frost".into()];
        fixture
    }

    #[test]
    fn given_two_themes_when_growing_then_largest_is_trunk_and_all_reachable() {
        // Arrange
        let fixture = fixture(BranchStyle::Bfs);

        // Act
        let (tree, outcome) = fixture.run(&Thematic, 11);

        // Assert
        assert_eq!(tree.reachable_from_root().len(), 7);
        assert_eq!(outcome.branches[0].theme, "fire");
        assert!(outcome.branches.iter().any(|b| b.theme == "frost"));
        let other = outcome.branches.iter().find(|b| b.theme == OTHER_BRANCH).expect("orphan branch");
        assert_eq!(other.items, vec!["07".to_string()]);
    }

    #[test]
    fn given_chain_style_when_growing_then_trunk_is_linear() {
        let fixture = fixture(BranchStyle::Chain);

        let (tree, outcome) = fixture.run(&Thematic, 11);

        let trunk = &outcome.branches[0];
        for pair in trunk.items.windows(2) {
            let parent = tree.index_of(&pair[0]).expect("known");
            let child = tree.index_of(&pair[1]).expect("known");
            assert_eq!(tree.primary_parent(child), Some(parent));
        }
    }

    #[test]
    fn given_no_themes_when_growing_then_everything_is_one_cluster() {
        let mut fixture = fixture(BranchStyle::Bfs);
        fixture.themes.clear();

        let (tree, outcome) = fixture.run(&Thematic, 2);

        assert_eq!(outcome.branches.len(), 1);
        assert_eq!(outcome.branches[0].theme, ALL_THEMES);
        assert_eq!(tree.reachable_from_root().len(), 7);
        assert!(tree.nodes().all(|(_, n)| n.children.len() <= 3));
    }
}
