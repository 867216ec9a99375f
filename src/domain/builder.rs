//! Per-school tree construction: grouping, growth, repair and validation.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use tracing::{debug, info, instrument, warn};

use crate::domain::arena::TreeArena;
use crate::domain::build_config::{BuildConfig, StrategyKind};
use crate::domain::convergence::add_convergence;
use crate::domain::entities::{BuildHints, Item};
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::repair::{assign_depths, assign_sections, constrain_branching, enforce_tier_ordering};
use crate::domain::similarity::SimilarityIndex;
use crate::domain::strategy::{
    connect_leftovers, pick_root, strategy_for, ForceConnectWeights, GrowthContext, GrowthOutcome, GrowthStrategy,
};
use crate::domain::themes::resolve_themes;
use crate::domain::validator::{auto_fix, validate, FixStats, IntakeIssues, ValidationReport};

/// One finished school.
#[derive(Debug, Clone)]
pub struct SchoolTree {
    pub school: String,
    pub tree: TreeArena,
    /// Kept items; position equals node ordinal.
    pub items: Vec<Item>,
    pub strategy: StrategyKind,
    pub outcome: GrowthOutcome,
    pub intake: IntakeIssues,
    pub fixes: FixStats,
    pub report: ValidationReport,
}

/// Builds school trees with one strategy and a normalized config.
pub struct TreeBuilder<'a> {
    config: BuildConfig,
    hints: &'a BuildHints,
    strategy: Box<dyn GrowthStrategy>,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(config: &BuildConfig, hints: &'a BuildHints) -> Self {
        let config = config.normalized();
        let strategy = strategy_for(config.strategy);
        Self {
            config,
            hints,
            strategy,
        }
    }

    /// Replace the strategy picked from the config.
    pub fn with_strategy(mut self, strategy: Box<dyn GrowthStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Items per school, schools in name order, items in input order.
    pub fn group_by_school(items: &[Item]) -> BTreeMap<String, Vec<Item>> {
        let mut schools: BTreeMap<String, Vec<Item>> = BTreeMap::new();
        for item in items {
            schools.entry(item.school_name().to_string()).or_default().push(item.clone());
        }
        schools
    }

    /// Every non-empty school, in name order, on one generator.
    #[instrument(level = "debug", skip_all, fields(items = items.len(), strategy = %self.strategy.kind()))]
    pub fn build_forest(&self, items: &[Item], rng: &mut StdRng) -> DomainResult<Vec<SchoolTree>> {
        let mut forest = Vec::new();
        for (school, members) in Self::group_by_school(items) {
            match self.build_school(&school, &members, rng) {
                Ok(tree) => forest.push(tree),
                Err(DomainError::EmptySchool(name)) => warn!(school = %name, "no usable items, skipped"),
                Err(e) => return Err(e),
            }
        }
        info!(schools = forest.len(), "forest built");
        Ok(forest)
    }

    #[instrument(level = "debug", skip(self, items, rng), fields(items = items.len()))]
    pub fn build_school(&self, school: &str, items: &[Item], rng: &mut StdRng) -> DomainResult<SchoolTree> {
        let config = &self.config;
        let max = config.max_children;

        let (mut tree, skipped) = TreeArena::from_items(items);
        let mut intake = IntakeIssues::default();
        for id in skipped {
            if id.trim().is_empty() {
                warn!(school, "item without identity skipped");
            } else {
                intake.duplicates.push(id);
            }
        }
        if tree.is_empty() {
            return Err(DomainError::EmptySchool(school.to_string()));
        }

        let mut first: HashMap<&str, &Item> = HashMap::new();
        for item in items {
            first.entry(item.form_id.as_str()).or_insert(item);
        }
        let kept: Vec<Item> = tree
            .nodes()
            .filter_map(|(_, node)| first.get(node.form_id.as_str()).map(|it| (*it).clone()))
            .collect();
        let refs: Vec<&Item> = kept.iter().collect();

        let sims = SimilarityIndex::build(&refs, config.thresholds());
        let themes = resolve_themes(school, &refs, self.hints.themes.get(school), config.top_themes_per_school);
        let chains = self.hints.chains.get(school).map(Vec::as_slice).unwrap_or_default();
        let ctx = GrowthContext {
            school,
            items: &refs,
            sims: &sims,
            config,
            themes: &themes,
            chains,
        };

        let root = pick_root(&tree, &ctx, rng)?;
        tree.set_root(root);
        let outcome = self.strategy.grow(&mut tree, &ctx, rng)?;
        connect_leftovers(&mut tree, &sims, max, ForceConnectWeights::default());

        let rerouted = constrain_branching(&mut tree, &sims, max);
        let reordered = enforce_tier_ordering(&mut tree, &sims, max);
        debug!(rerouted, ?reordered, "repaired");
        if config.convergence {
            assign_depths(&mut tree);
            add_convergence(&mut tree, &sims);
        }
        let fixes = if config.auto_fix {
            auto_fix(&mut tree, max)
        } else {
            FixStats::default()
        };
        assign_depths(&mut tree);
        assign_sections(&mut tree, config.section_root_pct, config.section_trunk_pct);

        let report = validate(school, &tree, max, &intake);
        if !report.is_valid() {
            warn!(school, errors = report.errors().len(), "school tree has errors");
        }
        Ok(SchoolTree {
            school: school.to_string(),
            tree,
            items: kept,
            strategy: self.strategy.kind(),
            outcome,
            intake,
            fixes,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Tier;
    use rand::SeedableRng;

    #[test]
    fn given_mixed_schools_when_grouping_then_name_order_and_blank_is_unknown() {
        let items = vec![
            Item::new("01", "A", Tier::Novice, "Restoration"),
            Item::new("02", "B", Tier::Novice, ""),
            Item::new("03", "C", Tier::Novice, "Alteration"),
        ];

        let groups = TreeBuilder::group_by_school(&items);

        assert_eq!(
            groups.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["Alteration", "Restoration", "Unknown"]
        );
    }

    #[test]
    fn given_duplicates_when_building_school_then_reported_and_tree_valid_otherwise() {
        // Arrange
        let items = vec![
            Item::new("01", "Spark", Tier::Novice, "Destruction"),
            Item::new("02", "Bolt", Tier::Apprentice, "Destruction"),
            Item::new("02", "Bolt Again", Tier::Adept, "Destruction"),
        ];
        let hints = BuildHints::default();
        let builder = TreeBuilder::new(&BuildConfig::default(), &hints);
        let mut rng = StdRng::seed_from_u64(4);

        // Act
        let school = builder.build_school("Destruction", &items, &mut rng).expect("builds");

        // Assert
        assert_eq!(school.tree.len(), 2);
        assert_eq!(school.items.len(), 2);
        assert_eq!(school.intake.duplicates, vec!["02".to_string()]);
        assert_eq!(school.report.reachable_nodes, 2);
        assert!(school.report.is_valid());
        assert_eq!(school.report.warnings(), vec!["Destruction: duplicate id 02 (first occurrence kept)".to_string()]);
    }

    #[test]
    fn given_only_blank_ids_when_building_forest_then_school_skipped() {
        let items = vec![Item::new("", "Ghost", Tier::Novice, "Illusion")];
        let hints = BuildHints::default();
        let builder = TreeBuilder::new(&BuildConfig::default(), &hints);
        let mut rng = StdRng::seed_from_u64(1);

        let forest = builder.build_forest(&items, &mut rng).expect("no hard error");

        assert!(forest.is_empty());
    }
}
