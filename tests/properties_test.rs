//! Property tests over random catalogs: determinism and structural guarantees.

use std::sync::Arc;

use proptest::prelude::*;

use spelltree::application::services::TreeBuildService;
use spelltree::domain::{BuildConfig, BuildHints, Item, StrategyKind, Tier};
use spelltree::infrastructure::traits::RealFileSystem;

const SCHOOLS: [&str; 3] = ["Alteration", "Conjuration", "Destruction"];
const WORDS: [&str; 8] = ["Flame", "Frost", "Ward", "Bound", "Shock", "Cloak", "Rune", "Atronach"];

fn arb_catalog() -> impl Strategy<Value = Vec<Item>> {
    prop::collection::vec((0usize..5, 0usize..SCHOOLS.len(), 0usize..WORDS.len(), 0u32..200), 1..24).prop_map(
        |rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (tier, school, word, cost))| {
                    let tier = Tier::from_index(tier).unwrap_or(Tier::Novice);
                    Item::new(&format!("{:08X}", 0x0500_0000 + i), &format!("{} {i}", WORDS[word]), tier, SCHOOLS[school])
                        .with_labels(&[WORDS[word]])
                        .with_cost(f64::from(cost))
                })
                .collect()
        },
    )
}

fn arb_strategy() -> impl Strategy<Value = StrategyKind> {
    prop::sample::select(StrategyKind::ALL.to_vec())
}

fn service() -> TreeBuildService {
    TreeBuildService::new(Arc::new(RealFileSystem))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn given_any_catalog_when_built_twice_with_same_seed_then_identical(
        items in arb_catalog(),
        strategy in arb_strategy(),
        seed in any::<u64>(),
        chaos in 0.0f64..1.0,
    ) {
        let config = BuildConfig::default().with_seed(seed).with_strategy(strategy).with_chaos(chaos);

        let first = service().build(&items, &BuildHints::default(), &config).expect("builds");
        let second = service().build(&items, &BuildHints::default(), &config).expect("builds");

        prop_assert_eq!(
            TreeBuildService::render(&first.document, false).expect("renders"),
            TreeBuildService::render(&second.document, false).expect("renders")
        );
    }

    #[test]
    fn given_any_catalog_when_built_then_reachable_acyclic_and_tier_monotone(
        items in arb_catalog(),
        strategy in arb_strategy(),
        seed in any::<u64>(),
        max_children in 1usize..5,
    ) {
        let config = BuildConfig::default()
            .with_seed(seed)
            .with_strategy(strategy)
            .with_max_children(max_children);

        let output = service().build(&items, &BuildHints::default(), &config).expect("builds");

        for school in &output.schools {
            let tree = &school.tree;
            let report = &school.report;
            prop_assert_eq!(report.reachable_nodes, report.total_nodes);
            prop_assert!(report.cycles.is_empty());

            let root = tree.root().expect("root");
            prop_assert!(tree.node(root).prerequisites.is_empty());
            prop_assert_eq!(tree.node(root).depth, 0);

            for (_, node) in tree.nodes() {
                for &child in &node.children {
                    prop_assert!(tree.node(child).tier >= node.tier);
                }
                for &prereq in &node.prerequisites {
                    prop_assert!(tree.node(prereq).tier <= node.tier);
                }
                prop_assert!(node.children.len() <= max_children || node.overflow, "{} over capacity", node.form_id);
            }
        }
    }
}
