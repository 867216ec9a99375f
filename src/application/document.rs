//! Serialized tree document and its reverse mapping for re-validation.

use std::collections::{BTreeMap, HashSet};

use generational_arena::Index;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::arena::{Section, TreeArena};
use crate::domain::build_config::StrategyKind;
use crate::domain::builder::SchoolTree;
use crate::domain::entities::{Item, Tier};
use crate::domain::strategy::{Branch, ChainInfo};
use crate::domain::validator::{validate, IntakeIssues, ValidationReport, ValidationSummary};

pub const DOCUMENT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeDocument {
    pub version: String,
    pub seed: u64,
    pub strategy: StrategyKind,
    pub schools: BTreeMap<String, SchoolDocument>,
    pub validation: ValidationSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolDocument {
    pub root: String,
    pub strategy: StrategyKind,
    #[serde(default)]
    pub fallback: bool,
    pub nodes: Vec<NodeDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<Branch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chains: Vec<ChainInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDocument {
    pub form_id: String,
    pub name: String,
    pub children: Vec<String>,
    pub prerequisites: Vec<String>,
    /// Depth plus one.
    pub tier: usize,
    pub skill_level: String,
    pub section: Section,
    pub theme: Option<String>,
    #[serde(default)]
    pub overflow: bool,
    #[serde(default)]
    pub cross_prerequisites: Vec<String>,
    #[serde(default)]
    pub cross_children: Vec<String>,
}

impl SchoolDocument {
    pub fn from_school(school: &SchoolTree) -> Self {
        let tree = &school.tree;
        let ids = |list: &[Index]| -> Vec<String> {
            list.iter().map(|&i| tree.node(i).form_id.clone()).collect()
        };
        let nodes = tree
            .nodes()
            .map(|(_, n)| NodeDocument {
                form_id: n.form_id.clone(),
                name: n.name.clone(),
                children: ids(&n.children),
                prerequisites: ids(&n.prerequisites),
                tier: n.depth + 1,
                skill_level: n.tier.label().to_string(),
                section: n.section,
                theme: n.theme.clone(),
                overflow: n.overflow,
                cross_prerequisites: n.cross_prerequisites.clone(),
                cross_children: n.cross_children.clone(),
            })
            .collect();
        Self {
            root: tree.root().map(|r| tree.node(r).form_id.clone()).unwrap_or_default(),
            strategy: school.strategy,
            fallback: school.outcome.fallback,
            nodes,
            branches: school.outcome.branches.clone(),
            chains: school.outcome.chains.clone(),
        }
    }

    /// Rebuild the arena. Unknown child or prerequisite references are
    /// returned as `(node, missing)` pairs instead of being linked.
    pub fn to_arena(&self, school: &str) -> (TreeArena, IntakeIssues) {
        let items: Vec<Item> = self
            .nodes
            .iter()
            .map(|n| Item::new(&n.form_id, &n.name, Tier::from_label(&n.skill_level), school))
            .collect();
        let (mut tree, duplicates) = TreeArena::from_items(&items);
        let mut intake = IntakeIssues {
            duplicates,
            missing_refs: Vec::new(),
        };
        if let Some(root) = tree.index_of(&self.root) {
            tree.set_root(root);
        }

        let mut seen = HashSet::new();
        for doc in &self.nodes {
            let Some(idx) = tree.index_of(&doc.form_id) else {
                continue;
            };
            if !seen.insert(idx) {
                continue;
            }
            for child_id in &doc.children {
                match tree.index_of(child_id) {
                    Some(child) => tree.link(idx, child),
                    None => intake.missing_refs.push((doc.form_id.clone(), child_id.clone())),
                }
            }
            for prereq_id in &doc.prerequisites {
                match tree.index_of(prereq_id) {
                    Some(prereq) => tree.add_prerequisite(idx, prereq),
                    None => intake.missing_refs.push((doc.form_id.clone(), prereq_id.clone())),
                }
            }
            let node = tree.node_mut(idx);
            node.theme = doc.theme.clone();
            node.overflow = doc.overflow;
            node.section = doc.section;
            node.cross_prerequisites = doc.cross_prerequisites.clone();
            node.cross_children = doc.cross_children.clone();
        }
        for doc in &self.nodes {
            if let Some(idx) = tree.index_of(&doc.form_id) {
                tree.node_mut(idx).depth = doc.tier.saturating_sub(1);
            }
        }
        (tree, intake)
    }
}

impl TreeDocument {
    pub fn from_forest(seed: u64, strategy: StrategyKind, schools: &[SchoolTree]) -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            seed,
            strategy,
            schools: schools
                .iter()
                .map(|s| (s.school.clone(), SchoolDocument::from_school(s)))
                .collect(),
            validation: ValidationSummary::from_reports(schools.iter().map(|s| &s.report)),
        }
    }

    /// Validate the document as written, without repairing anything.
    #[instrument(level = "debug", skip(self), fields(schools = self.schools.len()))]
    pub fn revalidate(&self, max_children: usize) -> (Vec<ValidationReport>, ValidationSummary) {
        let reports: Vec<ValidationReport> = self
            .schools
            .iter()
            .map(|(name, school)| {
                let (tree, intake) = school.to_arena(name);
                validate(name, &tree, max_children, &intake)
            })
            .collect();
        let summary = ValidationSummary::from_reports(&reports);
        debug!(all_valid = summary.all_valid, "document revalidated");
        (reports, summary)
    }
}
