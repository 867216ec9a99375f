//! Structural validation and bounded auto-repair of one school tree.
//!
//! Reachability is simulated the way a player unlocks items: a node opens
//! once all of its prerequisites are open, starting from the root.

use std::collections::{HashMap, HashSet};

use generational_arena::Index;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::domain::arena::TreeArena;

pub const AUTO_FIX_PASSES: usize = 20;

/// Problems found before the tree existed, carried into the report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeIssues {
    /// Identities seen more than once (first occurrence kept).
    pub duplicates: Vec<String>,
    /// `(node, unknown id)` pairs from a parsed document.
    pub missing_refs: Vec<(String, String)>,
}

/// Fixed-point unlock simulation from the root.
pub fn simulate_unlocks(tree: &TreeArena) -> HashSet<Index> {
    let Some(root) = tree.root() else {
        return HashSet::new();
    };
    let mut unlocked = HashSet::from([root]);
    for _ in 0..tree.len() + 10 {
        let mut changed = false;
        for (idx, node) in tree.nodes() {
            if unlocked.contains(&idx) || node.prerequisites.is_empty() {
                continue;
            }
            if node.prerequisites.iter().all(|p| unlocked.contains(p)) {
                unlocked.insert(idx);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    unlocked
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Open,
    Done,
}

/// Cycles in the prerequisite graph, each as the identities on the cycle.
#[instrument(level = "debug", skip(tree))]
pub fn detect_cycles(tree: &TreeArena) -> Vec<Vec<String>> {
    let mut marks: HashMap<Index, Mark> = HashMap::new();
    let mut cycles = Vec::new();

    for start in tree.indices() {
        if marks.contains_key(&start) {
            continue;
        }
        marks.insert(start, Mark::Open);
        let mut stack: Vec<(Index, usize)> = vec![(start, 0)];
        while let Some(top) = stack.last_mut() {
            let (node, pos) = *top;
            let prereqs = &tree.node(node).prerequisites;
            if pos >= prereqs.len() {
                marks.insert(node, Mark::Done);
                stack.pop();
                continue;
            }
            top.1 += 1;
            let next = prereqs[pos];
            match marks.get(&next) {
                None => {
                    marks.insert(next, Mark::Open);
                    stack.push((next, 0));
                }
                Some(Mark::Open) => {
                    let from = stack.iter().position(|(i, _)| *i == next).unwrap_or(0);
                    cycles.push(stack[from..].iter().map(|(i, _)| tree.node(*i).form_id.clone()).collect());
                }
                Some(Mark::Done) => {}
            }
        }
    }
    cycles
}

/// What [`auto_fix`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixStats {
    pub passes: usize,
    /// Nodes kept in place after dropping blocking prerequisites.
    pub pruned: usize,
    /// Nodes moved under a new unlocked parent.
    pub reattached: usize,
    /// Nodes force-attached to the root.
    pub forced: usize,
}

/// Repair unreachable nodes until the whole tree unlocks.
#[instrument(level = "debug", skip(tree))]
pub fn auto_fix(tree: &mut TreeArena, max_children: usize) -> FixStats {
    let mut stats = FixStats::default();
    let Some(root) = tree.root() else {
        return stats;
    };

    let mut stalled = false;
    for pass in 0..AUTO_FIX_PASSES {
        let unlocked = simulate_unlocks(tree);
        let stuck: Vec<Index> = tree.indices().filter(|idx| !unlocked.contains(idx)).collect();
        if stuck.is_empty() {
            break;
        }
        stats.passes = pass + 1;

        let mut progress = false;
        for node in stuck {
            let prereqs = tree.node(node).prerequisites.clone();
            let (open, blocking): (Vec<Index>, Vec<Index>) = prereqs.into_iter().partition(|p| unlocked.contains(p));
            if let Some(&keep) = open.first() {
                for b in blocking {
                    tree.unlink(b, node);
                }
                if tree.primary_parent(node).is_none() {
                    tree.link(keep, node);
                    if tree.children_count(keep) > max_children {
                        tree.node_mut(keep).overflow = true;
                    }
                }
                stats.pruned += 1;
                progress = true;
            } else if let Some(parent) = unlocked_parent(tree, &unlocked, node, max_children) {
                tree.detach(node);
                tree.link(parent, node);
                stats.reattached += 1;
                progress = true;
            }
        }
        if !progress {
            stalled = true;
            break;
        }
    }

    let unlocked = simulate_unlocks(tree);
    let remaining: Vec<Index> = tree.indices().filter(|idx| !unlocked.contains(idx)).collect();
    if !remaining.is_empty() {
        warn!(remaining = remaining.len(), stalled, "force-attaching to root");
        for node in remaining {
            tree.detach(node);
            tree.link(root, node);
            stats.forced += 1;
        }
        if tree.children_count(root) > max_children {
            tree.node_mut(root).overflow = true;
        }
    }
    debug!(?stats, "auto-fix done");
    stats
}

fn unlocked_parent(tree: &TreeArena, unlocked: &HashSet<Index>, node: Index, max_children: usize) -> Option<Index> {
    let n = tree.node(node);
    let mut best: Option<(i64, Index)> = None;
    for (cand, c) in tree.nodes() {
        if cand == node
            || !unlocked.contains(&cand)
            || c.tier > n.tier
            || !tree.has_capacity(cand, max_children)
            || tree.is_descendant(node, cand)
        {
            continue;
        }
        let gap = (n.tier_index() - c.tier_index()) as i64;
        let mut score = 20 - gap * 5 - c.children.len() as i64;
        if c.shares_theme(n) {
            score += 5;
        }
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, cand));
        }
    }
    best.map(|(_, idx)| idx)
}

/// Findings for one school.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub school: String,
    pub root: Option<String>,
    pub root_has_prerequisites: bool,
    pub cycles: Vec<Vec<String>>,
    pub unreachable: Vec<String>,
    /// Nodes above max-children, flagged or not.
    pub over_capacity: Vec<String>,
    pub overflow_nodes: Vec<String>,
    pub missing_prerequisites: Vec<(String, String)>,
    /// `(parent, child)` edges recorded on one side only.
    pub inconsistent_edges: Vec<(String, String)>,
    pub duplicate_ids: Vec<String>,
    pub total_nodes: usize,
    pub reachable_nodes: usize,
}

impl ValidationReport {
    pub fn errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.root.is_none() {
            errors.push(format!("{}: no root", self.school));
        }
        for cycle in &self.cycles {
            errors.push(format!("{}: cycle {}", self.school, cycle.join(" -> ")));
        }
        if !self.unreachable.is_empty() {
            errors.push(format!(
                "{}: {} unreachable node(s): {}",
                self.school,
                self.unreachable.len(),
                self.unreachable.join(", ")
            ));
        }
        for (node, missing) in &self.missing_prerequisites {
            errors.push(format!("{}: {node} references unknown {missing}", self.school));
        }
        errors
    }

    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.root_has_prerequisites {
            warnings.push(format!("{}: root has prerequisites", self.school));
        }
        for id in &self.over_capacity {
            let flagged = if self.overflow_nodes.contains(id) { " (overflow)" } else { "" };
            warnings.push(format!("{}: {id} exceeds max children{flagged}", self.school));
        }
        for (parent, child) in &self.inconsistent_edges {
            warnings.push(format!("{}: edge {parent} -> {child} is one-sided", self.school));
        }
        for id in &self.duplicate_ids {
            warnings.push(format!("{}: duplicate id {id} (first occurrence kept)", self.school));
        }
        warnings
    }

    pub fn is_valid(&self) -> bool {
        self.errors().is_empty()
    }
}

/// Inspect `tree` without changing it.
#[instrument(level = "debug", skip(tree, intake), fields(nodes = tree.len()))]
pub fn validate(school: &str, tree: &TreeArena, max_children: usize, intake: &IntakeIssues) -> ValidationReport {
    let unlocked = simulate_unlocks(tree);
    let id = |idx: Index| tree.node(idx).form_id.clone();

    let mut inconsistent = Vec::new();
    for (idx, node) in tree.nodes() {
        for &child in &node.children {
            if !tree.node(child).prerequisites.contains(&idx) {
                inconsistent.push((id(idx), id(child)));
            }
        }
        if !node.is_root && tree.primary_parent(idx).is_none() {
            inconsistent.extend(node.prerequisites.iter().map(|&p| (id(p), id(idx))));
        }
    }

    let report = ValidationReport {
        school: school.to_string(),
        root: tree.root().map(id),
        root_has_prerequisites: tree.root().is_some_and(|r| !tree.node(r).prerequisites.is_empty()),
        cycles: detect_cycles(tree),
        unreachable: tree.indices().filter(|i| !unlocked.contains(i)).map(id).collect(),
        over_capacity: tree
            .nodes()
            .filter(|(_, n)| n.children.len() > max_children)
            .map(|(_, n)| n.form_id.clone())
            .collect(),
        overflow_nodes: tree
            .nodes()
            .filter(|(_, n)| n.overflow)
            .map(|(_, n)| n.form_id.clone())
            .collect(),
        missing_prerequisites: intake.missing_refs.clone(),
        inconsistent_edges: inconsistent,
        duplicate_ids: intake.duplicates.clone(),
        total_nodes: tree.len(),
        reachable_nodes: unlocked.len(),
    };
    debug!(
        valid = report.is_valid(),
        reachable = report.reachable_nodes,
        total = report.total_nodes,
        "validated"
    );
    report
}

/// Forest-level roll-up of the per-school reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub all_valid: bool,
    pub total_schools: usize,
    pub valid_schools: usize,
    pub total_nodes: usize,
    pub reachable_nodes: usize,
    pub unreachable_nodes: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationSummary {
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a ValidationReport>) -> Self {
        let mut summary = Self {
            all_valid: true,
            ..Default::default()
        };
        for report in reports {
            summary.total_schools += 1;
            if report.is_valid() {
                summary.valid_schools += 1;
            } else {
                summary.all_valid = false;
            }
            summary.total_nodes += report.total_nodes;
            summary.reachable_nodes += report.reachable_nodes;
            summary.unreachable_nodes += report.unreachable.len();
            summary.errors.extend(report.errors());
            summary.warnings.extend(report.warnings());
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Item, Tier};

    fn tree_of(specs: &[(&str, Tier)]) -> (TreeArena, Vec<Index>) {
        let items: Vec<Item> = specs
            .iter()
            .map(|(id, tier)| Item::new(id, &format!("Spell {id}"), *tier, "Restoration"))
            .collect();
        let (mut tree, _) = TreeArena::from_items(&items);
        let idx: Vec<Index> = tree.indices().collect();
        tree.set_root(idx[0]);
        (tree, idx)
    }

    #[test]
    fn given_orphan_when_simulating_then_never_unlocked() {
        let (mut tree, idx) = tree_of(&[("r", Tier::Novice), ("a", Tier::Apprentice), ("o", Tier::Adept)]);
        tree.link(idx[0], idx[1]);

        let unlocked = simulate_unlocks(&tree);

        assert_eq!(unlocked.len(), 2);
        assert!(!unlocked.contains(&idx[2]));
    }

    #[test]
    fn given_two_node_loop_when_detecting_then_cycle_reported_in_order() {
        // Arrange
        let (mut tree, idx) = tree_of(&[("a", Tier::Novice), ("b", Tier::Novice), ("c", Tier::Novice)]);
        tree.link(idx[0], idx[1]);
        tree.link(idx[1], idx[2]);
        tree.link(idx[2], idx[1]);

        // Act
        let cycles = detect_cycles(&tree);

        // Assert
        assert_eq!(cycles, vec![vec!["b".to_string(), "c".to_string()]]);
    }

    #[test]
    fn given_orphan_when_fixing_then_attached_to_closest_unlocked_tier() {
        let (mut tree, idx) = tree_of(&[("r", Tier::Novice), ("a", Tier::Apprentice), ("o", Tier::Adept)]);
        tree.link(idx[0], idx[1]);

        let stats = auto_fix(&mut tree, 3);

        assert_eq!(stats.reattached, 1);
        assert_eq!(tree.primary_parent(idx[2]), Some(idx[1]));
        assert_eq!(simulate_unlocks(&tree).len(), 3);
    }

    #[test]
    fn given_blocking_prerequisite_when_fixing_then_open_one_becomes_primary() {
        // Arrange: y is listed by locked z and requires open r
        let (mut tree, idx) = tree_of(&[("r", Tier::Novice), ("z", Tier::Apprentice), ("y", Tier::Adept)]);
        tree.link(idx[1], idx[2]);
        tree.add_prerequisite(idx[2], idx[0]);

        // Act
        let stats = auto_fix(&mut tree, 3);

        // Assert
        assert!(stats.pruned >= 1);
        assert_eq!(tree.primary_parent(idx[2]), Some(idx[0]));
        assert!(!tree.node(idx[2]).prerequisites.contains(&idx[1]));
        assert_eq!(simulate_unlocks(&tree).len(), 3);
        assert_eq!(stats.forced, 0);
    }

    #[test]
    fn given_no_capable_parent_when_fixing_then_forced_under_root_with_overflow() {
        let (mut tree, idx) = tree_of(&[("r", Tier::Novice), ("a", Tier::Apprentice), ("o", Tier::Novice)]);
        tree.link(idx[0], idx[1]);

        let stats = auto_fix(&mut tree, 1);

        assert_eq!(stats.forced, 1);
        assert_eq!(tree.primary_parent(idx[2]), Some(idx[0]));
        assert!(tree.node(idx[0]).overflow);
    }

    #[test]
    fn given_valid_tree_when_validating_then_no_errors() {
        let (mut tree, idx) = tree_of(&[("r", Tier::Novice), ("a", Tier::Apprentice), ("b", Tier::Adept)]);
        tree.link(idx[0], idx[1]);
        tree.link(idx[1], idx[2]);

        let report = validate("Restoration", &tree, 3, &IntakeIssues::default());

        assert!(report.is_valid());
        assert!(report.warnings().is_empty());
        assert_eq!(report.reachable_nodes, 3);
    }

    #[test]
    fn given_broken_tree_when_summarizing_then_counts_errors() {
        // Arrange
        let (mut tree, idx) = tree_of(&[("r", Tier::Novice), ("a", Tier::Apprentice), ("o", Tier::Adept)]);
        tree.link(idx[0], idx[1]);
        let intake = IntakeIssues {
            duplicates: vec!["a".into()],
            missing_refs: Vec::new(),
        };

        // Act
        let report = validate("Restoration", &tree, 3, &intake);
        let summary = ValidationSummary::from_reports([&report]);

        // Assert
        assert!(!summary.all_valid);
        assert_eq!(summary.valid_schools, 0);
        assert_eq!(summary.unreachable_nodes, 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.warnings, vec!["Restoration: duplicate id a (first occurrence kept)".to_string()]);
    }
}
