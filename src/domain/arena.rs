use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use generational_arena::{Arena, Index};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::domain::entities::{Item, Tier};

/// Cosmetic depth band of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    #[default]
    Root,
    Trunk,
    Branch,
}

/// Tree node for one item in a school tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub form_id: String,
    pub name: String,
    pub tier: Tier,
    pub school: String,
    pub cost: f64,
    /// Position of the item in the school's item list; keys the similarity index
    pub ordinal: usize,
    pub theme: Option<String>,
    /// Indices of child nodes (primary tree edges only)
    pub children: Vec<Index>,
    /// Indices of prerequisite nodes (primary parent plus convergence links)
    pub prerequisites: Vec<Index>,
    pub depth: usize,
    pub is_root: bool,
    pub section: Section,
    /// Set when a last-resort attach pushed a parent past max-children
    pub overflow: bool,
    /// Prerequisites living in other schools' trees
    pub cross_prerequisites: Vec<String>,
    pub cross_children: Vec<String>,
}

impl TreeNode {
    pub fn from_item(item: &Item, ordinal: usize) -> Self {
        let name = if item.name.is_empty() {
            item.form_id.clone()
        } else {
            item.name.clone()
        };
        Self {
            form_id: item.form_id.clone(),
            name,
            tier: item.tier(),
            school: item.school_name().to_string(),
            cost: item.magicka_cost,
            ordinal,
            theme: None,
            children: Vec::new(),
            prerequisites: Vec::new(),
            depth: 0,
            is_root: false,
            section: Section::Root,
            overflow: false,
            cross_prerequisites: Vec::new(),
            cross_children: Vec::new(),
        }
    }

    pub fn tier_index(&self) -> usize {
        self.tier.index()
    }

    pub fn shares_theme(&self, other: &TreeNode) -> bool {
        matches!((&self.theme, &other.theme), (Some(a), Some(b)) if a == b)
    }
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] ({})", self.name, self.tier, self.form_id)
    }
}

/// Arena-backed tree of one school.
///
/// Nodes are stored in a generational arena and addressed by `Index`;
/// insertion order is tracked separately so every traversal that feeds the
/// output or the RNG is deterministic.
#[derive(Debug, Default, Clone)]
pub struct TreeArena {
    arena: Arena<TreeNode>,
    order: Vec<Index>,
    by_form_id: HashMap<String, Index>,
    root: Option<Index>,
}

impl TreeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an arena with one node per item, in item order.
    ///
    /// Items with an empty identity or an identity seen before are skipped;
    /// their identities are returned for reporting.
    #[instrument(level = "debug", skip(items), fields(items = items.len()))]
    pub fn from_items(items: &[Item]) -> (Self, Vec<String>) {
        let mut tree = Self::new();
        let mut skipped = Vec::new();
        for item in items {
            if item.form_id.trim().is_empty() || tree.by_form_id.contains_key(&item.form_id) {
                skipped.push(item.form_id.clone());
                continue;
            }
            let ordinal = tree.order.len();
            tree.insert_node(TreeNode::from_item(item, ordinal));
        }
        (tree, skipped)
    }

    #[instrument(level = "trace", skip(self, node), fields(form_id = %node.form_id))]
    pub fn insert_node(&mut self, node: TreeNode) -> Index {
        let form_id = node.form_id.clone();
        let idx = self.arena.insert(node);
        self.order.push(idx);
        self.by_form_id.insert(form_id, idx);
        idx
    }

    pub fn get_node(&self, idx: Index) -> Option<&TreeNode> {
        self.arena.get(idx)
    }

    pub fn get_node_mut(&mut self, idx: Index) -> Option<&mut TreeNode> {
        self.arena.get_mut(idx)
    }

    /// Direct access for indices handed out by this arena.
    pub fn node(&self, idx: Index) -> &TreeNode {
        &self.arena[idx]
    }

    pub fn node_mut(&mut self, idx: Index) -> &mut TreeNode {
        &mut self.arena[idx]
    }

    pub fn index_of(&self, form_id: &str) -> Option<Index> {
        self.by_form_id.get(form_id).copied()
    }

    pub fn root(&self) -> Option<Index> {
        self.root
    }

    /// Mark `idx` as the single root: depth 0, no prerequisites.
    #[instrument(level = "debug", skip(self))]
    pub fn set_root(&mut self, idx: Index) {
        if let Some(previous) = self.root.take() {
            if let Some(node) = self.arena.get_mut(previous) {
                node.is_root = false;
            }
        }
        let prereqs = std::mem::take(&mut self.node_mut(idx).prerequisites);
        for parent in prereqs {
            if let Some(p) = self.arena.get_mut(parent) {
                p.children.retain(|&c| c != idx);
            }
        }
        let root = self.node_mut(idx);
        root.is_root = true;
        root.depth = 0;
        self.root = Some(idx);
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Node indices in insertion order.
    pub fn indices(&self) -> impl Iterator<Item = Index> + '_ {
        self.order.iter().copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (Index, &TreeNode)> + '_ {
        self.order.iter().map(move |&idx| (idx, &self.arena[idx]))
    }

    pub fn children_count(&self, idx: Index) -> usize {
        self.node(idx).children.len()
    }

    pub fn has_capacity(&self, idx: Index, max_children: usize) -> bool {
        self.children_count(idx) < max_children
    }

    /// Add a primary edge; both sides stay duplicate-free.
    #[instrument(level = "trace", skip(self))]
    pub fn link(&mut self, parent: Index, child: Index) {
        if parent == child {
            return;
        }
        let parent_depth = self.node(parent).depth;
        let p = self.node_mut(parent);
        if !p.children.contains(&child) {
            p.children.push(child);
        }
        let c = self.node_mut(child);
        if !c.prerequisites.contains(&parent) {
            c.prerequisites.push(parent);
        }
        c.depth = parent_depth + 1;
    }

    #[instrument(level = "trace", skip(self))]
    pub fn unlink(&mut self, parent: Index, child: Index) {
        self.node_mut(parent).children.retain(|&c| c != child);
        self.node_mut(child).prerequisites.retain(|&p| p != parent);
    }

    /// Move `child` under `new_parent`, dropping its current primary parent.
    pub fn reparent(&mut self, child: Index, new_parent: Index) {
        if let Some(old) = self.primary_parent(child) {
            self.unlink(old, child);
        }
        self.link(new_parent, child);
    }

    /// Prerequisite-only edge (convergence); does not touch `children`.
    pub fn add_prerequisite(&mut self, node: Index, prereq: Index) {
        if node == prereq {
            return;
        }
        let n = self.node_mut(node);
        if !n.prerequisites.contains(&prereq) {
            n.prerequisites.push(prereq);
        }
    }

    /// Remove every incoming edge of `node`.
    pub fn detach(&mut self, node: Index) {
        let prereqs = std::mem::take(&mut self.node_mut(node).prerequisites);
        for parent in prereqs {
            self.node_mut(parent).children.retain(|&c| c != node);
        }
    }

    /// The prerequisite that lists `idx` among its children.
    pub fn primary_parent(&self, idx: Index) -> Option<Index> {
        let node = self.node(idx);
        node.prerequisites
            .iter()
            .copied()
            .find(|&p| self.node(p).children.contains(&idx))
    }

    /// True when `node` is reachable from `ancestor` through children.
    #[instrument(level = "trace", skip(self))]
    pub fn is_descendant(&self, ancestor: Index, node: Index) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([ancestor]);
        while let Some(cur) = queue.pop_front() {
            if cur == node {
                return true;
            }
            if !visited.insert(cur) {
                continue;
            }
            queue.extend(self.node(cur).children.iter().copied());
        }
        false
    }

    /// True when unlocking `node` transitively requires `target`.
    pub fn requires(&self, node: Index, target: Index) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![node];
        while let Some(cur) = stack.pop() {
            if cur == target {
                return true;
            }
            if !visited.insert(cur) {
                continue;
            }
            stack.extend(self.node(cur).prerequisites.iter().copied());
        }
        false
    }

    /// Nodes reachable from the root through children.
    pub fn reachable_from_root(&self) -> HashSet<Index> {
        self.iter().map(|(idx, _)| idx).collect()
    }

    pub fn max_depth(&self) -> usize {
        self.nodes().map(|(_, n)| n.depth).max().unwrap_or(0)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn leaf_nodes(&self) -> Vec<Index> {
        self.iter()
            .filter(|(_, node)| node.children.is_empty())
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self)
    }
}

/// Pre-order walk over children starting at the root; each node once.
pub struct TreeIterator<'a> {
    arena: &'a TreeArena,
    stack: Vec<Index>,
    visited: HashSet<Index>,
}

impl<'a> TreeIterator<'a> {
    fn new(arena: &'a TreeArena) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = arena.root() {
            stack.push(root);
        }
        Self {
            arena,
            stack,
            visited: HashSet::new(),
        }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if !self.visited.insert(current_idx) {
                continue;
            }
            if let Some(node) = self.arena.get_node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Tier;

    fn arena_of(n: usize) -> (TreeArena, Vec<Index>) {
        let items: Vec<Item> = (0..n)
            .map(|i| Item::new(&format!("{:08X}", i + 1), &format!("Item {i}"), Tier::Novice, "Alteration"))
            .collect();
        let (tree, _) = TreeArena::from_items(&items);
        let idx = tree.indices().collect();
        (tree, idx)
    }

    #[test]
    fn given_duplicate_ids_when_building_then_first_wins_and_rest_reported() {
        let items = vec![
            Item::new("01", "A", Tier::Novice, "X"),
            Item::new("01", "B", Tier::Novice, "X"),
            Item::new("", "C", Tier::Novice, "X"),
        ];
        let (tree, skipped) = TreeArena::from_items(&items);
        assert_eq!(tree.len(), 1);
        assert_eq!(skipped, vec!["01".to_string(), String::new()]);
        let idx = tree.index_of("01").expect("first kept");
        assert_eq!(tree.node(idx).name, "A");
    }

    #[test]
    fn given_linked_nodes_when_reparenting_then_old_edge_removed() {
        let (mut tree, idx) = arena_of(3);
        tree.set_root(idx[0]);
        tree.link(idx[0], idx[1]);
        tree.link(idx[0], idx[2]);

        tree.reparent(idx[2], idx[1]);

        assert_eq!(tree.node(idx[0]).children, vec![idx[1]]);
        assert_eq!(tree.node(idx[1]).children, vec![idx[2]]);
        assert_eq!(tree.node(idx[2]).prerequisites, vec![idx[1]]);
        assert_eq!(tree.node(idx[2]).depth, 2);
        assert!(tree.is_descendant(idx[0], idx[2]));
        assert!(!tree.is_descendant(idx[2], idx[0]));
    }

    #[test]
    fn given_convergence_link_when_asking_primary_parent_then_ignores_it() {
        let (mut tree, idx) = arena_of(3);
        tree.set_root(idx[0]);
        tree.link(idx[0], idx[1]);
        tree.link(idx[1], idx[2]);
        tree.add_prerequisite(idx[2], idx[0]);

        assert_eq!(tree.primary_parent(idx[2]), Some(idx[1]));
        assert!(tree.requires(idx[2], idx[0]));
        assert_eq!(tree.node(idx[2]).prerequisites.len(), 2);
    }

    #[test]
    fn given_tree_when_iterating_then_visits_reachable_nodes_once() {
        let (mut tree, idx) = arena_of(4);
        tree.set_root(idx[0]);
        tree.link(idx[0], idx[1]);
        tree.link(idx[1], idx[2]);

        let visited: Vec<Index> = tree.iter().map(|(i, _)| i).collect();

        assert_eq!(visited, vec![idx[0], idx[1], idx[2]]);
        assert_eq!(tree.leaf_nodes(), vec![idx[2]]);
        assert!(!tree.reachable_from_root().contains(&idx[3]));
    }
}
