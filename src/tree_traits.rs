//! Terminal rendering of built trees.

use generational_arena::Index;
use termtree::Tree;
use tracing::instrument;

use crate::domain::arena::TreeArena;
use crate::domain::builder::SchoolTree;

pub trait TreeNodeConvert {
    fn to_tree_string(&self) -> Tree<String>;
}

fn label(arena: &TreeArena, idx: Index) -> String {
    let node = arena.node(idx);
    let mut label = format!("{} [{}] {}", node.name, node.form_id, node.tier.label());
    if let Some(theme) = &node.theme {
        label.push_str(&format!(" #{theme}"));
    }
    if node.prerequisites.len() > 1 {
        label.push_str(&format!(" +{}", node.prerequisites.len() - 1));
    }
    if node.overflow {
        label.push_str(" !");
    }
    label
}

// Follows primary edges only; convergence links show as the `+n` suffix.
impl TreeNodeConvert for TreeArena {
    fn to_tree_string(&self) -> Tree<String> {
        fn build_tree(arena: &TreeArena, idx: Index) -> Tree<String> {
            let leaves: Vec<_> = arena.node(idx).children.iter().map(|&c| build_tree(arena, c)).collect();
            Tree::new(label(arena, idx)).with_leaves(leaves)
        }

        match self.root() {
            Some(root) => build_tree(self, root),
            None => Tree::new("Empty tree".to_string()),
        }
    }
}

impl TreeNodeConvert for SchoolTree {
    #[instrument(level = "debug", skip(self), fields(school = %self.school))]
    fn to_tree_string(&self) -> Tree<String> {
        let mut tree = self.tree.to_tree_string();
        tree.root = format!("{} :: {}", self.school, tree.root);
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Item, Tier};

    #[test]
    fn given_small_tree_when_rendering_then_children_indented_under_root() {
        // Arrange
        let items = vec![
            Item::new("01", "Spark", Tier::Novice, "Destruction"),
            Item::new("02", "Bolt", Tier::Apprentice, "Destruction"),
        ];
        let (mut arena, _) = TreeArena::from_items(&items);
        let root = arena.index_of("01").expect("root");
        let bolt = arena.index_of("02").expect("bolt");
        arena.set_root(root);
        arena.link(root, bolt);

        // Act
        let rendered = arena.to_tree_string().to_string();

        // Assert
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "Spark [01] Novice");
        assert!(lines[1].ends_with("Bolt [02] Apprentice"));
    }

    #[test]
    fn given_rootless_arena_when_rendering_then_placeholder() {
        let arena = TreeArena::default();
        assert_eq!(arena.to_tree_string().to_string().trim(), "Empty tree");
    }
}
