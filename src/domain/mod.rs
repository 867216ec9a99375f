//! Domain layer: entities and tree-building logic
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod build_config;
pub mod builder;
pub mod convergence;
pub mod cross_school;
pub mod entities;
pub mod error;
pub mod fuzzy;
pub mod nlp;
pub mod repair;
pub mod similarity;
pub mod strategy;
pub mod themes;
pub mod validator;

pub use arena::{Section, TreeArena, TreeNode};
pub use build_config::{BranchStyle, BuildConfig, ChainStyle, StrategyKind};
pub use builder::{SchoolTree, TreeBuilder};
pub use cross_school::{add_cross_school_links, CrossLink};
pub use entities::*;
pub use error::{DomainError, DomainResult};
pub use validator::{IntakeIssues, ValidationReport, ValidationSummary};
