//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

use crate::domain::build_config::StrategyKind;

/// Deterministic, tier-respecting prerequisite trees for tiered item catalogs
#[derive(Parser, Debug)]
#[command(name = "spelltree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity: -d info, -dd debug, -ddd trace (logs go to stderr)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub debug: u8,

    /// Config file (default: ./spelltree.toml when present)
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a tree document from an item catalog
    Build(BuildArgs),

    /// Re-validate a written tree document
    Validate {
        /// Tree document (JSON)
        #[arg(value_hint = ValueHint::FilePath)]
        tree: PathBuf,
        /// Children per node (default: from config)
        #[arg(long)]
        max_children: Option<usize>,
        /// Print per-school reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the keyword list each school would be built with
    Themes {
        /// Item catalog (JSON)
        #[arg(value_hint = ValueHint::FilePath)]
        items: PathBuf,
        /// Per-school keyword lists (JSON map)
        #[arg(long, value_hint = ValueHint::FilePath)]
        themes: Option<PathBuf>,
        /// Keywords per school when discovering
        #[arg(long)]
        top: Option<usize>,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct BuildArgs {
    /// Item catalog (JSON)
    #[arg(value_hint = ValueHint::FilePath)]
    pub items: PathBuf,

    /// tier_greedy | arborescence | thematic | chain
    #[arg(short, long)]
    pub strategy: Option<StrategyKind>,

    /// Seed for the shared generator
    #[arg(long)]
    pub seed: Option<u64>,

    /// Children per node (1..=8)
    #[arg(short, long)]
    pub max_children: Option<usize>,

    /// 0.0 = metadata-driven, 1.0 = text-driven
    #[arg(long)]
    pub chaos: Option<f64>,

    /// Per-school keyword lists (JSON map)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub themes: Option<PathBuf>,

    /// Per-school chain assignments (JSON map)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub chains: Option<PathBuf>,

    /// Add extra prerequisites to Expert and Master items
    #[arg(long)]
    pub convergence: bool,

    /// Skip the auto-fix pass
    #[arg(long)]
    pub no_auto_fix: bool,

    /// Write the document here instead of stdout
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Single-line JSON
    #[arg(long)]
    pub compact: bool,

    /// Print each school as a tree to stderr
    #[arg(long)]
    pub show: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Print a commented config template
    Template,
    /// Show global config path
    Path,
}
