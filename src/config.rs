//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/spelltree/spelltree.toml`
//! 3. Local config: `--config <path>` or `./spelltree.toml`
//! 4. Environment variables: `SPELLTREE_*` prefix

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::ApplicationError;
use crate::domain::build_config::{BranchStyle, BuildConfig, ChainStyle, StrategyKind};

pub const LOCAL_CONFIG_FILE: &str = "spelltree.toml";
pub const ENV_PREFIX: &str = "SPELLTREE";

/// Output formatting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    /// Pretty-print the JSON document
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { pretty: true }
    }
}

/// Raw build config for intermediate parsing (every field is Option to detect "not specified").
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawBuildConfig {
    pub seed: Option<u64>,
    pub max_children: Option<usize>,
    pub strategy: Option<StrategyKind>,
    pub chaos: Option<f64>,
    pub force_balance: Option<f64>,
    pub auto_fix: Option<bool>,
    pub prefer_vanilla_roots: Option<bool>,
    pub selected_roots: Option<BTreeMap<String, String>>,
    pub similarity_threshold: Option<f32>,
    pub label_threshold: Option<f32>,
    pub candidate_k: Option<usize>,
    pub top_themes_per_school: Option<usize>,
    pub branch_style: Option<BranchStyle>,
    pub chain_style: Option<ChainStyle>,
    pub convergence: Option<bool>,
    pub section_root_pct: Option<f64>,
    pub section_trunk_pct: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawOutputConfig {
    pub pretty: Option<bool>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub build: RawBuildConfig,
    pub output: RawOutputConfig,
}

/// How `selected_roots` from an overlay combine with the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootsMerge {
    Replace,
    Union,
}

fn overlay_build(base: &BuildConfig, raw: &RawBuildConfig, roots: RootsMerge) -> BuildConfig {
    let selected_roots = match (&raw.selected_roots, roots) {
        (None, _) => base.selected_roots.clone(),
        (Some(overlay), RootsMerge::Replace) => overlay.clone(),
        (Some(overlay), RootsMerge::Union) => {
            let mut merged = base.selected_roots.clone();
            merged.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
            merged
        }
    };
    BuildConfig {
        seed: raw.seed.or(base.seed),
        max_children: raw.max_children.unwrap_or(base.max_children),
        strategy: raw.strategy.unwrap_or(base.strategy),
        chaos: raw.chaos.unwrap_or(base.chaos),
        force_balance: raw.force_balance.unwrap_or(base.force_balance),
        auto_fix: raw.auto_fix.unwrap_or(base.auto_fix),
        prefer_vanilla_roots: raw.prefer_vanilla_roots.unwrap_or(base.prefer_vanilla_roots),
        selected_roots,
        similarity_threshold: raw.similarity_threshold.unwrap_or(base.similarity_threshold),
        label_threshold: raw.label_threshold.unwrap_or(base.label_threshold),
        candidate_k: raw.candidate_k.unwrap_or(base.candidate_k),
        top_themes_per_school: raw.top_themes_per_school.unwrap_or(base.top_themes_per_school),
        branch_style: raw.branch_style.unwrap_or(base.branch_style),
        chain_style: raw.chain_style.unwrap_or(base.chain_style),
        convergence: raw.convergence.unwrap_or(base.convergence),
        section_root_pct: raw.section_root_pct.unwrap_or(base.section_root_pct),
        section_trunk_pct: raw.section_trunk_pct.unwrap_or(base.section_trunk_pct),
    }
}

/// Unified configuration for spelltree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Settings {
    /// Tree construction knobs
    pub build: BuildConfig,
    /// Document output
    pub output: OutputConfig,
}

/// Get the XDG config directory for spelltree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "spelltree").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join(LOCAL_CONFIG_FILE))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Merge a local overlay: scalars win when set, root overrides union per school.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            build: overlay_build(&self.build, &overlay.build, RootsMerge::Union),
            output: OutputConfig {
                pretty: overlay.output.pretty.unwrap_or(self.output.pretty),
            },
        }
    }

    /// Apply global config onto defaults; root overrides REPLACE.
    fn apply_global(&self, global: &RawSettings) -> Self {
        Self {
            build: overlay_build(&self.build, &global.build, RootsMerge::Replace),
            output: OutputConfig {
                pretty: global.output.pretty.unwrap_or(self.output.pretty),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// `local` is an explicit config path (must exist); without it
    /// `./spelltree.toml` is used when present.
    pub fn load(local: Option<&Path>) -> Result<Self, ApplicationError> {
        let global = global_config_path();
        Self::load_from(global.as_deref(), local)
    }

    /// Layered load with an explicit global path, used by `load` and tests.
    pub fn load_from(global: Option<&Path>, local: Option<&Path>) -> Result<Self, ApplicationError> {
        // 1. Start with defaults
        let mut current = Self::default();

        // 2. Global config (REPLACES defaults)
        if let Some(global_path) = global {
            if global_path.exists() {
                debug!(path = %global_path.display(), "global config");
                let raw = load_raw_settings(global_path)?;
                current = current.apply_global(&raw);
            }
        }

        // 3. Local config (merges onto global)
        match local {
            Some(path) if !path.exists() => {
                return Err(ApplicationError::Config {
                    message: format!("config file not found: {}", path.display()),
                });
            }
            Some(path) => {
                debug!(path = %path.display(), "local config");
                current = current.merge_with(&load_raw_settings(path)?);
            }
            None => {
                let path = Path::new(LOCAL_CONFIG_FILE);
                if path.exists() {
                    debug!(path = %path.display(), "local config");
                    current = current.merge_with(&load_raw_settings(path)?);
                }
            }
        }

        // 4. Environment variables (explicit override)
        current = Self::apply_env_overrides(current)?;
        Ok(current)
    }

    /// Apply SPELLTREE_* environment variables as explicit overrides.
    fn apply_env_overrides(settings: Self) -> Result<Self, ApplicationError> {
        Self::apply_environment(settings, env_source())
    }

    /// Apply one environment source; split out so tests can inject a map.
    pub fn apply_environment(mut settings: Self, env: Environment) -> Result<Self, ApplicationError> {
        let config = Config::builder().add_source(env).build().map_err(config_err)?;
        let build = &mut settings.build;

        if let Ok(val) = config.get::<u64>("build.seed") {
            build.seed = Some(val);
        }
        if let Ok(val) = config.get::<usize>("build.max_children") {
            build.max_children = val;
        }
        if let Ok(val) = config.get_string("build.strategy") {
            build.strategy = val.parse().map_err(|message| ApplicationError::Config { message })?;
        }
        if let Ok(val) = config.get::<f64>("build.chaos") {
            build.chaos = val;
        }
        if let Ok(val) = config.get::<f64>("build.force_balance") {
            build.force_balance = val;
        }
        if let Ok(val) = config.get_bool("build.auto_fix") {
            build.auto_fix = val;
        }
        if let Ok(val) = config.get_bool("build.prefer_vanilla_roots") {
            build.prefer_vanilla_roots = val;
        }
        if let Ok(val) = config.get::<usize>("build.candidate_k") {
            build.candidate_k = val;
        }
        if let Ok(val) = config.get::<usize>("build.top_themes_per_school") {
            build.top_themes_per_school = val;
        }
        if let Ok(val) = config.get_string("build.branch_style") {
            build.branch_style = val.parse().map_err(|message| ApplicationError::Config { message })?;
        }
        if let Ok(val) = config.get_string("build.chain_style") {
            build.chain_style = val.parse().map_err(|message| ApplicationError::Config { message })?;
        }
        if let Ok(val) = config.get_bool("build.convergence") {
            build.convergence = val;
        }
        if let Ok(val) = config.get_bool("output.pretty") {
            settings.output.pretty = val;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# spelltree configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/spelltree/spelltree.toml
#   Local:  ./spelltree.toml or --config <path>
#   Env:    SPELLTREE_* environment variables, e.g. SPELLTREE_BUILD__MAX_CHILDREN=4
#
# selected_roots: the global table replaces the default, a local table is
# merged into it per school.

[build]
# Seed for the shared generator; omit for a clock-derived seed
# seed = 42

# Children per node, clamped to 1..=8
# max_children = 3

# tier_greedy | arborescence | thematic | chain
# strategy = "tier_greedy"

# 0.0 = metadata-driven, 1.0 = text-similarity-driven; > 0.3 enables
# cross-school links for the arborescence strategy
# chaos = 0.0

# Edge-cost jitter scale for the arborescence strategy
# force_balance = 0.5

# auto_fix = true
# prefer_vanilla_roots = true
# similarity_threshold = 0.05
# label_threshold = 0.3
# candidate_k = 20
# top_themes_per_school = 8

# bfs | chain
# branch_style = "bfs"

# Chain strategy: linear | branching (chains of 5+ items fork in two)
# chain_style = "linear"

# Extra prerequisites for Expert (2) and Master (3) items
# convergence = false

# section_root_pct = 0.2
# section_trunk_pct = 0.5

# [build.selected_roots]
# Destruction = "00012FCD"

[output]
# pretty = true
"#
        .to_string()
    }
}

/// `SPELLTREE_BUILD__MAX_CHILDREN=4` → `build.max_children`.
fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
