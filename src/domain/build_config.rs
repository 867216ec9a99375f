//! Build configuration: immutable knobs for one build.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::similarity::SimilarityThresholds;

pub const MAX_CHILDREN_LIMIT: usize = 8;

/// Growth strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    TierGreedy,
    Arborescence,
    Thematic,
    Chain,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::TierGreedy,
        StrategyKind::Arborescence,
        StrategyKind::Thematic,
        StrategyKind::Chain,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::TierGreedy => "tier_greedy",
            StrategyKind::Arborescence => "arborescence",
            StrategyKind::Thematic => "thematic",
            StrategyKind::Chain => "chain",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown strategy '{s}' (expected one of: {})",
                    Self::ALL.map(|k| k.as_str()).join(", ")
                )
            })
    }
}

/// How a cluster's items hang off their attachment point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BranchStyle {
    /// Balanced: parents are consumed from a FIFO queue.
    #[default]
    Bfs,
    /// Each item hangs off the previous one.
    Chain,
}

impl FromStr for BranchStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bfs" => Ok(BranchStyle::Bfs),
            "chain" => Ok(BranchStyle::Chain),
            other => Err(format!("unknown branch style '{other}' (expected bfs or chain)")),
        }
    }
}

/// How the chain strategy wires a long chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChainStyle {
    /// One item after another.
    #[default]
    Linear,
    /// First half in sequence, then two sub-branches from its last item.
    Branching,
}

impl FromStr for ChainStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(ChainStyle::Linear),
            "branching" => Ok(ChainStyle::Branching),
            other => Err(format!("unknown chain style '{other}' (expected linear or branching)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Drives every random draw; `None` derives one at build start.
    pub seed: Option<u64>,
    pub max_children: usize,
    pub strategy: StrategyKind,
    /// Blend between metadata and content similarity, 0..=1.
    pub chaos: f64,
    /// Edge-cost jitter scale for the arborescence strategy, 0..=1.
    pub force_balance: f64,
    pub auto_fix: bool,
    pub prefer_vanilla_roots: bool,
    /// School name → root item identity.
    pub selected_roots: BTreeMap<String, String>,
    pub similarity_threshold: f32,
    pub label_threshold: f32,
    pub candidate_k: usize,
    pub top_themes_per_school: usize,
    pub branch_style: BranchStyle,
    pub chain_style: ChainStyle,
    pub convergence: bool,
    pub section_root_pct: f64,
    pub section_trunk_pct: f64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            seed: None,
            max_children: 3,
            strategy: StrategyKind::TierGreedy,
            chaos: 0.0,
            force_balance: 0.5,
            auto_fix: true,
            prefer_vanilla_roots: true,
            selected_roots: BTreeMap::new(),
            similarity_threshold: 0.05,
            label_threshold: 0.3,
            candidate_k: 20,
            top_themes_per_school: 8,
            branch_style: BranchStyle::Bfs,
            chain_style: ChainStyle::Linear,
            convergence: false,
            section_root_pct: 0.2,
            section_trunk_pct: 0.5,
        }
    }
}

impl BuildConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_children(mut self, max_children: usize) -> Self {
        self.max_children = max_children;
        self
    }

    pub fn with_chaos(mut self, chaos: f64) -> Self {
        self.chaos = chaos;
        self
    }

    /// Clamp every knob into its legal range.
    pub fn normalized(&self) -> Self {
        let unit = |v: f64, fallback: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { fallback };
        let defaults = Self::default();
        Self {
            max_children: self.max_children.clamp(1, MAX_CHILDREN_LIMIT),
            chaos: unit(self.chaos, defaults.chaos),
            force_balance: unit(self.force_balance, defaults.force_balance),
            similarity_threshold: self.similarity_threshold.clamp(0.0, 1.0),
            label_threshold: self.label_threshold.clamp(0.0, 1.0),
            candidate_k: self.candidate_k.max(1),
            section_root_pct: unit(self.section_root_pct, defaults.section_root_pct),
            section_trunk_pct: unit(self.section_trunk_pct, defaults.section_trunk_pct),
            ..self.clone()
        }
    }

    pub fn thresholds(&self) -> SimilarityThresholds {
        SimilarityThresholds {
            text: self.similarity_threshold,
            label: self.label_threshold,
        }
    }
}
