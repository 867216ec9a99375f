//! Domain entities: item records, tiers and externally supplied hints

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// School name used when an item carries none.
pub const UNKNOWN_SCHOOL: &str = "Unknown";

/// Ordered progression level of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Novice,
    Apprentice,
    Adept,
    Expert,
    Master,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Novice,
        Tier::Apprentice,
        Tier::Adept,
        Tier::Expert,
        Tier::Master,
    ];

    /// Parse a tier label. Unknown or missing labels map to `Novice`.
    pub fn from_label(label: &str) -> Tier {
        Self::parse(label).unwrap_or(Tier::Novice)
    }

    /// Strict parse, `None` for anything outside the five known labels.
    pub fn parse(label: &str) -> Option<Tier> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.label().eq_ignore_ascii_case(label.trim()))
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: usize) -> Option<Tier> {
        Self::ALL.get(idx).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Novice => "Novice",
            Tier::Apprentice => "Apprentice",
            Tier::Adept => "Adept",
            Tier::Expert => "Expert",
            Tier::Master => "Master",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One learnable unit as delivered by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Item {
    pub form_id: String,
    pub name: String,
    /// Raw tier label; see [`Item::tier`].
    pub skill_level: String,
    pub school: String,
    #[serde(alias = "desc")]
    pub description: String,
    /// Short labels, e.g. effect names. Primary grouping signal.
    pub effect_names: Vec<String>,
    pub keywords: Vec<String>,
    pub magicka_cost: f64,
}

impl Item {
    pub fn new(form_id: &str, name: &str, tier: Tier, school: &str) -> Self {
        Self {
            form_id: form_id.to_string(),
            name: name.to_string(),
            skill_level: tier.label().to_string(),
            school: school.to_string(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.effect_names = labels.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.magicka_cost = cost;
        self
    }

    pub fn tier(&self) -> Tier {
        Tier::from_label(&self.skill_level)
    }

    /// School name with the blank case folded into [`UNKNOWN_SCHOOL`].
    pub fn school_name(&self) -> &str {
        let trimmed = self.school.trim();
        if trimmed.is_empty() {
            UNKNOWN_SCHOOL
        } else {
            trimmed
        }
    }

    /// Base-game records live in the first five load-order slots.
    pub fn is_vanilla(&self) -> bool {
        is_vanilla_form_id(&self.form_id)
    }
}

pub fn is_vanilla_form_id(form_id: &str) -> bool {
    let hex = form_id
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    match u64::from_str_radix(hex, 16) {
        Ok(value) => (value >> 24) < 0x05,
        Err(_) => false,
    }
}

/// Externally supplied ordered chain of item ids for one school.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Chain {
    pub name: String,
    pub narrative: String,
    pub spell_ids: Vec<String>,
}

impl Chain {
    pub fn new(name: &str, ids: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            narrative: String::new(),
            spell_ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Resolved outputs of external collaborators (keyword discovery, semantic
/// grouping), keyed by school name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildHints {
    pub themes: BTreeMap<String, Vec<String>>,
    pub chains: BTreeMap<String, Vec<Chain>>,
}
