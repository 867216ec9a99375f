//! Tree build service
//!
//! Loads item and hint files, runs the builder on one seeded generator and
//! renders the resulting document.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::application::document::TreeDocument;
use crate::application::{ApplicationResult, IoResultExt};
use crate::domain::build_config::{BuildConfig, StrategyKind};
use crate::domain::builder::{SchoolTree, TreeBuilder};
use crate::domain::cross_school::{add_cross_school_links, CrossLink};
use crate::domain::entities::{BuildHints, Chain, Item};
use crate::domain::strategy::{strategy_for, GrowthStrategy};
use crate::domain::themes::resolve_themes;
use crate::infrastructure::traits::FileSystem;

/// Accepted item file layouts.
#[derive(Deserialize)]
#[serde(untagged)]
enum ItemFile {
    Wrapped { spells: Vec<Item> },
    List(Vec<Item>),
    BySchool(BTreeMap<String, Vec<Item>>),
}

impl ItemFile {
    fn into_items(self) -> Vec<Item> {
        match self {
            Self::Wrapped { spells } => spells,
            Self::List(items) => items,
            Self::BySchool(schools) => schools
                .into_iter()
                .flat_map(|(school, items)| {
                    items.into_iter().map(move |mut item| {
                        item.school = school.clone();
                        item
                    })
                })
                .collect(),
        }
    }
}

/// Result of one build.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub document: TreeDocument,
    pub schools: Vec<SchoolTree>,
    pub cross_links: Vec<CrossLink>,
}

/// Service for building tree documents.
pub struct TreeBuildService {
    fs: Arc<dyn FileSystem>,
}

impl TreeBuildService {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Read items from a JSON list, a `{"spells": [...]}` object or a map
    /// of school name to items.
    #[instrument(level = "debug", skip(self))]
    pub fn load_items(&self, path: &Path) -> ApplicationResult<Vec<Item>> {
        let content = self.fs.read_to_string(path).with_path_context("read items", path)?;
        let file: ItemFile = serde_json::from_str(&content).with_path_context("parse items", path)?;
        let items = file.into_items();
        debug!(items = items.len(), "items loaded");
        Ok(items)
    }

    /// Per-school keyword lists and chain assignments, both optional.
    pub fn load_hints(&self, themes: Option<&Path>, chains: Option<&Path>) -> ApplicationResult<BuildHints> {
        let mut hints = BuildHints::default();
        if let Some(path) = themes {
            let content = self.fs.read_to_string(path).with_path_context("read themes", path)?;
            hints.themes = serde_json::from_str::<BTreeMap<String, Vec<String>>>(&content)
                .with_path_context("parse themes", path)?;
        }
        if let Some(path) = chains {
            let content = self.fs.read_to_string(path).with_path_context("read chains", path)?;
            hints.chains = serde_json::from_str::<BTreeMap<String, Vec<Chain>>>(&content)
                .with_path_context("parse chains", path)?;
        }
        Ok(hints)
    }

    pub fn build(&self, items: &[Item], hints: &BuildHints, config: &BuildConfig) -> ApplicationResult<BuildOutput> {
        self.build_with(items, hints, config, strategy_for(config.strategy))
    }

    /// Build with an explicit strategy instance.
    #[instrument(level = "debug", skip_all, fields(items = items.len()))]
    pub fn build_with(
        &self,
        items: &[Item],
        hints: &BuildHints,
        config: &BuildConfig,
        strategy: Box<dyn GrowthStrategy>,
    ) -> ApplicationResult<BuildOutput> {
        let config = config.normalized();
        let seed = config.seed.unwrap_or_else(clock_seed);
        let mut rng = StdRng::seed_from_u64(seed);

        let builder = TreeBuilder::new(&config, hints).with_strategy(strategy);
        let kind = builder.strategy();
        let mut schools = builder.build_forest(items, &mut rng)?;
        let cross_links = if kind == StrategyKind::Arborescence {
            add_cross_school_links(&mut schools, &config)
        } else {
            Vec::new()
        };

        let document = TreeDocument::from_forest(seed, kind, &schools);
        info!(
            seed,
            strategy = %kind,
            schools = schools.len(),
            nodes = document.validation.total_nodes,
            valid = document.validation.all_valid,
            "build complete"
        );
        Ok(BuildOutput {
            document,
            schools,
            cross_links,
        })
    }

    /// Keyword list each school would be built with.
    pub fn themes(&self, items: &[Item], hints: &BuildHints, config: &BuildConfig) -> BTreeMap<String, Vec<String>> {
        let config = config.normalized();
        TreeBuilder::group_by_school(items)
            .into_iter()
            .map(|(school, members)| {
                let refs: Vec<&Item> = members.iter().collect();
                let themes = resolve_themes(&school, &refs, hints.themes.get(&school), config.top_themes_per_school);
                (school, themes)
            })
            .collect()
    }

    pub fn render(document: &TreeDocument, pretty: bool) -> ApplicationResult<String> {
        let rendered = if pretty {
            serde_json::to_string_pretty(document)
        } else {
            serde_json::to_string(document)
        };
        rendered.with_path_context("render document", Path::new("-"))
    }

    pub fn write_document(&self, document: &TreeDocument, path: &Path, pretty: bool) -> ApplicationResult<()> {
        let content = Self::render(document, pretty)?;
        self.fs.ensure_parent(path).with_path_context("create output dir", path)?;
        self.fs.write(path, &content).with_path_context("write document", path)?;
        info!(path = %path.display(), "document written");
        Ok(())
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
