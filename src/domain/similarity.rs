//! Per-school pairwise affinity index.
//!
//! Three channels are kept, each sparse and symmetric:
//! - `text`: TF-IDF cosine over name/description/labels
//! - `name`: character-trigram Jaccard on names
//! - `label`: best trigram Jaccard across label pairs
//!
//! Pairs are keyed by item ordinal (position within the school list).

use std::collections::{BTreeSet, HashMap};

use generational_arena::Index;
use tracing::{debug, instrument};

use crate::domain::arena::TreeArena;
use crate::domain::entities::Item;
use crate::domain::nlp::{cosine, jaccard, similarity_text, tfidf_vectors, tokenize, trigrams};

/// Retention thresholds for the sparse channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityThresholds {
    pub text: f32,
    pub label: f32,
}

impl Default for SimilarityThresholds {
    fn default() -> Self {
        Self {
            text: 0.05,
            label: 0.3,
        }
    }
}

/// All three channels for one pair.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PairScores {
    pub text: f64,
    pub name: f64,
    pub label: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SimilarityIndex {
    size: usize,
    text: HashMap<(usize, usize), f32>,
    name: HashMap<(usize, usize), f32>,
    label: HashMap<(usize, usize), f32>,
}

fn key(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl SimilarityIndex {
    /// Build the index for one school's items (in school order).
    #[instrument(level = "debug", skip(items), fields(items = items.len()))]
    pub fn build(items: &[&Item], thresholds: SimilarityThresholds) -> Self {
        let n = items.len();
        let mut index = Self {
            size: n,
            ..Default::default()
        };

        let docs: Vec<Vec<String>> = items.iter().map(|it| tokenize(&similarity_text(it))).collect();
        let vectors = tfidf_vectors(&docs);
        let name_grams: Vec<BTreeSet<[char; 3]>> = items.iter().map(|it| trigrams(&it.name)).collect();
        let label_grams: Vec<Vec<BTreeSet<[char; 3]>>> = items
            .iter()
            .map(|it| {
                it.effect_names
                    .iter()
                    .map(|l| trigrams(l))
                    .filter(|g| !g.is_empty())
                    .collect()
            })
            .collect();

        for i in 0..n {
            for j in (i + 1)..n {
                let text = cosine(&vectors[i], &vectors[j]);
                if text >= thresholds.text && text > 0.0 {
                    index.text.insert((i, j), text);
                }

                let name = jaccard(&name_grams[i], &name_grams[j]);
                if name > 0.0 {
                    index.name.insert((i, j), name);
                }

                let label = label_grams[i]
                    .iter()
                    .flat_map(|a| label_grams[j].iter().map(move |b| jaccard(a, b)))
                    .fold(0.0f32, f32::max);
                if label >= thresholds.label && label > 0.0 {
                    index.label.insert((i, j), label);
                }
            }
        }

        debug!(
            text_pairs = index.text.len(),
            name_pairs = index.name.len(),
            label_pairs = index.label.len(),
            "similarity index built"
        );
        index
    }

    /// Text-only index; used for lightweight cross-school affinity.
    #[instrument(level = "debug", skip(items), fields(items = items.len()))]
    pub fn build_text_only(items: &[&Item], threshold: f32) -> Self {
        let docs: Vec<Vec<String>> = items.iter().map(|it| tokenize(&similarity_text(it))).collect();
        let vectors = tfidf_vectors(&docs);
        let mut index = Self {
            size: items.len(),
            ..Default::default()
        };
        for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                let text = cosine(&vectors[i], &vectors[j]);
                if text >= threshold && text > 0.0 {
                    index.text.insert((i, j), text);
                }
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn text(&self, a: usize, b: usize) -> f32 {
        self.text.get(&key(a, b)).copied().unwrap_or(0.0)
    }

    pub fn name(&self, a: usize, b: usize) -> f32 {
        self.name.get(&key(a, b)).copied().unwrap_or(0.0)
    }

    pub fn label(&self, a: usize, b: usize) -> f32 {
        self.label.get(&key(a, b)).copied().unwrap_or(0.0)
    }

    pub fn pair(&self, a: usize, b: usize) -> PairScores {
        PairScores {
            text: f64::from(self.text(a, b)),
            name: f64::from(self.name(a, b)),
            label: f64::from(self.label(a, b)),
        }
    }

    /// Scores between two nodes of `tree`, looked up by their ordinals.
    pub fn between(&self, tree: &TreeArena, a: Index, b: Index) -> PairScores {
        self.pair(tree.node(a).ordinal, tree.node(b).ordinal)
    }

    /// Retained text pairs, ordered by ordinal pair.
    pub fn text_pairs(&self) -> Vec<((usize, usize), f32)> {
        let mut pairs: Vec<_> = self.text.iter().map(|(&k, &v)| (k, v)).collect();
        pairs.sort_by_key(|(k, _)| *k);
        pairs
    }
}
