//! Text helpers shared by the similarity index and the theme engine.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::domain::entities::Item;

const STOP_WORDS: &[&str] = &[
    // generic spell vocabulary
    "spell", "magic", "magical", "target", "targets", "effect", "effects", "damage", "point",
    "points", "second", "seconds", "per", "for", "does", "causes", "cast", "caster", "casting",
    "level", "levels", "health", "magicka", "stamina", "drain", "drains",
    // description fragments
    "deals", "deal", "dur", "duration", "mag", "magnitude", "nearby", "enemies", "enemy",
    "increased", "increases", "increase", "decreased", "decreases", "decrease", "reduces",
    "reduced", "reduce", "restores", "restore", "restored", "absorb", "absorbs", "absorbed",
    "extra", "takes", "take", "time", "over", "while", "also", "resistance", "chance", "once",
    "each", "within", "range", "stronger", "powerful", "greater", "lesser", "more", "less",
    // tier labels
    "novice", "apprentice", "adept", "expert", "master",
    // function words
    "to", "a", "an", "of", "in", "on", "at", "is", "are", "be", "with", "that", "this", "their",
    "your", "and", "or", "but", "not", "all", "the", "was", "were", "been", "being", "have",
    "has", "had", "do", "did", "will", "would", "could", "should", "may", "might", "can",
    "shall", "from", "by", "as", "if", "its", "it", "they", "them", "he", "she", "his", "her",
    "we", "you", "who", "which", "when", "where", "how", "what", "than", "then", "into",
    "about", "up", "out", "no", "so", "just", "very", "too", "any", "some", "such",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Lowercase, split on anything not alphanumeric, keep tokens longer than 2 chars.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// Document used for pairwise text similarity: name twice, description, labels.
pub fn similarity_text(item: &Item) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if !item.name.is_empty() {
        parts.push(&item.name);
        parts.push(&item.name);
    }
    if !item.description.is_empty() {
        parts.push(&item.description);
    }
    parts.extend(item.effect_names.iter().filter(|s| !s.is_empty()).map(String::as_str));
    parts.join(" ")
}

/// Document used for theme scoring: name and labels weighted 3x, then the
/// description and split keywords.
pub fn theme_text(item: &Item) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !item.name.is_empty() {
        parts.extend(std::iter::repeat(item.name.clone()).take(3));
    }
    for label in item.effect_names.iter().filter(|s| !s.is_empty()) {
        parts.extend(std::iter::repeat(label.clone()).take(3));
    }
    if !item.description.is_empty() {
        parts.push(item.description.clone());
    }
    parts.extend(item.keywords.iter().map(|k| split_keyword(k)));
    parts.join(" ")
}

/// `MagicDamageFire` → `Damage Fire`.
pub fn split_keyword(keyword: &str) -> String {
    let stripped = match keyword.strip_prefix("Magic") {
        Some(rest) if !rest.is_empty() => rest,
        _ => keyword,
    };
    let mut out = String::with_capacity(stripped.len() + 4);
    for (i, c) in stripped.chars().enumerate() {
        if i > 0 && c.is_uppercase() {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

/// Character trigrams of the lowercased string with whitespace removed.
pub fn trigrams(text: &str) -> BTreeSet<[char; 3]> {
    let chars: Vec<char> = text
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    chars.windows(3).map(|w| [w[0], w[1], w[2]]).collect()
}

pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Distinct tokens in first-seen order; position is the term id used by
/// [`tfidf_vectors`].
pub fn vocabulary(documents: &[Vec<String>]) -> Vec<String> {
    let mut seen = HashSet::new();
    documents
        .iter()
        .flatten()
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}

/// Sparse L2-normalized TF-IDF vectors with smoothed IDF.
///
/// Term ids are assigned in first-seen order so the output does not depend
/// on hash iteration order.
pub fn tfidf_vectors(documents: &[Vec<String>]) -> Vec<Vec<(usize, f32)>> {
    let n = documents.len() as f32;
    let mut vocab: HashMap<&str, usize> = HashMap::new();
    let mut df: Vec<usize> = Vec::new();
    for doc in documents {
        let mut seen = HashSet::new();
        for token in doc {
            let next = vocab.len();
            let id = *vocab.entry(token.as_str()).or_insert(next);
            if id == df.len() {
                df.push(0);
            }
            if seen.insert(id) {
                df[id] += 1;
            }
        }
    }
    let idf: Vec<f32> = df
        .iter()
        .map(|&d| ((n + 1.0) / (d as f32 + 1.0)).ln() + 1.0)
        .collect();

    documents
        .iter()
        .map(|doc| {
            if doc.is_empty() {
                return Vec::new();
            }
            let total = doc.len() as f32;
            let mut counts: Vec<(usize, usize)> = Vec::new();
            let mut slot: HashMap<usize, usize> = HashMap::new();
            for token in doc {
                let id = vocab[token.as_str()];
                match slot.get(&id) {
                    Some(&pos) => counts[pos].1 += 1,
                    None => {
                        slot.insert(id, counts.len());
                        counts.push((id, 1));
                    }
                }
            }
            let mut vector: Vec<(usize, f32)> = counts
                .into_iter()
                .map(|(id, count)| (id, count as f32 / total * idf[id]))
                .collect();
            let norm = vector.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
            if norm > 0.0 {
                for (_, w) in vector.iter_mut() {
                    *w /= norm;
                }
            }
            vector.sort_by_key(|(id, _)| *id);
            vector
        })
        .collect()
}

/// Dot product of two id-sorted sparse vectors.
pub fn cosine(a: &[(usize, f32)], b: &[(usize, f32)]) -> f32 {
    let (mut i, mut j, mut sum) = (0, 0, 0.0f32);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Tier;
    use rstest::rstest;

    #[rstest]
    #[case("Fire-Bolt of DOOM!", vec!["fire", "bolt", "doom"])]
    #[case("an ox at it", vec![])]
    #[case("Ice_Spike 2x", vec!["ice", "spike"])]
    fn given_text_when_tokenizing_then_drops_short_tokens(#[case] text: &str, #[case] expected: Vec<&str>) {
        assert_eq!(tokenize(text), expected);
    }

    #[test]
    fn given_keyword_when_splitting_then_strips_magic_prefix() {
        assert_eq!(split_keyword("MagicDamageFire"), "Damage Fire");
        assert_eq!(split_keyword("Magic"), "Magic");
        assert_eq!(split_keyword("ArmorSpell"), "Armor Spell");
    }

    #[test]
    fn given_identical_names_when_computing_trigram_jaccard_then_one() {
        let a = trigrams("Fire Bolt");
        let b = trigrams("firebolt");
        assert_eq!(jaccard(&a, &b), 1.0);
        assert_eq!(jaccard(&trigrams("ab"), &b), 0.0);
    }

    #[test]
    fn given_item_when_building_similarity_text_then_name_is_doubled() {
        let item = Item::new("01", "Flames", Tier::Novice, "Destruction")
            .with_description("A gout of fire")
            .with_labels(&["Fire Damage"]);
        assert_eq!(similarity_text(&item), "Flames Flames A gout of fire Fire Damage");
    }

    #[test]
    fn given_documents_when_vectorizing_then_rows_are_unit_length() {
        let docs = vec![
            tokenize("fire bolt fire"),
            tokenize("frost bolt"),
            Vec::new(),
        ];
        let vectors = tfidf_vectors(&docs);
        let norm: f32 = vectors[0].iter().map(|(_, w)| w * w).sum();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(vectors[2].is_empty());
        let sim = cosine(&vectors[0], &vectors[1]);
        assert!(sim > 0.0 && sim < 1.0);
        assert_eq!(cosine(&vectors[0], &vectors[2]), 0.0);
    }
}
