//! Theme keywords per school: discovery, built-in hints and best-fit grouping.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use crate::domain::entities::Item;
use crate::domain::fuzzy::theme_score;
use crate::domain::nlp::{is_stop_word, tfidf_vectors, theme_text, tokenize, vocabulary};

/// Group name for items that fit no theme.
pub const UNASSIGNED: &str = "_unassigned";

/// Minimum fuzzy score for best-fit grouping.
pub const MIN_THEME_SCORE: u32 = 30;

/// Extra slots granted on top of `top_themes_per_school` when hints are merged.
pub const HINT_HEADROOM: usize = 4;

/// Schools with fewer items than this get no discovered themes.
pub const MIN_DISCOVERY_ITEMS: usize = 2;

const HINTS: &[(&str, &[&str])] = &[
    ("Alteration", &["flesh", "armor", "paralyze", "detect", "light", "transmute", "waterbreathing", "telekinesis"]),
    ("Conjuration", &["conjure", "summon", "bound", "atronach", "zombie", "raise", "reanimate", "dremora"]),
    ("Destruction", &["fire", "frost", "shock", "cloak", "rune", "wall", "bolt", "storm"]),
    ("Illusion", &["fury", "fear", "calm", "courage", "invisibility", "muffle", "frenzy", "pacify"]),
    ("Restoration", &["heal", "healing", "ward", "turn", "undead", "cure", "bane", "circle"]),
];

/// Built-in keyword hints for the base-game schools.
pub fn school_hints(school: &str) -> Option<&'static [&'static str]> {
    HINTS
        .iter()
        .find(|(name, _)| *name == school)
        .map(|(_, hints)| *hints)
}

/// Top `top_n` terms by summed TF-IDF weight over the items' theme texts.
#[instrument(level = "debug", skip(items), fields(items = items.len()))]
pub fn discover_themes(items: &[&Item], top_n: usize) -> Vec<String> {
    if items.len() < MIN_DISCOVERY_ITEMS {
        return Vec::new();
    }
    let docs: Vec<Vec<String>> = items
        .iter()
        .map(|it| {
            tokenize(&theme_text(it))
                .into_iter()
                .filter(|t| !is_stop_word(t))
                .collect::<Vec<_>>()
        })
        .filter(|doc| !doc.is_empty())
        .collect();
    if docs.is_empty() || top_n == 0 {
        return Vec::new();
    }

    let vocab = vocabulary(&docs);
    let mut totals = vec![0.0f32; vocab.len()];
    for vector in tfidf_vectors(&docs) {
        for (id, weight) in vector {
            totals[id] += weight;
        }
    }

    let mut ranked: Vec<(&String, f32)> = vocab.iter().zip(totals).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let themes: Vec<String> = ranked
        .into_iter()
        .map(|(term, _)| term.clone())
        .take(top_n)
        .collect();
    debug!(?themes, "discovered themes");
    themes
}

/// Hints first, then discovered terms not already present, capped at `max`.
pub fn merge_with_hints(school: &str, discovered: &[String], max: usize) -> Vec<String> {
    let Some(hints) = school_hints(school) else {
        return discovered.iter().take(max).cloned().collect();
    };
    let mut merged: Vec<String> = hints.iter().map(|h| h.to_string()).collect();
    for term in discovered {
        if merged.len() >= max {
            break;
        }
        if !merged.iter().any(|m| m.eq_ignore_ascii_case(term)) {
            merged.push(term.clone());
        }
    }
    merged.truncate(max);
    merged
}

/// Keyword list for one school: the supplied list when present, otherwise
/// discovered terms merged with the built-in hints.
pub fn resolve_themes(
    school: &str,
    items: &[&Item],
    supplied: Option<&Vec<String>>,
    top_n: usize,
) -> Vec<String> {
    match supplied {
        Some(list) if !list.is_empty() => list.clone(),
        _ => {
            let discovered = discover_themes(items, top_n);
            merge_with_hints(school, &discovered, top_n + HINT_HEADROOM)
        }
    }
}

/// Highest scoring theme for `item`; the first theme wins ties.
pub fn best_theme(item: &Item, themes: &[String]) -> Option<(String, u32)> {
    let mut best: Option<(&String, u32)> = None;
    for theme in themes {
        let score = theme_score(item, theme);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((theme, score));
        }
    }
    best.map(|(t, s)| (t.clone(), s))
}

/// Theme tag used by the greedy and arborescence strategies.
pub fn theme_tag(item: &Item, themes: &[String]) -> Option<String> {
    match best_theme(item, themes) {
        Some((theme, score)) if score > MIN_THEME_SCORE => Some(theme),
        _ => None,
    }
}

/// Assign every item to exactly one group. Returns ordinals per theme;
/// items below [`MIN_THEME_SCORE`] land in [`UNASSIGNED`]. Empty groups are
/// omitted.
#[instrument(level = "debug", skip(items, themes), fields(items = items.len(), themes = themes.len()))]
pub fn group_best_fit(items: &[&Item], themes: &[String]) -> BTreeMap<String, Vec<usize>> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (ordinal, item) in items.iter().enumerate() {
        let key = match best_theme(item, themes) {
            Some((theme, score)) if score >= MIN_THEME_SCORE => theme,
            _ => UNASSIGNED.to_string(),
        };
        groups.entry(key).or_default().push(ordinal);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Tier;

    fn destruction() -> Vec<Item> {
        vec![
            Item::new("01", "Flames", Tier::Novice, "Destruction").with_labels(&["Fire Damage"]),
            Item::new("02", "Frostbite", Tier::Novice, "Destruction").with_labels(&["Frost Damage"]),
            Item::new("03", "Sparks", Tier::Novice, "Destruction").with_labels(&["Shock Damage"]),
            Item::new("04", "Fireball", Tier::Adept, "Destruction").with_labels(&["Fire Damage"]),
            Item::new("05", "Ice Storm", Tier::Adept, "Destruction").with_labels(&["Frost Damage"]),
        ]
    }

    #[test]
    fn given_items_when_discovering_then_returns_content_terms_without_stop_words() {
        let owned = destruction();
        let refs: Vec<&Item> = owned.iter().collect();

        let themes = discover_themes(&refs, 4);

        assert_eq!(themes.len(), 4);
        assert!(themes.iter().all(|t| !is_stop_word(t) && t.len() > 2));
        assert!(themes.contains(&"frost".to_string()) || themes.contains(&"fire".to_string()));
    }

    #[test]
    fn given_single_item_school_when_discovering_then_no_themes() {
        let owned = destruction();
        let refs: Vec<&Item> = owned.iter().take(1).collect();

        assert!(discover_themes(&refs, 4).is_empty());
    }

    #[test]
    fn given_single_item_vanilla_school_when_resolving_then_hints_only() {
        let owned = destruction();
        let refs: Vec<&Item> = owned.iter().take(1).collect();

        let themes = resolve_themes("Destruction", &refs, None, 12);

        assert_eq!(themes, ["fire", "frost", "shock", "cloak", "rune", "wall", "bolt", "storm"]);
    }

    #[test]
    fn given_vanilla_school_when_merging_then_hints_come_first_and_are_capped() {
        let discovered = vec!["fire".to_string(), "sparks".to_string(), "ice".to_string()];

        let merged = merge_with_hints("Destruction", &discovered, 9);

        assert_eq!(&merged[..8], &["fire", "frost", "shock", "cloak", "rune", "wall", "bolt", "storm"]);
        assert_eq!(merged[8], "sparks");
        assert_eq!(merged.len(), 9);
    }

    #[test]
    fn given_unknown_school_when_merging_then_discovered_terms_are_kept() {
        let discovered = vec!["blood".to_string(), "shadow".to_string()];
        assert_eq!(merge_with_hints("Necromancy", &discovered, 12), discovered);
    }

    #[test]
    fn given_supplied_keywords_when_resolving_then_supplied_list_wins() {
        let owned = destruction();
        let refs: Vec<&Item> = owned.iter().collect();
        let supplied = vec!["ice".to_string()];

        assert_eq!(resolve_themes("Destruction", &refs, Some(&supplied), 8), supplied);
    }

    #[test]
    fn given_items_when_grouping_then_each_item_lands_in_exactly_one_group() {
        let mut owned = destruction();
        owned.push(Item::new("06", "Zzyzx", Tier::Novice, "Destruction"));
        let refs: Vec<&Item> = owned.iter().collect();
        let themes = vec!["fire".to_string(), "frost".to_string(), "shock".to_string()];

        let groups = group_best_fit(&refs, &themes);

        let total: usize = groups.values().map(Vec::len).sum();
        assert_eq!(total, owned.len());
        assert_eq!(groups["fire"], vec![0, 3]);
        assert_eq!(groups["frost"], vec![1, 4]);
        assert_eq!(groups[UNASSIGNED], vec![5]);
    }
}
