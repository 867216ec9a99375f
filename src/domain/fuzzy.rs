//! Fuzzy string scores on a 0..=100 scale and the theme score built on them.

use std::collections::BTreeSet;

use crate::domain::entities::Item;
use crate::domain::nlp::theme_text;

/// Length of the longest common subsequence.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

fn ratio_chars(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(a, b) as f64 / total as f64
}

/// Normalized insert/delete similarity.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

/// Best [`ratio`] of the shorter string against every equal-length window
/// of the longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return 0.0;
    }
    let mut best = 0.0f64;
    for window in long.windows(short.len()) {
        best = best.max(ratio_chars(&short, window));
        if best >= 100.0 {
            break;
        }
    }
    best
}

/// Compare the shared token set against each side's leftovers.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let sect: Vec<&str> = ta.intersection(&tb).copied().collect();
    let diff_ab: Vec<&str> = ta.difference(&tb).copied().collect();
    let diff_ba: Vec<&str> = tb.difference(&ta).copied().collect();
    if !sect.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100.0;
    }

    let joined = |parts: &[&str]| parts.join(" ");
    let t0 = joined(&sect);
    let t1 = [t0.as_str(), joined(&diff_ab).as_str()].join(" ").trim().to_string();
    let t2 = [t0.as_str(), joined(&diff_ba).as_str()].join(" ").trim().to_string();

    let mut best = ratio(&t1, &t2);
    if !t0.is_empty() {
        best = best.max(ratio(&t0, &t1)).max(ratio(&t0, &t2));
    }
    best
}

/// Score (0..=100) of how well `theme` describes `item`.
pub fn theme_score(item: &Item, theme: &str) -> u32 {
    let text = theme_text(item).to_lowercase();
    let name = item.name.to_lowercase();
    let theme = theme.to_lowercase();
    if theme.is_empty() {
        return 0;
    }

    let substring_bonus = if name.contains(&theme) {
        40.0
    } else if text.contains(&theme) {
        30.0
    } else {
        0.0
    };

    let partial = partial_ratio(&theme, &text).round();
    let token = token_set_ratio(&theme, &text).round();
    let name_score = partial_ratio(&theme, &name).round() * 1.2;

    let combined = partial * 0.25 + token * 0.25 + name_score * 0.3 + substring_bonus;
    (combined as u32).min(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Tier;
    use rstest::rstest;

    #[rstest]
    #[case("fire", "fire", 100.0)]
    #[case("", "", 100.0)]
    #[case("abc", "", 0.0)]
    #[case("abcd", "abef", 50.0)]
    fn given_pairs_when_computing_ratio_then_matches_indel_similarity(
        #[case] a: &str,
        #[case] b: &str,
        #[case] expected: f64,
    ) {
        assert!((ratio(a, b) - expected).abs() < 1e-9);
    }

    #[test]
    fn given_substring_when_computing_partial_ratio_then_full_score() {
        assert_eq!(partial_ratio("frost", "ice and frost bite"), 100.0);
        assert!(partial_ratio("fire", "water") < 100.0);
        assert_eq!(partial_ratio("", "anything"), 0.0);
    }

    #[test]
    fn given_subset_tokens_when_computing_token_set_ratio_then_full_score() {
        assert_eq!(token_set_ratio("fire", "fire bolt fire"), 100.0);
        assert!(token_set_ratio("shock", "fire bolt") < 100.0);
        assert_eq!(token_set_ratio("", "fire"), 0.0);
    }

    #[test]
    fn given_theme_in_name_when_scoring_then_beats_unrelated_theme() {
        let item = Item::new("01", "Fireball", Tier::Adept, "Destruction")
            .with_description("An exploding ball of fire")
            .with_labels(&["Fire Damage"]);

        let fire = theme_score(&item, "fire");
        let ward = theme_score(&item, "ward");

        assert!(fire >= 90, "fire scored {fire}");
        assert!(ward < 30, "ward scored {ward}");
        assert!(fire <= 100);
    }
}
