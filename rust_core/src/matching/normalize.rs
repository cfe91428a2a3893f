//! Name normalization shared by registry aliases and raw inputs.
//!
//! Both sides of every comparison go through `normalize`, so an abbreviation
//! only has to expand consistently, not correctly in every context.

use regex::Regex;
use std::sync::OnceLock;

/// Filler words ignored when comparing token sets
pub const STOPWORDS: &[&str] = &["the", "of", "at", "and", "vs", "in", "for"];

/// Words that appear in many team names and never identify a team alone
pub const DEFAULT_DISAMBIGUATION_TOKENS: &[&str] =
    &["state", "tech", "saint", "city", "college", "university"];

/// Abbreviation rules, applied in order on the lowercased string
fn abbreviation_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            // Leading "St." is Saint ("St. John's", "St. Bonaventure")
            (r"^st\b\.?", "saint"),
            // Mid-name "St." before a saint's name ("Mount St. Mary's")
            (
                r"\bst\b\.?(\s+(?:mary|john|joseph|peter|francis|louis|thomas|bonaventure|augustine|lawrence|ambrose|anselm|norbert|olaf|edward|michael|cloud|xavier)'?s?)\b",
                "saint$1",
            ),
            (r"\bst\b\.?", "state"),
            (r"\buniv\b\.?", "university"),
            (r"\bmt\b\.?", "mount"),
            (r"\bintl\b\.?", "international"),
        ]
        .into_iter()
        .map(|(pattern, replacement)| {
            (
                Regex::new(pattern).expect("abbreviation pattern is valid"),
                replacement,
            )
        })
        .collect()
    })
}

/// Lowercase, strip trailing punctuation, expand abbreviations, then drop
/// remaining punctuation and collapse whitespace.
pub fn normalize(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let mut expanded = lower
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_string();

    for (pattern, replacement) in abbreviation_rules() {
        if pattern.is_match(&expanded) {
            expanded = pattern.replace_all(&expanded, *replacement).into_owned();
        }
    }

    expanded
        .chars()
        .filter_map(|c| match c {
            c if c.is_alphanumeric() || c.is_whitespace() => Some(c),
            '-' | '/' | '(' | ')' | ',' | '.' => Some(' '),
            _ => None,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize and split into words
pub fn tokenize(raw: &str) -> Vec<String> {
    normalize(raw)
        .split_whitespace()
        .map(|w| w.to_string())
        .collect()
}

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_abbreviation_expanded_before_split() {
        assert_eq!(normalize("Boise St."), "boise state");
        assert_eq!(normalize("Boise St"), "boise state");
        assert_eq!(normalize("  BOISE   STATE "), "boise state");
    }

    #[test]
    fn test_st_inside_word_untouched() {
        assert_eq!(normalize("Stanford"), "stanford");
        assert_eq!(normalize("East Carolina"), "east carolina");
        assert_eq!(normalize("Northwestern St."), "northwestern state");
    }

    #[test]
    fn test_leading_st_is_saint() {
        assert_eq!(normalize("St. John's"), "saint johns");
        assert_eq!(normalize("St. Bonaventure"), "saint bonaventure");
    }

    #[test]
    fn test_bare_abbreviation() {
        assert_eq!(normalize("St."), "saint");
        assert_eq!(normalize("State"), "state");
    }

    #[test]
    fn test_punctuation_handling() {
        assert_eq!(normalize("Texas A&M"), "texas am");
        assert_eq!(normalize("Miami (OH)"), "miami oh");
        assert_eq!(normalize("UL-Monroe"), "ul monroe");
        assert_eq!(normalize("Hawai'i!"), "hawaii");
    }

    #[test]
    fn test_other_abbreviations() {
        assert_eq!(normalize("Mt. St. Mary's"), "mount saint marys");
        assert_eq!(normalize("Mount St. Mary's"), normalize("Mount Saint Mary's"));
        assert_eq!(normalize("Fort Valley St."), "fort valley state");
        assert_eq!(normalize("Mount St Joseph"), "mount saint joseph");
        assert_eq!(normalize("Florida Intl"), "florida international");
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("San Diego St."), vec!["san", "diego", "state"]);
        assert!(tokenize("   ").is_empty());
    }
}
