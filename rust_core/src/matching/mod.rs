//! Entity matching: resolve a free-form team name to a canonical registry entry.
//!
//! Resolution runs in stages, stopping at the first that succeeds:
//! 1. exact normalized alias (confidence 1.0)
//! 2. alias whose words are all contained in the input (0.85)
//! 3. unique overlap on identifying tokens (0.5)
//!
//! Ties are never broken by guessing; they come back `Unresolved` with the
//! tied candidates attached so callers can tell an ambiguous registry from an
//! unknown name.

pub mod normalize;
pub mod registry;

pub use registry::{load_registry, CanonicalTeam, JsonFileRegistry, TeamRegistry, TeamRegistrySource};

use crate::error::SyncError;
use normalize::{is_stopword, normalize};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How a name was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    ExactAlias,
    NormalizedAlias,
    TokenFallback,
    Unresolved,
}

impl MatchMethod {
    pub fn confidence(&self) -> f64 {
        match self {
            MatchMethod::ExactAlias => 1.0,
            MatchMethod::NormalizedAlias => 0.85,
            MatchMethod::TokenFallback => 0.5,
            MatchMethod::Unresolved => 0.0,
        }
    }
}

/// Outcome of resolving one raw name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub raw_input: String,
    pub canonical_team: Option<String>,
    pub confidence: f64,
    pub method: MatchMethod,
    /// Teams that tied when ambiguity forced `Unresolved`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

impl MatchResult {
    fn resolved(raw: &str, team: &CanonicalTeam, method: MatchMethod) -> Self {
        Self {
            raw_input: raw.to_string(),
            canonical_team: Some(team.canonical_name.clone()),
            confidence: method.confidence(),
            method,
            candidates: Vec::new(),
        }
    }

    fn unresolved(raw: &str) -> Self {
        Self {
            raw_input: raw.to_string(),
            canonical_team: None,
            confidence: 0.0,
            method: MatchMethod::Unresolved,
            candidates: Vec::new(),
        }
    }

    fn ambiguous(raw: &str, mut candidates: Vec<String>) -> Self {
        candidates.sort();
        candidates.dedup();
        Self {
            candidates,
            ..Self::unresolved(raw)
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.canonical_team.is_some()
    }

    pub fn is_ambiguous(&self) -> bool {
        self.canonical_team.is_none() && self.candidates.len() >= 2
    }

    /// The error a caller records when this result is not usable
    pub fn to_error(&self) -> Option<SyncError> {
        if self.is_resolved() {
            None
        } else if self.is_ambiguous() {
            Some(SyncError::AmbiguousMatch {
                raw: self.raw_input.clone(),
                candidates: self.candidates.clone(),
            })
        } else {
            Some(SyncError::UnresolvedEntity {
                raw: self.raw_input.clone(),
            })
        }
    }
}

/// Stateless resolver over a `TeamRegistry`. Pure and synchronous.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityMatcher;

impl EntityMatcher {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, raw_name: &str, registry: &TeamRegistry) -> MatchResult {
        let normalized = normalize(raw_name);
        let words: Vec<&str> = normalized.split_whitespace().collect();

        if words.is_empty() {
            return MatchResult::unresolved(raw_name);
        }

        // A lone generic word never identifies a team, whatever the registry says
        if words.len() == 1 && (registry.is_disambiguation(words[0]) || is_stopword(words[0])) {
            debug!("'{}' is a lone disambiguation token, not resolving", raw_name);
            return MatchResult::unresolved(raw_name);
        }

        if let Some(team) = registry.lookup_exact(&normalized) {
            return MatchResult::resolved(raw_name, team, MatchMethod::ExactAlias);
        }

        let input: FxHashSet<&str> = words.iter().copied().collect();

        match Self::containment(&input, registry) {
            Stage::Found(idx) => {
                let team = &registry.indexed()[idx].team;
                return MatchResult::resolved(raw_name, team, MatchMethod::NormalizedAlias);
            }
            Stage::Tied(candidates) => {
                warn!(
                    "Ambiguous alias containment for '{}': {:?}",
                    raw_name, candidates
                );
                return MatchResult::ambiguous(raw_name, candidates);
            }
            Stage::Miss => {}
        }

        match Self::token_fallback(&input, registry) {
            Stage::Found(idx) => {
                let team = &registry.indexed()[idx].team;
                MatchResult::resolved(raw_name, team, MatchMethod::TokenFallback)
            }
            Stage::Tied(candidates) => {
                warn!("Ambiguous token overlap for '{}': {:?}", raw_name, candidates);
                MatchResult::ambiguous(raw_name, candidates)
            }
            Stage::Miss => {
                debug!("No registry match for '{}' (normalized '{}')", raw_name, normalized);
                MatchResult::unresolved(raw_name)
            }
        }
    }

    /// Input contains every word of some alias. Leftover words that are weak
    /// for the candidate and foreign to its names reject it, which keeps
    /// "michigan state" from landing on "michigan". Longest alias wins.
    fn containment(input: &FxHashSet<&str>, registry: &TeamRegistry) -> Stage {
        let mut best_len = 0usize;
        let mut best: Vec<usize> = Vec::new();

        for (idx, team) in registry.indexed().iter().enumerate() {
            for alias in &team.aliases {
                if alias.words.len() > input.len() {
                    continue;
                }
                if !alias.words.iter().all(|w| input.contains(w.as_str())) {
                    continue;
                }
                let foreign_leftover = input.iter().any(|w| {
                    !alias.words.iter().any(|aw| aw == w)
                        && registry.is_weak_for(team, w)
                        && !team.words.contains(*w)
                });
                if foreign_leftover {
                    continue;
                }
                let len = alias.words.len();
                if len > best_len {
                    best_len = len;
                    best = vec![idx];
                } else if len == best_len && !best.contains(&idx) {
                    best.push(idx);
                }
            }
        }

        Self::pick(best, registry)
    }

    /// Exactly one team shares an identifying token with the input, and that
    /// team carries every disambiguation token the input has.
    fn token_fallback(input: &FxHashSet<&str>, registry: &TeamRegistry) -> Stage {
        let significant: Vec<&str> = input
            .iter()
            .copied()
            .filter(|w| !registry.is_disambiguation(w) && !is_stopword(w))
            .collect();
        if significant.is_empty() {
            return Stage::Miss;
        }
        let qualifiers: Vec<&str> = input
            .iter()
            .copied()
            .filter(|w| registry.is_disambiguation(w))
            .collect();

        let candidates: Vec<usize> = registry
            .indexed()
            .iter()
            .enumerate()
            .filter(|(_, team)| significant.iter().any(|w| team.significant.contains(*w)))
            .filter(|(_, team)| qualifiers.iter().all(|q| team.words.contains(*q)))
            .map(|(idx, _)| idx)
            .collect();

        Self::pick(candidates, registry)
    }

    fn pick(candidates: Vec<usize>, registry: &TeamRegistry) -> Stage {
        match candidates.len() {
            0 => Stage::Miss,
            1 => Stage::Found(candidates[0]),
            _ => Stage::Tied(
                candidates
                    .into_iter()
                    .map(|idx| registry.indexed()[idx].team.canonical_name.clone())
                    .collect(),
            ),
        }
    }
}

enum Stage {
    Found(usize),
    Tied(Vec<String>),
    Miss,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mountain_west() -> TeamRegistry {
        TeamRegistry::new(vec![
            CanonicalTeam::new("Boise State", &["Boise State", "Broncos"], &[]),
            CanonicalTeam::new("San Diego State", &["San Diego State", "Aztecs"], &[]),
        ])
        .unwrap()
    }

    fn big_ten() -> TeamRegistry {
        TeamRegistry::new(vec![
            CanonicalTeam::new("Michigan", &["Michigan", "Wolverines"], &[]),
            CanonicalTeam::new("Michigan State", &["Michigan State", "Spartans"], &["State"]),
            CanonicalTeam::new("Ohio State", &["Ohio State", "Buckeyes", "OSU"], &["State"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_boise_st_resolves_to_boise_state() {
        let result = EntityMatcher::new().resolve("Boise St.", &mountain_west());
        assert_eq!(result.canonical_team.as_deref(), Some("Boise State"));
        assert_eq!(result.method, MatchMethod::ExactAlias);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_michigan_state_never_michigan() {
        let matcher = EntityMatcher::new();
        let registry = big_ten();
        for raw in [
            "Michigan State",
            "Michigan St.",
            "Michigan St",
            "MICHIGAN STATE SPARTANS",
            "Michigan State University",
        ] {
            let result = matcher.resolve(raw, &registry);
            assert_ne!(result.canonical_team.as_deref(), Some("Michigan"), "input {}", raw);
        }
        assert_eq!(
            matcher.resolve("Michigan St", &registry).canonical_team.as_deref(),
            Some("Michigan State")
        );
    }

    #[test]
    fn test_michigan_state_without_its_own_entry_is_unresolved() {
        let registry =
            TeamRegistry::new(vec![CanonicalTeam::new("Michigan", &["Wolverines"], &[])]).unwrap();
        let result = EntityMatcher::new().resolve("Michigan State", &registry);
        assert!(!result.is_resolved());
    }

    #[test]
    fn test_alias_containment() {
        let result = EntityMatcher::new().resolve("Boise State Broncos", &mountain_west());
        assert_eq!(result.canonical_team.as_deref(), Some("Boise State"));
        assert_eq!(result.method, MatchMethod::NormalizedAlias);
        assert!((result.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_containment_prefers_longest_alias() {
        let result = EntityMatcher::new().resolve("Michigan State Spartans", &big_ten());
        assert_eq!(result.canonical_team.as_deref(), Some("Michigan State"));
        assert_eq!(result.method, MatchMethod::NormalizedAlias);
    }

    #[test]
    fn test_token_fallback_unique() {
        let result = EntityMatcher::new().resolve("Aztecs Football", &mountain_west());
        assert_eq!(result.canonical_team.as_deref(), Some("San Diego State"));
        assert_eq!(result.method, MatchMethod::NormalizedAlias);

        let result = EntityMatcher::new().resolve("San Diego", &mountain_west());
        assert_eq!(result.canonical_team.as_deref(), Some("San Diego State"));
        assert_eq!(result.method, MatchMethod::TokenFallback);
        assert!((result.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_token_fallback_tie_is_ambiguous() {
        let registry = TeamRegistry::new(vec![
            CanonicalTeam::new("North Carolina", &["Tar Heels"], &[]),
            CanonicalTeam::new("South Carolina", &["Gamecocks"], &[]),
        ])
        .unwrap();
        let result = EntityMatcher::new().resolve("Carolina", &registry);
        assert_eq!(result.method, MatchMethod::Unresolved);
        assert!(result.is_ambiguous());
        assert_eq!(result.candidates, vec!["North Carolina", "South Carolina"]);
        assert!(matches!(result.to_error(), Some(SyncError::AmbiguousMatch { .. })));
    }

    #[test]
    fn test_team_tokens_do_not_weaken_other_teams() {
        let registry = TeamRegistry::new(vec![
            CanonicalTeam::new("North Carolina", &["Tar Heels"], &["Carolina"]),
            CanonicalTeam::new("South Carolina", &["Gamecocks"], &["Carolina"]),
            CanonicalTeam::new("Carolina Panthers", &["Carolina", "Panthers"], &[]),
        ])
        .unwrap();
        let matcher = EntityMatcher::new();

        let result = matcher.resolve("Carolina", &registry);
        assert_eq!(result.canonical_team.as_deref(), Some("Carolina Panthers"));
        assert_eq!(result.method, MatchMethod::ExactAlias);

        assert_eq!(
            matcher.resolve("North Carolina", &registry).canonical_team.as_deref(),
            Some("North Carolina")
        );
        assert_eq!(
            matcher.resolve("South Carolina Gamecocks", &registry).canonical_team.as_deref(),
            Some("South Carolina")
        );
    }

    #[test]
    fn test_own_token_alone_does_not_identify_team() {
        let registry = TeamRegistry::new(vec![
            CanonicalTeam::new("North Carolina", &["Tar Heels"], &["Carolina"]),
            CanonicalTeam::new("South Carolina", &["Gamecocks"], &["Carolina"]),
        ])
        .unwrap();
        let result = EntityMatcher::new().resolve("Carolina", &registry);
        assert_eq!(result.method, MatchMethod::Unresolved);
        assert!(!result.is_ambiguous());
    }

    #[test]
    fn test_lone_disambiguation_token_never_resolves() {
        let matcher = EntityMatcher::new();
        let registry = big_ten();
        for raw in ["State", "St.", "Tech", "the"] {
            let result = matcher.resolve(raw, &registry);
            assert_eq!(result.method, MatchMethod::Unresolved, "input {}", raw);
            assert!(!result.is_ambiguous());
        }
    }

    #[test]
    fn test_unknown_name_unresolved() {
        let result = EntityMatcher::new().resolve("Gonzaga", &mountain_west());
        assert_eq!(result.method, MatchMethod::Unresolved);
        assert_eq!(result.confidence, 0.0);
        assert!(matches!(result.to_error(), Some(SyncError::UnresolvedEntity { .. })));
    }

    #[test]
    fn test_empty_input_unresolved() {
        let result = EntityMatcher::new().resolve("  ...  ", &mountain_west());
        assert_eq!(result.method, MatchMethod::Unresolved);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let registry = big_ten();
        let matcher = EntityMatcher::new();
        for raw in ["Ohio St.", "Michigan", "Spartans", "Buckeyes Football", "Carolina"] {
            let first = matcher.resolve(raw, &registry);
            for _ in 0..20 {
                assert_eq!(matcher.resolve(raw, &registry), first);
            }
        }
    }

    #[test]
    fn test_ohio_state_vs_michigan_state_no_cross_match() {
        let matcher = EntityMatcher::new();
        let registry = big_ten();
        assert_eq!(
            matcher.resolve("Ohio St.", &registry).canonical_team.as_deref(),
            Some("Ohio State")
        );
        let result = matcher.resolve("State Spartans", &registry);
        assert_eq!(result.canonical_team.as_deref(), Some("Michigan State"));
    }
}
