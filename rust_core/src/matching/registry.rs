//! Canonical team registry.
//!
//! Loaded once at startup (and again only on an explicit reload). Aliases are
//! normalized on load and must be unique across teams.

use super::normalize::{is_stopword, normalize, DEFAULT_DISAMBIGUATION_TOKENS};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{info, warn};

/// Registry entry for one real-world team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalTeam {
    pub canonical_name: String,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    /// Tokens that are part of this team's names but never identify it alone
    #[serde(default)]
    pub disambiguation_tokens: BTreeSet<String>,
}

impl CanonicalTeam {
    pub fn new(canonical_name: &str, aliases: &[&str], disambiguation_tokens: &[&str]) -> Self {
        Self {
            canonical_name: canonical_name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            disambiguation_tokens: disambiguation_tokens.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct IndexedAlias {
    pub text: String,
    pub words: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct IndexedTeam {
    pub team: CanonicalTeam,
    /// Sorted by text for deterministic iteration
    pub aliases: Vec<IndexedAlias>,
    /// Every word of every alias
    pub words: FxHashSet<String>,
    /// Words that may drive a token fallback
    pub significant: FxHashSet<String>,
    /// This team's own weak words, normalized
    pub own_tokens: FxHashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TeamRegistry {
    teams: Vec<IndexedTeam>,
    exact: FxHashMap<String, usize>,
    disambiguation: FxHashSet<String>,
}

impl TeamRegistry {
    /// Build and index a registry; alias collisions are configuration errors.
    ///
    /// The built-in generic words are weak for every team. A team's own
    /// `disambiguation_tokens` are weak only for that team.
    pub fn new(teams: Vec<CanonicalTeam>) -> Result<Self> {
        let disambiguation: FxHashSet<String> = DEFAULT_DISAMBIGUATION_TOKENS
            .iter()
            .map(|t| t.to_string())
            .collect();

        let mut exact: FxHashMap<String, usize> = FxHashMap::default();
        let mut indexed = Vec::with_capacity(teams.len());

        for (idx, team) in teams.into_iter().enumerate() {
            let own_tokens: FxHashSet<String> = team
                .disambiguation_tokens
                .iter()
                .map(|t| normalize(t))
                .filter(|t| !t.is_empty())
                .collect();

            let mut texts: BTreeSet<String> = BTreeSet::new();
            for raw in std::iter::once(&team.canonical_name).chain(team.aliases.iter()) {
                let norm = normalize(raw);
                if norm.is_empty() {
                    continue;
                }
                let single_word = !norm.contains(' ');
                if single_word
                    && (disambiguation.contains(&norm)
                        || own_tokens.contains(&norm)
                        || is_stopword(&norm))
                {
                    warn!(
                        "Ignoring alias '{}' of {}: a lone '{}' never identifies a team",
                        raw, team.canonical_name, norm
                    );
                    continue;
                }
                texts.insert(norm);
            }

            if texts.is_empty() {
                return Err(SyncError::config(format!(
                    "team '{}' has no usable alias",
                    team.canonical_name
                )));
            }

            let mut aliases = Vec::with_capacity(texts.len());
            let mut words = FxHashSet::default();
            for text in texts {
                if let Some(&other) = exact.get(&text) {
                    if other != idx {
                        let other_name = indexed
                            .get(other)
                            .map(|t: &IndexedTeam| t.team.canonical_name.clone())
                            .unwrap_or_default();
                        return Err(SyncError::config(format!(
                            "alias '{}' is shared by '{}' and '{}'",
                            text, other_name, team.canonical_name
                        )));
                    }
                }
                exact.insert(text.clone(), idx);
                let alias_words: Vec<String> =
                    text.split_whitespace().map(|w| w.to_string()).collect();
                words.extend(alias_words.iter().cloned());
                aliases.push(IndexedAlias {
                    text,
                    words: alias_words,
                });
            }

            let significant = words
                .iter()
                .filter(|w| {
                    !disambiguation.contains(*w) && !own_tokens.contains(*w) && !is_stopword(w)
                })
                .cloned()
                .collect();

            indexed.push(IndexedTeam {
                team,
                aliases,
                words,
                significant,
                own_tokens,
            });
        }

        Ok(Self {
            teams: indexed,
            exact,
            disambiguation,
        })
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn teams(&self) -> impl Iterator<Item = &CanonicalTeam> {
        self.teams.iter().map(|t| &t.team)
    }

    /// Generic word that never identifies any team alone
    pub fn is_disambiguation(&self, word: &str) -> bool {
        self.disambiguation.contains(word)
    }

    /// Generic word, or one of this team's own weak words
    pub(crate) fn is_weak_for(&self, team: &IndexedTeam, word: &str) -> bool {
        self.disambiguation.contains(word) || team.own_tokens.contains(word)
    }

    pub(crate) fn lookup_exact(&self, normalized: &str) -> Option<&CanonicalTeam> {
        self.exact.get(normalized).map(|&idx| &self.teams[idx].team)
    }

    pub(crate) fn indexed(&self) -> &[IndexedTeam] {
        &self.teams
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Source of canonical team records
#[async_trait]
pub trait TeamRegistrySource: Send + Sync {
    async fn load(&self) -> anyhow::Result<Vec<CanonicalTeam>>;
}

/// Registry stored as a JSON array of `CanonicalTeam`
#[derive(Debug, Clone)]
pub struct JsonFileRegistry {
    path: PathBuf,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TeamRegistrySource for JsonFileRegistry {
    async fn load(&self) -> anyhow::Result<Vec<CanonicalTeam>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            anyhow::anyhow!("failed to read team registry {}: {}", self.path.display(), e)
        })?;
        let teams: Vec<CanonicalTeam> = serde_json::from_str(&content)?;
        info!("Loaded {} teams from {}", teams.len(), self.path.display());
        Ok(teams)
    }
}

/// Load from a source and index; any failure is a configuration error
pub async fn load_registry(source: &dyn TeamRegistrySource) -> Result<TeamRegistry> {
    let teams = source
        .load()
        .await
        .map_err(|e| SyncError::config(format!("team registry: {:#}", e)))?;
    TeamRegistry::new(teams)
}
