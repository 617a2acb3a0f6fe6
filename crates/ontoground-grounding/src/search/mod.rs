//! Ontology search backends
//!
//! A [`SearchBackend`] hands out one [`SearchAdapter`] per
//! `"<source>:<ontology_id>"` selector. Adapters answer two questions: which
//! concept ids match a term, and what the labels of those ids are.
//!
//! Two backends ship with the crate:
//!
//! - [`StaticSearchBackend`]: in-memory concept tables (fixtures, offline runs)
//! - `OlsBackend`: the EBI Ontology Lookup Service (feature `ols`)

use crate::SearchHit;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "ols")]
pub mod ols;

#[cfg(feature = "ols")]
pub use ols::{OlsBackend, DEFAULT_OLS_BASE_URL};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("invalid adapter selector `{0}` (expected `<source>:<ontology_id>`)")]
    InvalidSelector(String),
    #[error("unknown search source `{0}`")]
    UnknownSource(String),
    #[error("search transport error: {0}")]
    Transport(String),
    #[error("invalid search response: {0}")]
    InvalidResponse(String),
    #[error("label lookup returned {got} labels for {expected} ids")]
    LabelMismatch { expected: usize, got: usize },
    #[error("failed to read search fixture `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid search fixture: {0}")]
    Fixture(#[from] serde_yaml::Error),
}

// ============================================================================
// Selector
// ============================================================================

/// `"<source>:<ontology_id>"`, e.g. `ols:mondo` or `sqlite:obo:mondo`.
///
/// The ontology id is everything after the last `:`, so sources may
/// themselves contain colons.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdapterSelector {
    pub source: String,
    pub ontology_id: String,
}

impl AdapterSelector {
    pub fn new(source: &str, ontology_id: &str) -> Self {
        Self {
            source: source.to_string(),
            ontology_id: ontology_id.to_string(),
        }
    }
}

impl fmt::Display for AdapterSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.ontology_id)
    }
}

impl FromStr for AdapterSelector {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().rsplit_once(':') {
            Some((source, id)) if !source.is_empty() && !id.is_empty() => {
                Ok(Self::new(source, id))
            }
            _ => Err(SearchError::InvalidSelector(s.to_string())),
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Term search and label resolution within one ontology.
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    /// Concept ids (CURIEs) matching `term`, best first.
    async fn search(&self, term: &str) -> Result<Vec<String>, SearchError>;

    /// Labels for `ids`, positionally aligned.
    async fn labels(&self, ids: &[String]) -> Result<Vec<String>, SearchError>;
}

/// Factory of adapters, keyed by selector.
pub trait SearchBackend: Send + Sync {
    fn adapter(&self, selector: &AdapterSelector) -> Result<Arc<dyn SearchAdapter>, SearchError>;
}

/// Run `search` then `labels` and zip the two into hits.
pub async fn search_hits(
    adapter: &dyn SearchAdapter,
    ontology_id: &str,
    term: &str,
) -> Result<Vec<SearchHit>, SearchError> {
    let ids = adapter.search(term).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let labels = adapter.labels(&ids).await?;
    if labels.len() != ids.len() {
        return Err(SearchError::LabelMismatch {
            expected: ids.len(),
            got: labels.len(),
        });
    }

    Ok(ids
        .into_iter()
        .zip(labels)
        .map(|(concept_id, label)| SearchHit {
            ontology_id: ontology_id.to_string(),
            concept_id,
            label,
        })
        .collect())
}

// ============================================================================
// Registry
// ============================================================================

/// Dispatches selectors to the backend registered for their source.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn SearchBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, source: &str, backend: Arc<dyn SearchBackend>) -> Self {
        self.backends.insert(source.to_string(), backend);
        self
    }

    pub fn sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        sources.sort_unstable();
        sources
    }
}

impl SearchBackend for BackendRegistry {
    fn adapter(&self, selector: &AdapterSelector) -> Result<Arc<dyn SearchAdapter>, SearchError> {
        self.backends
            .get(&selector.source)
            .ok_or_else(|| SearchError::UnknownSource(selector.source.clone()))?
            .adapter(selector)
    }
}

// ============================================================================
// Static backend
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticConcept {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
}

impl StaticConcept {
    fn matches(&self, term: &str) -> bool {
        self.label.eq_ignore_ascii_case(term)
            || self.synonyms.iter().any(|s| s.eq_ignore_ascii_case(term))
    }
}

#[derive(Debug, Deserialize)]
struct StaticFixture {
    #[serde(default = "default_static_source")]
    source: String,
    #[serde(default)]
    ontologies: HashMap<String, Vec<StaticConcept>>,
}

fn default_static_source() -> String {
    "static".to_string()
}

/// In-memory concept tables, matched on label or synonym (case-insensitive).
///
/// Fixture files look like:
///
/// ```yaml
/// source: static
/// ontologies:
///   doid:
///     - id: DOID:10939
///       label: heart disease
///       synonyms: [cardiopathy]
/// ```
#[derive(Debug, Clone)]
pub struct StaticSearchBackend {
    source: String,
    ontologies: HashMap<String, Arc<Vec<StaticConcept>>>,
}

impl StaticSearchBackend {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ontologies: HashMap::new(),
        }
    }

    pub fn with_concept(mut self, ontology_id: &str, id: &str, label: &str) -> Self {
        let table = self
            .ontologies
            .entry(ontology_id.to_lowercase())
            .or_insert_with(|| Arc::new(Vec::new()));
        Arc::make_mut(table).push(StaticConcept {
            id: id.to_string(),
            label: label.to_string(),
            synonyms: Vec::new(),
        });
        self
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, SearchError> {
        let fixture: StaticFixture = serde_yaml::from_str(text)?;
        Ok(Self {
            source: fixture.source,
            ontologies: fixture
                .ontologies
                .into_iter()
                .map(|(id, concepts)| (id.to_lowercase(), Arc::new(concepts)))
                .collect(),
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SearchError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SearchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl SearchBackend for StaticSearchBackend {
    fn adapter(&self, selector: &AdapterSelector) -> Result<Arc<dyn SearchAdapter>, SearchError> {
        if selector.source != self.source {
            return Err(SearchError::UnknownSource(selector.source.clone()));
        }
        let concepts = self
            .ontologies
            .get(&selector.ontology_id.to_lowercase())
            .cloned()
            .unwrap_or_default();
        Ok(Arc::new(StaticAdapter { concepts }))
    }
}

struct StaticAdapter {
    concepts: Arc<Vec<StaticConcept>>,
}

#[async_trait]
impl SearchAdapter for StaticAdapter {
    async fn search(&self, term: &str) -> Result<Vec<String>, SearchError> {
        let term = term.trim();
        Ok(self
            .concepts
            .iter()
            .filter(|c| c.matches(term))
            .map(|c| c.id.clone())
            .collect())
    }

    async fn labels(&self, ids: &[String]) -> Result<Vec<String>, SearchError> {
        Ok(ids
            .iter()
            .map(|id| {
                self.concepts
                    .iter()
                    .find(|c| &c.id == id)
                    .map_or_else(|| id.clone(), |c| c.label.clone())
            })
            .collect())
    }
}
