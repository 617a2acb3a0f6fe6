//! Ontoground: LLM-ranked ontology grounding
//!
//! Grounds a free-text term ("heart disease") to concept identifiers in an
//! ontology (`DOID:10939`) by ranking candidate ontologies with a language
//! model and searching them in rank order.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        GROUNDING PIPELINE                            │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  ┌──────────┐   rules    ┌───────────┐  candidates  ┌───────────┐    │
//! │  │  Schema  │───────────►│  Catalog  │─────────────►│  Ranker   │    │
//! │  │ (LinkML) │            │ (OBO ids) │              │  (LLM)    │    │
//! │  └──────────┘            └───────────┘              └─────┬─────┘    │
//! │                                                           │ ranked   │
//! │                                                     ┌─────▼─────┐    │
//! │   ┌──────────┐  related terms (one retry pass)      │  Search   │    │
//! │   │ Synonyms │─────────────────────────────────────►│ (OLS, ...)│    │
//! │   └──────────┘                                      └─────┬─────┘    │
//! │                                                           │          │
//! │                                        first ranked ontology with    │
//! │                                        hits wins → GroundingResult   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every external capability (language model, ontology search, synonym
//! expansion) is injected as a trait object so pipelines can run against
//! deterministic stubs.

pub mod catalog;
pub mod expansion;
pub mod extraction;
pub mod llm;
pub mod pipeline;
pub mod ranking;
pub mod search;

use serde::{Deserialize, Serialize};

pub use catalog::{CatalogError, OntologyCatalog};
pub use expansion::{LlmSynonymExpander, NoExpansion, StaticSynonyms, SynonymExpander};
pub use extraction::{ExtractionOptions, ExtractionResult, GroundedEntity, SchemaGuidedExtractor};
pub use llm::{LLMError, LLMProvider};
pub use pipeline::{GroundingPipeline, GroundingRequest, PipelineConfig, RankingFallback};
pub use ranking::{LlmRelevanceScorer, RankingError, RelevanceRanker, RelevanceScorer};
pub use search::{
    AdapterSelector, BackendRegistry, SearchAdapter, SearchBackend, SearchError,
    StaticSearchBackend,
};

// ============================================================================
// Core Types
// ============================================================================

/// Free-text input to grounding.
pub type Term = String;

/// A known ontology and the metadata shown to the ranker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OntologyDescriptor {
    /// Short code, e.g. `mondo`.
    pub id: String,
    pub title: String,
    /// When to use this ontology, in one sentence.
    pub scope_hint: String,
}

impl OntologyDescriptor {
    pub fn new(id: &str, title: &str, scope_hint: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            scope_hint: scope_hint.to_string(),
        }
    }
}

/// An ontology placed in the relevance order for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedOntology {
    pub descriptor: OntologyDescriptor,
    /// 0 = most relevant.
    pub rank: usize,
    /// Free-text justification from the ranker, absent for fallback order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// One concept returned by a search backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub ontology_id: String,
    /// CURIE, e.g. `MONDO:0005015`.
    pub concept_id: String,
    pub label: String,
}

/// Outcome of grounding one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingResult {
    pub term: Term,
    pub matches: Vec<SearchHit>,
    /// `None` only when nothing matched after the synonym retry pass.
    pub ontology_used: Option<String>,
    /// The term or related term that produced `matches`.
    pub matched_term: Option<String>,
}

impl GroundingResult {
    pub fn empty(term: &str) -> Self {
        Self {
            term: term.to_string(),
            matches: Vec::new(),
            ontology_used: None,
            matched_term: None,
        }
    }

    pub fn found(term: &str, matched_term: &str, ontology_id: String, matches: Vec<SearchHit>) -> Self {
        Self {
            term: term.to_string(),
            matches,
            ontology_used: Some(ontology_id),
            matched_term: Some(matched_term.to_string()),
        }
    }

    pub fn is_grounded(&self) -> bool {
        self.ontology_used.is_some()
    }

    /// Escalate an empty result into `GroundingError::NoGroundingFound`.
    ///
    /// The pipeline itself never does this; callers that need a ground term
    /// for a mandatory field opt in.
    pub fn require_match(self) -> Result<Self, GroundingError> {
        if self.is_grounded() {
            Ok(self)
        } else {
            Err(GroundingError::NoGroundingFound { term: self.term })
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GroundingError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Ranking(#[from] RankingError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Schema(#[from] ontoground_schema::SchemaError),
    #[error("language model call failed: {0}")]
    Llm(#[from] LLMError),
    #[error("no grounding found for term {term:?}")]
    NoGroundingFound { term: Term },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_match_passes_grounded_results_through() {
        let hit = SearchHit {
            ontology_id: "doid".to_string(),
            concept_id: "DOID:10939".to_string(),
            label: "heart disease".to_string(),
        };
        let result = GroundingResult::found("heart disease", "heart disease", "doid".into(), vec![hit]);
        assert!(result.clone().require_match().is_ok());
        assert_eq!(result.matched_term.as_deref(), Some("heart disease"));
    }

    #[test]
    fn require_match_escalates_empty_results() {
        let err = GroundingResult::empty("zzz").require_match().unwrap_err();
        assert!(matches!(err, GroundingError::NoGroundingFound { term } if term == "zzz"));
    }

    #[test]
    fn empty_result_serializes_null_ontology() {
        let json = serde_json::to_value(GroundingResult::empty("x")).unwrap();
        assert_eq!(json["matches"], serde_json::json!([]));
        assert!(json["ontology_used"].is_null());
    }
}
