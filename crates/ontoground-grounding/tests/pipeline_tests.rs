//! Grounding pipeline behaviour against deterministic stubs
//!
//! Covers:
//! 1. Rank-order search and first-match-wins
//! 2. Schema narrowing of the candidate set
//! 3. Ranking fallback and the empty-result contract
//! 4. The related-term retry pass
//! 5. Concurrent search reducing to the sequential result

use async_trait::async_trait;
use ontoground_grounding::*;
use ontoground_schema::SchemaFragment;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Stubs
// ============================================================================

struct RecordingScorer {
    response: String,
    seen: Mutex<Vec<Vec<String>>>,
}

impl RecordingScorer {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen_candidates(&self) -> Vec<Vec<String>> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl RelevanceScorer for RecordingScorer {
    async fn score(&self, _term: &str, candidates: &[OntologyDescriptor]) -> Result<String, LLMError> {
        self.seen
            .lock()
            .push(candidates.iter().map(|c| c.id.clone()).collect());
        Ok(self.response.clone())
    }
}

#[derive(Clone, Default)]
struct StubOntology {
    /// (term, concept id, label)
    concepts: Vec<(String, String, String)>,
    delay: Duration,
    fail: bool,
    panic: bool,
}

#[derive(Default)]
struct StubBackend {
    ontologies: HashMap<String, StubOntology>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl StubBackend {
    fn new() -> Self {
        Self::default()
    }

    fn hit(mut self, ontology: &str, term: &str, id: &str, label: &str) -> Self {
        self.ontologies
            .entry(ontology.to_string())
            .or_default()
            .concepts
            .push((term.to_string(), id.to_string(), label.to_string()));
        self
    }

    fn delay(mut self, ontology: &str, ms: u64) -> Self {
        self.ontologies.entry(ontology.to_string()).or_default().delay =
            Duration::from_millis(ms);
        self
    }

    fn failing(mut self, ontology: &str) -> Self {
        self.ontologies.entry(ontology.to_string()).or_default().fail = true;
        self
    }

    fn panicking(mut self, ontology: &str) -> Self {
        self.ontologies.entry(ontology.to_string()).or_default().panic = true;
        self
    }

    /// (ontology, query) pairs in the order searches started.
    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    fn searched_ontologies(&self) -> Vec<String> {
        self.calls().into_iter().map(|(o, _)| o).collect()
    }
}

impl SearchBackend for StubBackend {
    fn adapter(&self, selector: &AdapterSelector) -> Result<Arc<dyn SearchAdapter>, SearchError> {
        Ok(Arc::new(StubAdapter {
            ontology_id: selector.ontology_id.clone(),
            stub: self
                .ontologies
                .get(&selector.ontology_id)
                .cloned()
                .unwrap_or_default(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct StubAdapter {
    ontology_id: String,
    stub: StubOntology,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl SearchAdapter for StubAdapter {
    async fn search(&self, term: &str) -> Result<Vec<String>, SearchError> {
        self.calls
            .lock()
            .push((self.ontology_id.clone(), term.to_string()));
        if !self.stub.delay.is_zero() {
            tokio::time::sleep(self.stub.delay).await;
        }
        if self.stub.panic {
            panic!("{} adapter crashed", self.ontology_id);
        }
        if self.stub.fail {
            return Err(SearchError::Transport(format!("{} unavailable", self.ontology_id)));
        }
        Ok(self
            .stub
            .concepts
            .iter()
            .filter(|(t, _, _)| t.eq_ignore_ascii_case(term))
            .map(|(_, id, _)| id.clone())
            .collect())
    }

    async fn labels(&self, ids: &[String]) -> Result<Vec<String>, SearchError> {
        Ok(ids
            .iter()
            .map(|id| {
                self.stub
                    .concepts
                    .iter()
                    .find(|(_, cid, _)| cid == id)
                    .map(|(_, _, label)| label.clone())
                    .unwrap_or_default()
            })
            .collect())
    }
}

struct FailingExpander;

#[async_trait]
impl SynonymExpander for FailingExpander {
    async fn related_terms(&self, _term: &str) -> Result<Vec<String>, LLMError> {
        Err(LLMError::Network("connection reset".to_string()))
    }
}

fn pipeline(scorer: Arc<RecordingScorer>, backend: Arc<StubBackend>) -> GroundingPipeline {
    GroundingPipeline::new(Arc::new(OntologyCatalog::obo_default()), scorer, backend)
}

const MONDO_THEN_DOID: &str = "1. mondo - human diseases\n2. doid - disease classification";

// ============================================================================
// Rank-order search
// ============================================================================

#[tokio::test]
async fn heart_disease_grounds_in_second_ranked_ontology() {
    let backend = Arc::new(StubBackend::new().hit("doid", "heart disease", "doid:10939", "heart disease"));
    let p = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend.clone());

    let result = p.ground_term("heart disease").await.unwrap();

    assert_eq!(result.ontology_used.as_deref(), Some("doid"));
    assert_eq!(
        result.matches,
        vec![SearchHit {
            ontology_id: "doid".to_string(),
            concept_id: "doid:10939".to_string(),
            label: "heart disease".to_string(),
        }]
    );
    assert_eq!(result.matched_term.as_deref(), Some("heart disease"));
    assert_eq!(backend.searched_ontologies(), vec!["mondo", "doid"]);
}

#[tokio::test]
async fn first_ranked_ontology_with_hits_wins() {
    let backend = Arc::new(
        StubBackend::new()
            .hit("mondo", "diabetes", "MONDO:0005015", "diabetes mellitus")
            .hit("doid", "diabetes", "DOID:9351", "diabetes mellitus"),
    );
    let p = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend.clone());

    let result = p.ground_term("diabetes").await.unwrap();

    assert_eq!(result.ontology_used.as_deref(), Some("mondo"));
    assert_eq!(result.matches[0].concept_id, "MONDO:0005015");
    assert_eq!(backend.searched_ontologies(), vec!["mondo"]);
}

#[tokio::test]
async fn duplicate_concept_ids_are_kept() {
    let backend = Arc::new(
        StubBackend::new()
            .hit("mondo", "x", "MONDO:1", "x")
            .hit("mondo", "x", "MONDO:1", "x"),
    );
    let p = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend);
    let result = p.ground_term("x").await.unwrap();
    assert_eq!(result.matches.len(), 2);
}

#[tokio::test]
async fn grounding_is_idempotent() {
    let backend = Arc::new(
        StubBackend::new()
            .hit("doid", "heart disease", "DOID:10939", "heart disease")
            .hit("doid", "heart disease", "DOID:114", "heart disease, unspecified"),
    );
    let p = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend);

    let first = serde_json::to_string(&p.ground_term("heart disease").await.unwrap()).unwrap();
    let second = serde_json::to_string(&p.ground_term("heart disease").await.unwrap()).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn search_errors_propagate() {
    let backend = Arc::new(StubBackend::new().failing("mondo"));
    let p = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend);
    let err = p.ground_term("anything").await.unwrap_err();
    assert!(matches!(err, GroundingError::Search(SearchError::Transport(_))));
}

// ============================================================================
// Schema narrowing
// ============================================================================

const MONDO_SCHEMA: &str = r#"
classes:
  Disease:
    id_prefixes:
      - MONDO
    annotations:
      annotators: sqlite:obo:mondo
  Phenotype:
    id_prefixes:
      - HP
    annotations:
      annotators: sqlite:obo:hp
"#;

#[tokio::test]
async fn schema_hints_restrict_candidates() {
    let schema = Arc::new(SchemaFragment::from_yaml_str(MONDO_SCHEMA).unwrap());
    let scorer = RecordingScorer::new("1. mondo - diseases");
    let backend = Arc::new(StubBackend::new().hit("mondo", "Marfan syndrome", "MONDO:0007947", "Marfan syndrome"));
    let p = pipeline(scorer.clone(), backend);

    let request = GroundingRequest::new("Marfan syndrome")
        .with_schema(schema)
        .for_class("Disease");
    let candidates: Vec<String> = p.candidates(&request).unwrap().into_iter().map(|d| d.id).collect();
    assert_eq!(candidates, vec!["mondo"]);

    let result = p.ground(&request).await.unwrap();
    assert_eq!(result.ontology_used.as_deref(), Some("mondo"));
    assert_eq!(scorer.seen_candidates(), vec![vec!["mondo".to_string()]]);
}

#[tokio::test]
async fn whole_schema_narrows_to_all_named_ontologies() {
    let schema = Arc::new(SchemaFragment::from_yaml_str(MONDO_SCHEMA).unwrap());
    let p = pipeline(RecordingScorer::new(""), Arc::new(StubBackend::new()));
    let request = GroundingRequest::new("x").with_schema(schema);
    let candidates: Vec<String> = p.candidates(&request).unwrap().into_iter().map(|d| d.id).collect();
    assert_eq!(candidates, vec!["mondo", "hp"]);
}

// ============================================================================
// Fallback and empty results
// ============================================================================

#[tokio::test]
async fn unparseable_ranking_falls_back_to_catalog_order() {
    let backend = Arc::new(StubBackend::new().hit("hp", "seizure", "HP:0001250", "Seizure"));
    let p = pipeline(RecordingScorer::new("Sorry, I cannot help with that."), backend.clone());

    let result = p.ground_term("seizure").await.unwrap();

    assert_eq!(result.ontology_used.as_deref(), Some("hp"));
    assert_eq!(backend.searched_ontologies(), vec!["mondo", "doid", "hp"]);
}

#[tokio::test]
async fn nothing_found_is_an_empty_result_not_an_error() {
    let backend = Arc::new(StubBackend::new());
    let p = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend.clone());

    let result = p.ground_term("zzzz").await.unwrap();

    assert!(result.matches.is_empty());
    assert_eq!(result.ontology_used, None);
    assert_eq!(result.matched_term, None);
    assert_eq!(backend.searched_ontologies(), vec!["mondo", "doid"]);
    assert!(matches!(
        result.require_match(),
        Err(GroundingError::NoGroundingFound { term }) if term == "zzzz"
    ));
}

#[tokio::test]
async fn empty_terms_are_forwarded() {
    let backend = Arc::new(StubBackend::new());
    let p = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend.clone());
    let result = p.ground_term("").await.unwrap();
    assert!(!result.is_grounded());
    assert_eq!(backend.calls()[0], ("mondo".to_string(), String::new()));
}

// ============================================================================
// Related-term retry
// ============================================================================

#[tokio::test]
async fn related_terms_are_tried_once_in_order() {
    let backend = Arc::new(
        StubBackend::new().hit("doid", "myocardial infarction", "DOID:5844", "myocardial infarction"),
    );
    let synonyms = StaticSynonyms::new().with(
        "heart attack",
        ["Heart Attack", "cardiac arrest", "myocardial infarction", "MI"],
    );
    let p = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend.clone())
        .with_expander(Arc::new(synonyms));

    let result = p.ground_term("heart attack").await.unwrap();

    assert_eq!(result.term, "heart attack");
    assert_eq!(result.matched_term.as_deref(), Some("myocardial infarction"));
    assert_eq!(result.ontology_used.as_deref(), Some("doid"));

    let queries: Vec<String> = backend.calls().into_iter().map(|(_, q)| q).collect();
    assert_eq!(
        queries,
        vec![
            "heart attack",
            "heart attack",
            "cardiac arrest",
            "cardiac arrest",
            "myocardial infarction",
            "myocardial infarction",
        ]
    );
}

#[tokio::test]
async fn retry_can_be_disabled() {
    let backend = Arc::new(StubBackend::new().hit("doid", "MI", "DOID:5844", "myocardial infarction"));
    let p = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend)
        .with_expander(Arc::new(StaticSynonyms::new().with("heart attack", ["MI"])))
        .with_config(PipelineConfig {
            synonym_retry: false,
            ..PipelineConfig::default()
        });
    assert!(!p.ground_term("heart attack").await.unwrap().is_grounded());
}

#[tokio::test]
async fn expander_errors_propagate() {
    let p = pipeline(RecordingScorer::new(MONDO_THEN_DOID), Arc::new(StubBackend::new()))
        .with_expander(Arc::new(FailingExpander));
    let err = p.ground_term("x").await.unwrap_err();
    assert!(matches!(err, GroundingError::Llm(LLMError::Network(_))));
}

// ============================================================================
// Concurrent search
// ============================================================================

fn concurrent() -> PipelineConfig {
    PipelineConfig {
        concurrent_search: true,
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn concurrent_search_matches_sequential_when_lower_rank_answers_first() {
    let backend = Arc::new(
        StubBackend::new()
            .hit("mondo", "diabetes", "MONDO:0005015", "diabetes mellitus")
            .delay("mondo", 50)
            .hit("doid", "diabetes", "DOID:9351", "diabetes mellitus"),
    );
    let sequential = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend.clone());
    let parallel = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend).with_config(concurrent());

    let a = sequential.ground_term("diabetes").await.unwrap();
    let b = parallel.ground_term("diabetes").await.unwrap();

    assert_eq!(b.ontology_used.as_deref(), Some("mondo"));
    assert_eq!(a, b);
}

#[tokio::test]
async fn concurrent_search_propagates_higher_ranked_errors() {
    let backend = Arc::new(
        StubBackend::new()
            .failing("mondo")
            .delay("mondo", 30)
            .hit("doid", "x", "DOID:1", "x"),
    );
    let p = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend).with_config(concurrent());
    let err = p.ground_term("x").await.unwrap_err();
    assert!(matches!(err, GroundingError::Search(SearchError::Transport(_))));
}

#[tokio::test]
async fn concurrent_search_ignores_errors_below_the_winner() {
    let backend = Arc::new(
        StubBackend::new()
            .hit("mondo", "x", "MONDO:1", "x")
            .delay("mondo", 30)
            .failing("doid"),
    );
    let p = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend).with_config(concurrent());
    let result = p.ground_term("x").await.unwrap();
    assert_eq!(result.ontology_used.as_deref(), Some("mondo"));
}

#[tokio::test]
async fn concurrent_empty_search_runs_the_retry_pass() {
    let backend = Arc::new(StubBackend::new().hit("doid", "MI", "DOID:5844", "myocardial infarction"));
    let p = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend)
        .with_expander(Arc::new(StaticSynonyms::new().with("heart attack", ["MI"])))
        .with_config(concurrent());
    let result = p.ground_term("heart attack").await.unwrap();
    assert_eq!(result.matched_term.as_deref(), Some("MI"));
}

#[tokio::test]
async fn concurrent_search_ignores_panics_below_the_winner() {
    let backend = Arc::new(
        StubBackend::new()
            .hit("mondo", "x", "MONDO:1", "x")
            .delay("mondo", 50)
            .panicking("doid"),
    );
    let sequential = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend.clone());
    let parallel = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend).with_config(concurrent());

    let a = sequential.ground_term("x").await.unwrap();
    let b = parallel.ground_term("x").await.unwrap();

    assert_eq!(b.ontology_used.as_deref(), Some("mondo"));
    assert_eq!(a, b);
}

#[tokio::test]
async fn concurrent_search_reports_a_panic_at_the_deciding_rank() {
    let backend = Arc::new(
        StubBackend::new()
            .panicking("mondo")
            .delay("mondo", 30)
            .hit("doid", "x", "DOID:1", "x"),
    );
    let p = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend).with_config(concurrent());
    let err = p.ground_term("x").await.unwrap_err();
    assert!(matches!(err, GroundingError::Search(SearchError::Transport(_))));
}

#[tokio::test]
async fn related_term_dedupe_folds_non_ascii_case() {
    let backend = Arc::new(StubBackend::new());
    let synonyms = StaticSynonyms::new().with("Ménière disease", ["MÉNIÈRE DISEASE", "vertigo"]);
    let p = pipeline(RecordingScorer::new(MONDO_THEN_DOID), backend.clone())
        .with_expander(Arc::new(synonyms));

    let result = p.ground_term("ménière disease").await.unwrap();
    assert!(!result.is_grounded());

    let queries: Vec<String> = backend.calls().into_iter().map(|(_, q)| q).collect();
    assert_eq!(
        queries,
        vec!["ménière disease", "ménière disease", "vertigo", "vertigo"]
    );
}
