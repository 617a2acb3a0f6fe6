//! Grounding pipeline
//!
//! ```text
//! request ──► candidates ──► rank ──► truncate(top_k) ──► search in rank order
//!                                                              │ no hits
//!                                                              ▼
//!                                                  related terms, one pass
//!                                                              │ no hits
//!                                                              ▼
//!                                                  GroundingResult::empty
//! ```
//!
//! The first ontology in rank order with at least one hit wins, and ontologies
//! ranked below it are never queried in sequential mode. Concurrent mode
//! queries all of them at once but reduces in rank order, so both modes return
//! the same result.

use crate::expansion::{fold_case, NoExpansion, SynonymExpander};
use crate::ranking::{RankingError, RelevanceRanker, RelevanceScorer};
use crate::search::{search_hits, AdapterSelector, SearchBackend, SearchError};
use crate::{
    GroundingError, GroundingResult, OntologyCatalog, OntologyDescriptor, RankedOntology,
    SearchHit, Term,
};
use ontoground_schema::{SchemaAnnotationResolver, SchemaFragment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::task::JoinSet;

/// What to do when the ranker's output contains no usable entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingFallback {
    /// Search candidates in catalog declaration order.
    #[default]
    CatalogOrder,
    /// Propagate `RankingError::NoValidEntries`.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Search source used to build `"<source>:<ontology_id>"` selectors.
    pub source: String,
    /// Search at most this many ranked ontologies.
    pub top_k_ontologies: Option<NonZeroUsize>,
    pub ranking_fallback: RankingFallback,
    pub concurrent_search: bool,
    /// Run the related-term pass when the term itself finds nothing.
    pub synonym_retry: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: "ols".to_string(),
            top_k_ontologies: None,
            ranking_fallback: RankingFallback::CatalogOrder,
            concurrent_search: false,
            synonym_retry: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroundingRequest {
    pub term: Term,
    pub schema: Option<Arc<SchemaFragment>>,
    /// Restrict schema hints to one entity type.
    pub target_class: Option<String>,
    /// Overrides `PipelineConfig::top_k_ontologies` when set.
    pub top_k_ontologies: Option<NonZeroUsize>,
}

impl GroundingRequest {
    pub fn new(term: impl Into<Term>) -> Self {
        Self {
            term: term.into(),
            ..Self::default()
        }
    }

    pub fn with_schema(mut self, schema: Arc<SchemaFragment>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn for_class(mut self, class_name: impl Into<String>) -> Self {
        self.target_class = Some(class_name.into());
        self
    }

    pub fn top_k(mut self, k: NonZeroUsize) -> Self {
        self.top_k_ontologies = Some(k);
        self
    }
}

pub struct GroundingPipeline {
    catalog: Arc<OntologyCatalog>,
    ranker: RelevanceRanker,
    backend: Arc<dyn SearchBackend>,
    expander: Arc<dyn SynonymExpander>,
    resolver: SchemaAnnotationResolver,
    config: PipelineConfig,
}

impl GroundingPipeline {
    pub fn new(
        catalog: Arc<OntologyCatalog>,
        scorer: Arc<dyn RelevanceScorer>,
        backend: Arc<dyn SearchBackend>,
    ) -> Self {
        Self {
            catalog,
            ranker: RelevanceRanker::new(scorer),
            backend,
            expander: Arc::new(NoExpansion),
            resolver: SchemaAnnotationResolver::new(),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_expander(mut self, expander: Arc<dyn SynonymExpander>) -> Self {
        self.expander = expander;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn catalog(&self) -> &OntologyCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Candidate ontologies for a request.
    ///
    /// Schema hints restrict the catalog to the ontologies their rules name.
    /// Without a schema, or when no rule names a catalog ontology, every
    /// catalog entry is a candidate.
    pub fn candidates(
        &self,
        request: &GroundingRequest,
    ) -> Result<Vec<OntologyDescriptor>, GroundingError> {
        let Some(schema) = &request.schema else {
            return Ok(self.catalog.all().to_vec());
        };

        let resolved = match &request.target_class {
            Some(class_name) => self.resolver.resolve_for_class(schema, class_name)?,
            None => self.resolver.resolve(schema),
        };

        let named = resolved.ontology_ids();
        for id in named.iter().filter(|id| !self.catalog.contains(id)) {
            tracing::warn!(ontology = %id, "schema names an ontology outside the catalog; ignoring");
        }

        let selected = self.catalog.select(named.iter().copied());
        if selected.is_empty() {
            tracing::debug!("schema hints name no catalog ontology; using full catalog");
            return Ok(self.catalog.all().to_vec());
        }
        Ok(selected)
    }

    /// Rank candidates, applying the configured fallback on unusable output.
    pub async fn rank(
        &self,
        term: &str,
        candidates: &[OntologyDescriptor],
    ) -> Result<Vec<RankedOntology>, GroundingError> {
        match self.ranker.rank(term, candidates).await {
            Ok(ranked) => Ok(ranked),
            Err(RankingError::NoValidEntries { .. })
                if self.config.ranking_fallback == RankingFallback::CatalogOrder =>
            {
                tracing::warn!(term, "ranker output had no usable entries; using catalog order");
                Ok(RelevanceRanker::catalog_order(candidates))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn ground(&self, request: &GroundingRequest) -> Result<GroundingResult, GroundingError> {
        let term = request.term.as_str();
        let candidates = self.candidates(request)?;
        let mut ranked = self.rank(term, &candidates).await?;

        if let Some(k) = request.top_k_ontologies.or(self.config.top_k_ontologies) {
            ranked.truncate(k.get());
        }
        tracing::debug!(
            term,
            ranked = ?ranked.iter().map(|r| r.descriptor.id.as_str()).collect::<Vec<_>>(),
            "ranked ontologies"
        );

        if let Some(result) = self.search_ranked(term, term, &ranked).await? {
            return Ok(result);
        }

        if self.config.synonym_retry {
            let related = self.expander.related_terms(term).await?;
            let mut tried = vec![fold_case(term)];
            for candidate in &related {
                let folded = fold_case(candidate);
                if tried.contains(&folded) {
                    continue;
                }
                tried.push(folded);
                tracing::debug!(term, related = %candidate, "retrying with related term");
                if let Some(result) = self.search_ranked(term, candidate, &ranked).await? {
                    return Ok(result);
                }
            }
        }

        tracing::info!(term, "no grounding found");
        Ok(GroundingResult::empty(term))
    }

    /// Ground a bare term against the full catalog.
    pub async fn ground_term(&self, term: &str) -> Result<GroundingResult, GroundingError> {
        self.ground(&GroundingRequest::new(term)).await
    }

    async fn search_ranked(
        &self,
        term: &str,
        query: &str,
        ranked: &[RankedOntology],
    ) -> Result<Option<GroundingResult>, GroundingError> {
        let found = if self.config.concurrent_search {
            self.search_concurrent(query, ranked).await?
        } else {
            self.search_sequential(query, ranked).await?
        };

        Ok(found.map(|(ontology_id, hits)| {
            tracing::info!(term, query, ontology = %ontology_id, hits = hits.len(), "grounded");
            GroundingResult::found(term, query, ontology_id, hits)
        }))
    }

    fn selector(&self, ontology: &RankedOntology) -> AdapterSelector {
        AdapterSelector::new(&self.config.source, &ontology.descriptor.id)
    }

    async fn search_sequential(
        &self,
        query: &str,
        ranked: &[RankedOntology],
    ) -> Result<Option<(String, Vec<SearchHit>)>, SearchError> {
        for ontology in ranked {
            let id = &ontology.descriptor.id;
            tracing::debug!(ontology = %id, rank = ontology.rank, query, "searching");
            let adapter = self.backend.adapter(&self.selector(ontology))?;
            let hits = search_hits(adapter.as_ref(), id, query).await?;
            if !hits.is_empty() {
                return Ok(Some((id.clone(), hits)));
            }
        }
        Ok(None)
    }

    /// Search every ranked ontology at once, then reduce in rank order.
    ///
    /// Rank `i` decides the outcome once every rank below it has completed
    /// empty; an error at rank `i` propagates exactly as it would have
    /// sequentially. A panicked task counts as a failed search at its own
    /// rank. Remaining tasks are aborted when the set is dropped.
    async fn search_concurrent(
        &self,
        query: &str,
        ranked: &[RankedOntology],
    ) -> Result<Option<(String, Vec<SearchHit>)>, SearchError> {
        let mut slots: Vec<Option<Result<Vec<SearchHit>, SearchError>>> =
            (0..ranked.len()).map(|_| None).collect();
        let mut tasks = JoinSet::new();
        let mut slot_of = HashMap::new();

        for (slot, ontology) in ranked.iter().enumerate() {
            let adapter = match self.backend.adapter(&self.selector(ontology)) {
                Ok(adapter) => adapter,
                Err(err) => {
                    slots[slot] = Some(Err(err));
                    continue;
                }
            };
            let id = ontology.descriptor.id.clone();
            let query = query.to_string();
            tracing::debug!(ontology = %id, rank = ontology.rank, query = %query, "searching");
            let handle =
                tasks.spawn(async move { (slot, search_hits(adapter.as_ref(), &id, &query).await) });
            slot_of.insert(handle.id(), slot);
        }

        let mut next = 0;
        loop {
            while next < slots.len() {
                match slots[next].take() {
                    None => break,
                    Some(Err(err)) => return Err(err),
                    Some(Ok(hits)) if !hits.is_empty() => {
                        return Ok(Some((ranked[next].descriptor.id.clone(), hits)));
                    }
                    Some(Ok(_)) => next += 1,
                }
            }
            if next == slots.len() {
                return Ok(None);
            }

            match tasks.join_next().await {
                Some(Ok((slot, outcome))) => slots[slot] = Some(outcome),
                Some(Err(err)) => {
                    let failed = SearchError::Transport(format!("search task failed: {err}"));
                    match slot_of.get(&err.id()) {
                        Some(&slot) => slots[slot] = Some(Err(failed)),
                        None => return Err(failed),
                    }
                }
                None => return Ok(None),
            }
        }
    }
}
