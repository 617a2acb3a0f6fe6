//! Relevance ranking of candidate ontologies
//!
//! A language model is shown the term and every candidate's metadata and asked
//! for a ranked list. Its output is untrusted free text: lines that do not look
//! like `"<ordinal>. <ontology_id> - <rationale>"` are skipped, ids outside the
//! candidate set are dropped, and repeated ids keep their first position.

use crate::llm::{CompletionRequest, LLMError, LLMProvider};
use crate::{OntologyDescriptor, RankedOntology};
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};

const RANKING_SYSTEM_PROMPT: &str = "\
You are an expert in biomedical ontologies. Given a biomedical term, rank the most relevant \
ontologies from the supplied list for searching that term. Prioritize domain fit, popularity, \
and clarity of scope.";

#[derive(Debug, thiserror::Error)]
pub enum RankingError {
    #[error("no valid ontology ranking for {term:?} in relevance output")]
    NoValidEntries { term: String },
    #[error("relevance scoring failed: {0}")]
    Capability(#[from] LLMError),
}

// ============================================================================
// Scoring capability
// ============================================================================

/// External capability that scores ontologies for a term and answers in text.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score(&self, term: &str, candidates: &[OntologyDescriptor]) -> Result<String, LLMError>;
}

/// Build the user prompt listing the term and every candidate.
pub fn ranking_prompt(term: &str, candidates: &[OntologyDescriptor]) -> String {
    let listing = candidates
        .iter()
        .map(|c| format!("- {}: {} ({})", c.id, c.title, c.scope_hint))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "TERM: \"{term}\"\n\n\
         Candidate ontologies:\n{listing}\n\n\
         Which are the best ontologies in which to search for this term? Output as many as you \
         think are relevant, ranked in descending order of relevance, one per line as:\n\
         <rank>. <ontology_id> - <reason>"
    )
}

/// Relevance scorer backed by a language model.
pub struct LlmRelevanceScorer {
    provider: Arc<dyn LLMProvider>,
    max_tokens: usize,
}

impl LlmRelevanceScorer {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            max_tokens: 512,
        }
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = n;
        self
    }
}

#[async_trait]
impl RelevanceScorer for LlmRelevanceScorer {
    async fn score(&self, term: &str, candidates: &[OntologyDescriptor]) -> Result<String, LLMError> {
        let request =
            CompletionRequest::system_user(RANKING_SYSTEM_PROMPT, ranking_prompt(term, candidates))
                .max_tokens(self.max_tokens)
                .temperature(0.0);
        Ok(self.provider.complete(request).await?.content)
    }
}

// ============================================================================
// Parsing
// ============================================================================

fn ranked_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Optional markdown emphasis around the id, e.g. `1. **mondo** - ...`.
        Regex::new(r"^\d+\.\s*\**(\w+)\**\s*[-–]\s*(.+)$").expect("ranked line pattern is valid")
    })
}

/// Extract `(ontology_id, rationale)` pairs from capability output, in order.
pub fn parse_ranked_lines(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let cap = ranked_line_pattern().captures(line.trim())?;
            Some((cap[1].to_string(), cap[2].trim().to_string()))
        })
        .collect()
}

// ============================================================================
// Ranker
// ============================================================================

pub struct RelevanceRanker {
    scorer: Arc<dyn RelevanceScorer>,
}

impl RelevanceRanker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }

    /// Rank `candidates` for `term` using the scoring capability.
    pub async fn rank(
        &self,
        term: &str,
        candidates: &[OntologyDescriptor],
    ) -> Result<Vec<RankedOntology>, RankingError> {
        let text = self.scorer.score(term, candidates).await?;
        Self::rank_from_text(term, &text, candidates)
    }

    /// Turn capability output into a contiguous ranking over `candidates`.
    pub fn rank_from_text(
        term: &str,
        text: &str,
        candidates: &[OntologyDescriptor],
    ) -> Result<Vec<RankedOntology>, RankingError> {
        let mut ranked: Vec<RankedOntology> = Vec::new();

        for (id, rationale) in parse_ranked_lines(text) {
            let Some(descriptor) = candidates.iter().find(|c| c.id.eq_ignore_ascii_case(&id)) else {
                tracing::debug!(ontology = %id, "ranker named an ontology outside the candidate set");
                continue;
            };
            if ranked.iter().any(|r| r.descriptor.id == descriptor.id) {
                continue;
            }
            ranked.push(RankedOntology {
                descriptor: descriptor.clone(),
                rank: ranked.len(),
                rationale: Some(rationale),
            });
        }

        if ranked.is_empty() {
            return Err(RankingError::NoValidEntries {
                term: term.to_string(),
            });
        }
        Ok(ranked)
    }

    /// Declaration order of `candidates`, used when ranking output is unusable.
    pub fn catalog_order(candidates: &[OntologyDescriptor]) -> Vec<RankedOntology> {
        candidates
            .iter()
            .enumerate()
            .map(|(rank, descriptor)| RankedOntology {
                descriptor: descriptor.clone(),
                rank,
                rationale: None,
            })
            .collect()
    }
}
