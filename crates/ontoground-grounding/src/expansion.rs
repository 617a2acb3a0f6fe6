//! Related-term expansion for the retry pass.

use crate::llm::{CompletionRequest, LLMError, LLMProvider};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

const SYNONYM_SYSTEM_PROMPT: &str = "\
You help search biomedical ontologies. Ontology synonyms may be incomplete, so when a term \
is not found a closely related or synonymous term is tried instead. Related terms must be \
CLOSELY RELATED to the original term. Do not respond conversationally.";

/// Source of related or synonymous terms, tried in order when nothing matched.
#[async_trait]
pub trait SynonymExpander: Send + Sync {
    async fn related_terms(&self, term: &str) -> Result<Vec<String>, LLMError>;
}

/// Expander that never proposes anything; disables the retry pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExpansion;

#[async_trait]
impl SynonymExpander for NoExpansion {
    async fn related_terms(&self, _term: &str) -> Result<Vec<String>, LLMError> {
        Ok(Vec::new())
    }
}

/// Case folding shared by synonym lookup and related-term dedupe.
pub(crate) fn fold_case(term: &str) -> String {
    term.to_lowercase()
}

/// Caller-supplied synonym table, keyed case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct StaticSynonyms {
    table: HashMap<String, Vec<String>>,
}

impl StaticSynonyms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<I, S>(mut self, term: &str, related: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table
            .entry(fold_case(term))
            .or_default()
            .extend(related.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl SynonymExpander for StaticSynonyms {
    async fn related_terms(&self, term: &str) -> Result<Vec<String>, LLMError> {
        Ok(self
            .table
            .get(&fold_case(term))
            .cloned()
            .unwrap_or_default())
    }
}

/// Asks a language model for closely related terms, one per line.
pub struct LlmSynonymExpander {
    provider: Arc<dyn LLMProvider>,
    max_terms: usize,
}

impl LlmSynonymExpander {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            max_terms: 5,
        }
    }

    pub fn max_terms(mut self, n: usize) -> Self {
        self.max_terms = n;
        self
    }

    fn prompt(&self, term: &str) -> String {
        format!(
            "TERM: \"{term}\"\n\n\
             List up to {} closely related or synonymous terms that an ontology might use \
             as a label for the same concept. One term per line, most likely first, no \
             explanations.",
            self.max_terms
        )
    }
}

#[async_trait]
impl SynonymExpander for LlmSynonymExpander {
    async fn related_terms(&self, term: &str) -> Result<Vec<String>, LLMError> {
        let request = CompletionRequest::system_user(SYNONYM_SYSTEM_PROMPT, self.prompt(term))
            .max_tokens(256)
            .temperature(0.0);
        let response = self.provider.complete(request).await?;

        let mut terms = parse_related_terms(&response.content);
        terms.truncate(self.max_terms);
        tracing::debug!(term, related = ?terms, "expanded related terms");
        Ok(terms)
    }
}

/// One related term per line; list bullets, ordinals and quotes are stripped
/// and case-insensitive repeats dropped.
pub fn parse_related_terms(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in text.lines() {
        let mut item = line.trim();
        item = item.trim_start_matches(['-', '*', '•']).trim_start();
        if let Some((ordinal, rest)) = item.split_once(['.', ')']) {
            if !ordinal.is_empty()
                && ordinal.chars().all(|c| c.is_ascii_digit())
                && rest.starts_with(char::is_whitespace)
            {
                item = rest.trim_start();
            }
        }
        let item = item.trim_matches(['"', '\'', '`']).trim();
        if item.is_empty() || out.iter().any(|t| t.eq_ignore_ascii_case(item)) {
            continue;
        }
        out.push(item.to_string());
    }
    out
}
