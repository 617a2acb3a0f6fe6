//! EBI Ontology Lookup Service (OLS4) backend.

use super::{AdapterSelector, SearchAdapter, SearchBackend, SearchError};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const DEFAULT_OLS_BASE_URL: &str = "https://www.ebi.ac.uk/ols4";
const DEFAULT_ROWS: usize = 10;

#[derive(Debug, Clone)]
pub struct OlsBackend {
    client: Client,
    base: Url,
    rows: usize,
}

impl OlsBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SearchError> {
        let base = Url::parse(base_url)
            .map_err(|e| SearchError::Transport(format!("invalid OLS base URL `{base_url}`: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(SearchError::Transport(format!(
                "OLS base URL `{base_url}` cannot carry a path"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base,
            rows: DEFAULT_ROWS,
        })
    }

    /// Maximum concepts returned per search.
    pub fn rows(mut self, rows: usize) -> Self {
        self.rows = rows.max(1);
        self
    }
}

impl SearchBackend for OlsBackend {
    fn adapter(&self, selector: &AdapterSelector) -> Result<Arc<dyn SearchAdapter>, SearchError> {
        Ok(Arc::new(OlsAdapter {
            client: self.client.clone(),
            base: self.base.clone(),
            rows: self.rows,
            ontology_id: selector.ontology_id.to_lowercase(),
            labels: Mutex::new(HashMap::new()),
        }))
    }
}

/// Adapter for one ontology. Labels seen in search responses are remembered
/// so the follow-up `labels` call rarely needs the network.
pub struct OlsAdapter {
    client: Client,
    base: Url,
    rows: usize,
    ontology_id: String,
    labels: Mutex<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    response: SearchDocs,
}

#[derive(Debug, Deserialize)]
struct SearchDocs {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    obo_id: Option<String>,
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TermsPage {
    #[serde(rename = "_embedded")]
    embedded: Option<EmbeddedTerms>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedTerms {
    #[serde(default)]
    terms: Vec<TermDoc>,
}

#[derive(Debug, Deserialize)]
struct TermDoc {
    label: Option<String>,
}

impl OlsAdapter {
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SearchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SearchError::Transport(format!("OLS base URL `{}` cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, SearchError> {
        tracing::debug!(%url, "OLS request");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Transport(format!("OLS returned HTTP {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))
    }

    async fn fetch_label(&self, concept_id: &str) -> Result<Option<String>, SearchError> {
        let mut url = self.endpoint(&["api", "ontologies", &self.ontology_id, "terms"])?;
        url.query_pairs_mut().append_pair("obo_id", concept_id);

        let page: TermsPage = self.get_json(url).await?;
        Ok(page
            .embedded
            .and_then(|e| e.terms.into_iter().find_map(|t| t.label)))
    }
}

#[async_trait]
impl SearchAdapter for OlsAdapter {
    async fn search(&self, term: &str) -> Result<Vec<String>, SearchError> {
        let mut url = self.endpoint(&["api", "search"])?;
        url.query_pairs_mut()
            .append_pair("q", term)
            .append_pair("ontology", &self.ontology_id)
            .append_pair("queryFields", "label,synonym")
            .append_pair("rows", &self.rows.to_string());

        let envelope: SearchEnvelope = self.get_json(url).await?;

        let mut ids = Vec::new();
        let mut memo = self.labels.lock();
        for doc in envelope.response.docs {
            let Some(id) = doc.obo_id else { continue };
            if ids.contains(&id) {
                continue;
            }
            if let Some(label) = doc.label {
                memo.insert(id.clone(), label);
            }
            ids.push(id);
        }
        Ok(ids)
    }

    async fn labels(&self, ids: &[String]) -> Result<Vec<String>, SearchError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let known = self.labels.lock().get(id).cloned();
            let label = match known {
                Some(label) => label,
                None => {
                    let fetched = self.fetch_label(id).await?.unwrap_or_else(|| id.clone());
                    self.labels.lock().insert(id.clone(), fetched.clone());
                    fetched
                }
            };
            out.push(label);
        }
        Ok(out)
    }
}
