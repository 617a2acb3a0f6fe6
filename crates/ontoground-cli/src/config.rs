//! Environment-driven settings for the CLI.
//!
//! Precedence, highest first:
//! 1) command-line flags
//! 2) `ONTOGROUND_*` environment variables
//! 3) built-in defaults

use anyhow::{anyhow, bail, Context, Result};
use ontoground_grounding::OntologyCatalog;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub(crate) const ONTOGROUND_SOURCE_ENV: &str = "ONTOGROUND_SOURCE";
pub(crate) const ONTOGROUND_OLS_BASE_URL_ENV: &str = "ONTOGROUND_OLS_BASE_URL";
pub(crate) const ONTOGROUND_OLS_ROWS_ENV: &str = "ONTOGROUND_OLS_ROWS";
pub(crate) const ONTOGROUND_HTTP_TIMEOUT_SECS_ENV: &str = "ONTOGROUND_HTTP_TIMEOUT_SECS";
pub(crate) const ONTOGROUND_CATALOG_ENV: &str = "ONTOGROUND_CATALOG";

pub(crate) const DEFAULT_SOURCE: &str = "ols";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    pub source: String,
    /// `None` means the backend's own default.
    pub ols_base_url: Option<String>,
    /// Cap on concepts per OLS search; `None` keeps the backend default.
    pub ols_rows: Option<usize>,
    pub http_timeout: Duration,
    pub catalog_path: Option<PathBuf>,
}

impl Settings {
    pub(crate) fn from_env() -> Result<Self> {
        Self::from_lookup(|name| match std::env::var(name) {
            Ok(v) => Ok(Some(v)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(anyhow!("failed to read {name}: {e}")),
        })
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Result<Option<String>>) -> Result<Self> {
        let get = |name: &str| -> Result<Option<String>> {
            Ok(lookup(name)?
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()))
        };

        let http_timeout = match get(ONTOGROUND_HTTP_TIMEOUT_SECS_ENV)? {
            Some(v) => {
                let secs = v.parse::<u64>().map_err(|_| {
                    anyhow!("invalid {ONTOGROUND_HTTP_TIMEOUT_SECS_ENV}={v:?} (expected integer seconds)")
                })?;
                Duration::from_secs(secs.max(1))
            }
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let ols_rows = match get(ONTOGROUND_OLS_ROWS_ENV)? {
            Some(v) => match v.parse::<usize>() {
                Ok(rows) if rows > 0 => Some(rows),
                _ => bail!("invalid {ONTOGROUND_OLS_ROWS_ENV}={v:?} (expected a positive integer)"),
            },
            None => None,
        };

        Ok(Self {
            source: get(ONTOGROUND_SOURCE_ENV)?.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            ols_base_url: get(ONTOGROUND_OLS_BASE_URL_ENV)?,
            ols_rows,
            http_timeout,
            catalog_path: get(ONTOGROUND_CATALOG_ENV)?.map(PathBuf::from),
        })
    }

    /// Flags win over the environment.
    pub(crate) fn with_overrides(mut self, source: Option<String>, catalog: Option<PathBuf>) -> Self {
        if let Some(source) = source {
            self.source = source;
        }
        if let Some(catalog) = catalog {
            self.catalog_path = Some(catalog);
        }
        self
    }

    pub(crate) fn catalog(&self) -> Result<OntologyCatalog> {
        load_catalog(self.catalog_path.as_deref())
    }
}

pub(crate) fn load_catalog(path: Option<&Path>) -> Result<OntologyCatalog> {
    match path {
        Some(path) => OntologyCatalog::from_path(path)
            .with_context(|| format!("failed to load catalog {}", path.display())),
        None => Ok(OntologyCatalog::obo_default()),
    }
}
