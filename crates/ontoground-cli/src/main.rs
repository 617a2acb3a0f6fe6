//! Ontoground CLI
//!
//! Command-line interface for:
//! - Grounding a free-text term to ontology concepts (`ground`)
//! - Inspecting the ontology ranking for a term (`rank`)
//! - Schema-guided extraction of entity mentions from text (`extract`)
//! - Listing the ontology catalog (`catalog`)
//!
//! Results go to stdout; logs go to stderr (`RUST_LOG`, or `-v`/`-vv`).

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ontoground_grounding::{
    BackendRegistry, ExtractionOptions, GroundingPipeline, GroundingRequest, LLMProvider,
    LlmRelevanceScorer, LlmSynonymExpander, NoExpansion, OntologyCatalog, PipelineConfig,
    RankingFallback, SchemaGuidedExtractor, SearchBackend, StaticSearchBackend, StaticSynonyms,
    SynonymExpander,
};
use ontoground_schema::SchemaFragment;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod output;

use config::Settings;

#[derive(Parser)]
#[command(name = "ontoground")]
#[command(author, version, about = "Ground free-text terms to ontology concepts")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); `RUST_LOG` takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Ontology catalog file (`ontologies: [{id, title, scope_hint}]`)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Static search fixture; registers its concepts under the fixture's source
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ground a term to concept identifiers
    Ground {
        term: String,
        #[command(flatten)]
        search: SearchArgs,
        /// Related term to retry with (repeatable); disables model expansion
        #[arg(long = "synonym")]
        synonyms: Vec<String>,
        /// Skip the related-term retry pass
        #[arg(long)]
        no_expand: bool,
        /// Exit with an error when nothing matches
        #[arg(long)]
        require_match: bool,
        #[arg(long)]
        json: bool,
    },

    /// Show the ontology ranking for a term without searching
    Rank {
        term: String,
        #[command(flatten)]
        hints: SchemaArgs,
        #[arg(long, value_enum, default_value_t = Fallback::CatalogOrder)]
        fallback: Fallback,
        #[arg(long)]
        json: bool,
    },

    /// Extract schema entity mentions from text and ground each one
    Extract {
        text: String,
        schema: PathBuf,
        /// Class whose mentions must ground (repeatable)
        #[arg(long = "require")]
        required: Vec<String>,
        /// Every class must ground
        #[arg(long)]
        require_all: bool,
        /// Search source (default: `ONTOGROUND_SOURCE` or `ols`)
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// List the ontology catalog
    Catalog {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct SchemaArgs {
    /// LinkML schema whose annotators restrict the candidate ontologies
    #[arg(long)]
    schema: Option<PathBuf>,
    /// Only use hints from this schema class
    #[arg(long = "class", requires = "schema")]
    class_name: Option<String>,
}

#[derive(Args)]
struct SearchArgs {
    #[command(flatten)]
    hints: SchemaArgs,
    /// Search at most this many ranked ontologies
    #[arg(long)]
    top_k: Option<NonZeroUsize>,
    /// Search source (default: `ONTOGROUND_SOURCE` or `ols`)
    #[arg(long)]
    source: Option<String>,
    /// Query ranked ontologies concurrently
    #[arg(long)]
    concurrent: bool,
    #[arg(long, value_enum, default_value_t = Fallback::CatalogOrder)]
    fallback: Fallback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Fallback {
    /// Search in catalog order when the ranking is unusable
    CatalogOrder,
    /// Fail when the ranking is unusable
    Fail,
}

impl From<Fallback> for RankingFallback {
    fn from(f: Fallback) -> Self {
        match f {
            Fallback::CatalogOrder => RankingFallback::CatalogOrder,
            Fallback::Fail => RankingFallback::Fail,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::from_env()?;

    match cli.command {
        Commands::Ground {
            term,
            search,
            synonyms,
            no_expand,
            require_match,
            json,
        } => {
            let settings = settings.with_overrides(search.source.clone(), cli.catalog);
            let provider = llm_provider()?;
            let expander: Arc<dyn SynonymExpander> = if no_expand {
                Arc::new(NoExpansion)
            } else if !synonyms.is_empty() {
                Arc::new(StaticSynonyms::new().with(&term, synonyms))
            } else {
                Arc::new(LlmSynonymExpander::new(Arc::clone(&provider)))
            };
            let config = PipelineConfig {
                source: settings.source.clone(),
                top_k_ontologies: search.top_k,
                ranking_fallback: search.fallback.into(),
                concurrent_search: search.concurrent,
                synonym_retry: !no_expand,
            };
            let pipeline = build_pipeline(&settings, cli.fixture.as_deref(), provider, config)?
                .with_expander(expander);

            let request = grounding_request(&term, &search.hints)?;
            let mut result = pipeline.ground(&request).await?;
            if require_match {
                result = result.require_match()?;
            }

            if json {
                output::print_json(&result)?;
            } else {
                print!("{}", output::render_grounding(&result));
            }
        }

        Commands::Rank {
            term,
            hints,
            fallback,
            json,
        } => {
            let settings = settings.with_overrides(None, cli.catalog);
            let config = PipelineConfig {
                ranking_fallback: fallback.into(),
                ..PipelineConfig::default()
            };
            let pipeline = GroundingPipeline::new(
                Arc::new(settings.catalog()?),
                Arc::new(LlmRelevanceScorer::new(llm_provider()?)),
                Arc::new(BackendRegistry::new()),
            )
            .with_config(config);

            let request = grounding_request(&term, &hints)?;
            let candidates = pipeline.candidates(&request)?;
            let ranked = pipeline.rank(&term, &candidates).await?;

            if json {
                output::print_json(&ranked)?;
            } else {
                print!("{}", output::render_ranking(&term, &ranked));
            }
        }

        Commands::Extract {
            text,
            schema,
            required,
            require_all,
            source,
            json,
        } => {
            let settings = settings.with_overrides(source, cli.catalog);
            let schema = load_schema(&schema)?;
            let provider = llm_provider()?;
            let config = PipelineConfig {
                source: settings.source.clone(),
                ..PipelineConfig::default()
            };
            let pipeline = build_pipeline(&settings, cli.fixture.as_deref(), Arc::clone(&provider), config)?
                .with_expander(Arc::new(LlmSynonymExpander::new(Arc::clone(&provider))));

            let options = ExtractionOptions {
                required_classes: required.into_iter().collect(),
                require_all,
            };
            let extractor =
                SchemaGuidedExtractor::new(provider, Arc::new(pipeline)).with_options(options);
            let result = extractor.extract(&text, schema).await?;

            if json {
                output::print_json(&result)?;
            } else {
                print!("{}", output::render_extraction(&result));
            }
        }

        Commands::Catalog { json } => {
            let catalog = settings.with_overrides(None, cli.catalog).catalog()?;
            if json {
                output::print_json(&catalog.all())?;
            } else {
                print!("{}", output::render_catalog(&catalog));
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_schema(path: &Path) -> Result<Arc<SchemaFragment>> {
    let schema = SchemaFragment::from_path(path)
        .with_context(|| format!("failed to load schema {}", path.display()))?;
    Ok(Arc::new(schema))
}

fn grounding_request(term: &str, hints: &SchemaArgs) -> Result<GroundingRequest> {
    let mut request = GroundingRequest::new(term);
    if let Some(path) = &hints.schema {
        request = request.with_schema(load_schema(path)?);
    }
    if let Some(class_name) = &hints.class_name {
        request = request.for_class(class_name.as_str());
    }
    Ok(request)
}

fn build_pipeline(
    settings: &Settings,
    fixture: Option<&Path>,
    provider: Arc<dyn LLMProvider>,
    config: PipelineConfig,
) -> Result<GroundingPipeline> {
    let backend = search_backend(settings, fixture)?;
    Ok(GroundingPipeline::new(
        Arc::new(settings.catalog()?),
        Arc::new(LlmRelevanceScorer::new(provider)),
        backend,
    )
    .with_config(config))
}

fn search_backend(settings: &Settings, fixture: Option<&Path>) -> Result<Arc<dyn SearchBackend>> {
    let mut registry = BackendRegistry::new();

    #[cfg(feature = "ols")]
    {
        use ontoground_grounding::search::{OlsBackend, DEFAULT_OLS_BASE_URL};
        let base = settings.ols_base_url.as_deref().unwrap_or(DEFAULT_OLS_BASE_URL);
        let mut ols = OlsBackend::new(base, settings.http_timeout)?;
        if let Some(rows) = settings.ols_rows {
            ols = ols.rows(rows);
        }
        registry = registry.register("ols", Arc::new(ols));
    }

    if let Some(path) = fixture {
        let backend = StaticSearchBackend::from_path(path)
            .with_context(|| format!("failed to load search fixture {}", path.display()))?;
        let source = backend.source().to_string();
        registry = registry.register(&source, Arc::new(backend));
    }

    if !registry.sources().contains(&settings.source.as_str()) {
        bail!(
            "unknown search source `{}` (available: {})",
            settings.source,
            registry.sources().join(", ")
        );
    }
    Ok(Arc::new(registry))
}

#[cfg(any(feature = "llm-openai", feature = "llm-anthropic", feature = "llm-local"))]
fn llm_provider() -> Result<Arc<dyn LLMProvider>> {
    use ontoground_grounding::llm::providers::UnifiedClient;
    let client = UnifiedClient::from_env().context("language model required")?;
    Ok(Arc::new(client))
}

#[cfg(not(any(feature = "llm-openai", feature = "llm-anthropic", feature = "llm-local")))]
fn llm_provider() -> Result<Arc<dyn LLMProvider>> {
    bail!("ontoground was built without language model providers")
}
