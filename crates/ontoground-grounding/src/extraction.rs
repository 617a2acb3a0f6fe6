//! Schema-guided extraction: find entity mentions in text, then ground each
//! one using the annotation hints of its schema class.

use crate::llm::{CompletionRequest, LLMProvider};
use crate::pipeline::{GroundingPipeline, GroundingRequest};
use crate::{GroundingError, GroundingResult};
use ontoground_schema::{SchemaAnnotationResolver, SchemaFragment, SchemaParseWarning};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

const EXTRACTION_SYSTEM_PROMPT: &str = "\
You are an expert curator of scientific knowledge. You take unstructured scientific text and \
identify the entities it mentions that belong to the entity types of a schema. Only report \
mentions supported by the text. Do not respond conversationally.";

#[derive(Debug, Clone, Default)]
pub struct ExtractionOptions {
    /// Classes whose mentions must ground; an empty grounding is an error.
    pub required_classes: BTreeSet<String>,
    /// Treat every class as required.
    pub require_all: bool,
}

impl ExtractionOptions {
    pub fn require(mut self, class_name: impl Into<String>) -> Self {
        self.required_classes.insert(class_name.into());
        self
    }

    fn is_required(&self, class_name: &str) -> bool {
        self.require_all || self.required_classes.contains(class_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    pub class_name: String,
    pub mention: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundedEntity {
    pub class_name: String,
    pub mention: String,
    pub grounding: GroundingResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    pub entities: Vec<GroundedEntity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<SchemaParseWarning>,
}

/// Prompt listing the text and each schema class with its hints.
pub fn extraction_prompt(text: &str, schema: &SchemaFragment) -> String {
    let mut classes = String::new();
    for (name, class) in &schema.classes {
        classes.push_str("- ");
        classes.push_str(name);
        if let Some(description) = &class.description {
            classes.push_str(": ");
            classes.push_str(description.trim());
        }
        if let Some(prefixes) = class.declared_prefixes() {
            classes.push_str(&format!(" [id prefixes: {}]", prefixes.join(", ")));
        }
        classes.push('\n');
    }

    format!(
        "TEXT:\n{text}\n\n\
         Entity types:\n{classes}\n\
         List every entity mention in the text that belongs to one of these entity types, \
         one per line as:\n\
         - <EntityType>: <mention as written in the text>"
    )
}

fn mention_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[-*•]\s*\**([A-Za-z_]\w*)\**\s*:\s*(.+)$").expect("mention line pattern is valid")
    })
}

/// Parse `- <Class>: <mention>` lines, keeping classes the schema defines.
///
/// Class names are matched case-insensitively and normalised to the schema
/// spelling; repeated mentions of the same class are dropped.
pub fn parse_mentions(text: &str, schema: &SchemaFragment) -> Vec<EntityMention> {
    let mut out: Vec<EntityMention> = Vec::new();
    for line in text.lines() {
        let Some(cap) = mention_line_pattern().captures(line.trim()) else {
            continue;
        };
        let Some(class_name) = schema
            .classes
            .keys()
            .find(|name| name.eq_ignore_ascii_case(&cap[1]))
        else {
            tracing::debug!(class = &cap[1], "mention for a class outside the schema");
            continue;
        };
        let mention = cap[2].trim().trim_matches(['"', '\'']).trim();
        if mention.is_empty()
            || out
                .iter()
                .any(|m| &m.class_name == class_name && m.mention.eq_ignore_ascii_case(mention))
        {
            continue;
        }
        out.push(EntityMention {
            class_name: class_name.clone(),
            mention: mention.to_string(),
        });
    }
    out
}

pub struct SchemaGuidedExtractor {
    provider: Arc<dyn LLMProvider>,
    pipeline: Arc<GroundingPipeline>,
    options: ExtractionOptions,
}

impl SchemaGuidedExtractor {
    pub fn new(provider: Arc<dyn LLMProvider>, pipeline: Arc<GroundingPipeline>) -> Self {
        Self {
            provider,
            pipeline,
            options: ExtractionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExtractionOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn extract(
        &self,
        text: &str,
        schema: Arc<SchemaFragment>,
    ) -> Result<ExtractionResult, GroundingError> {
        let warnings = SchemaAnnotationResolver::new().resolve(&schema).warnings;

        let request = CompletionRequest::system_user(EXTRACTION_SYSTEM_PROMPT, extraction_prompt(text, &schema))
            .max_tokens(1024)
            .temperature(0.0);
        let response = self.provider.complete(request).await?;
        let mentions = parse_mentions(&response.content, &schema);
        tracing::debug!(count = mentions.len(), "extracted mentions");

        let mut entities = Vec::with_capacity(mentions.len());
        for EntityMention { class_name, mention } in mentions {
            let request = GroundingRequest::new(mention.as_str())
                .with_schema(Arc::clone(&schema))
                .for_class(class_name.as_str());
            let grounding = self.pipeline.ground(&request).await?;

            let grounding = if self.options.is_required(&class_name) {
                grounding.require_match()?
            } else {
                grounding
            };
            entities.push(GroundedEntity {
                class_name,
                mention,
                grounding,
            });
        }

        Ok(ExtractionResult {
            text: text.to_string(),
            entities,
            warnings,
        })
    }
}
