//! Annotator references: `<source>:obo:<ontology_id>`
//!
//! An annotator reference names a search source the schema author prefers for
//! an entity type. The forms seen in practice:
//!
//! - `sqlite:obo:mondo`
//! - `ols:hp`
//! - `sqlite:/data/ontologies/uberon.db`
//!
//! The ontology id is the segment after the last separator (`:` or `/`), with
//! any file extension removed, lower-cased. A reference with a single segment
//! carries no source and is rejected.

use nom::{
    bytes::complete::take_while1, combinator::all_consuming, multi::separated_list1, IResult,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnnotatorRef {
    /// Leading segment (`sqlite`, `ols`, ...).
    pub source: String,
    /// Every segment in order, including `source` and the ontology segment.
    pub segments: Vec<String>,
    /// Lower-cased ontology id parsed from the last segment.
    pub ontology_id: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid annotator reference {reference:?}: {message}")]
pub struct AnnotatorParseError {
    pub reference: String,
    pub message: String,
}

impl AnnotatorParseError {
    fn new(reference: &str, message: impl Into<String>) -> Self {
        Self {
            reference: reference.to_string(),
            message: message.into(),
        }
    }
}

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn is_separator(c: char) -> bool {
    c == ':' || c == '/'
}

fn segment(input: &str) -> IResult<&str, &str> {
    take_while1(is_segment_char)(input)
}

fn separator(input: &str) -> IResult<&str, &str> {
    take_while1(is_separator)(input)
}

fn segments(input: &str) -> IResult<&str, Vec<&str>> {
    all_consuming(separated_list1(separator, segment))(input)
}

/// Parse a single annotator reference.
pub fn parse_annotator_ref(reference: &str) -> Result<AnnotatorRef, AnnotatorParseError> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Err(AnnotatorParseError::new(reference, "empty reference"));
    }

    let (_, parts) = segments(trimmed)
        .map_err(|_| AnnotatorParseError::new(reference, "expected `<source>:...:<ontology>`"))?;

    if parts.len() < 2 {
        return Err(AnnotatorParseError::new(
            reference,
            "missing source separator",
        ));
    }

    let last = parts[parts.len() - 1];
    let stem = match last.split_once('.') {
        Some((stem, _ext)) => stem,
        None => last,
    };

    if !stem.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(AnnotatorParseError::new(
            reference,
            format!("ontology segment {last:?} must start with a letter"),
        ));
    }

    Ok(AnnotatorRef {
        source: parts[0].to_string(),
        segments: parts.iter().map(|s| s.to_string()).collect(),
        ontology_id: stem.to_ascii_lowercase(),
    })
}

/// Split an `annotators` value into its individual references.
///
/// LinkML allows several annotators separated by commas.
pub fn split_annotators(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}
