//! Ontoground schema hints
//!
//! Schema-guided grounding reads a LinkML-style schema fragment and extracts
//! the ontology hints its entity types carry:
//!
//! ```yaml
//! classes:
//!   Disease:
//!     id_prefixes:
//!       - MONDO
//!     annotations:
//!       annotators: sqlite:obo:mondo
//! ```
//!
//! This crate provides the typed fragment (`linkml`), the annotator reference
//! grammar (`annotator`), and the resolver turning both into
//! `SchemaAnnotationRule`s (`resolver`). It has no knowledge of the ontology
//! catalog; narrowing the candidate set is the pipeline's job.

pub mod annotator;
pub mod linkml;
pub mod resolver;

pub use annotator::{parse_annotator_ref, split_annotators, AnnotatorRef};
pub use linkml::{AnnotationValue, ClassDefinition, SchemaError, SchemaFragment};
pub use resolver::{
    ResolvedRules, SchemaAnnotationResolver, SchemaAnnotationRule, SchemaParseWarning,
};
