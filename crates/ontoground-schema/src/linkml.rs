//! LinkML schema fragments
//!
//! Only the parts of a LinkML schema that carry grounding hints are modelled.
//! Unknown keys are ignored so full schemas load without complaint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Name = String;

// ============================================================================
// Fragment
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchemaFragment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<Name>,
    #[serde(default)]
    pub description: Option<String>,
    /// Entity-type definitions keyed by class name.
    #[serde(default)]
    pub classes: BTreeMap<Name, ClassDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClassDefinition {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_a: Option<Name>,
    #[serde(default)]
    pub id_prefixes: Option<Vec<String>>,
    #[serde(default)]
    pub annotations: BTreeMap<String, AnnotationValue>,
}

/// A LinkML annotation value, either `key: value` or `key: {tag, value}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnnotationValue {
    Text(String),
    Tagged {
        #[serde(default)]
        tag: Option<String>,
        value: serde_yaml::Value,
    },
    Other(serde_yaml::Value),
}

impl AnnotationValue {
    /// The value as text; `None` for non-string values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnnotationValue::Text(s) => Some(s),
            AnnotationValue::Tagged { value, .. } => value.as_str(),
            AnnotationValue::Other(_) => None,
        }
    }
}

impl ClassDefinition {
    /// The raw `annotations.annotators` value, if declared.
    pub fn annotators(&self) -> Option<&AnnotationValue> {
        self.annotations.get("annotators")
    }

    /// Declared id prefixes; `None` when the field is absent or empty.
    pub fn declared_prefixes(&self) -> Option<&[String]> {
        match self.id_prefixes.as_deref() {
            Some(p) if !p.is_empty() => Some(p),
            _ => None,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid schema YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown class `{0}` in schema")]
    UnknownClass(Name),
}

impl SchemaFragment {
    pub fn from_yaml_str(text: &str) -> Result<Self, SchemaError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn class(&self, name: &str) -> Result<&ClassDefinition, SchemaError> {
        self.classes
            .get(name)
            .ok_or_else(|| SchemaError::UnknownClass(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MONDO_SIMPLE: &str = r#"
id: https://w3id.org/ontoground/mondo_simple
name: mondo_simple
classes:
  Disease:
    description: A disease mentioned in the text
    is_a: NamedEntity
    id_prefixes:
      - MONDO
    annotations:
      annotators: sqlite:obo:mondo
  Phenotype:
    id_prefixes:
      - HP
    annotations:
      annotators:
        tag: annotators
        value: sqlite:obo:hp
  NamedEntity:
    description: Anything with a name
"#;

    #[test]
    fn loads_classes_and_annotations() {
        let schema = SchemaFragment::from_yaml_str(MONDO_SIMPLE).unwrap();
        assert_eq!(schema.name.as_deref(), Some("mondo_simple"));
        assert_eq!(schema.classes.len(), 3);

        let disease = schema.class("Disease").unwrap();
        assert_eq!(disease.declared_prefixes().unwrap(), ["MONDO".to_string()]);
        assert_eq!(
            disease.annotators().and_then(AnnotationValue::as_str),
            Some("sqlite:obo:mondo")
        );

        let phenotype = schema.class("Phenotype").unwrap();
        assert_eq!(
            phenotype.annotators().and_then(AnnotationValue::as_str),
            Some("sqlite:obo:hp")
        );

        let named = schema.class("NamedEntity").unwrap();
        assert!(named.declared_prefixes().is_none());
        assert!(named.annotators().is_none());
    }

    #[test]
    fn empty_prefix_list_counts_as_absent() {
        let schema = SchemaFragment::from_yaml_str(
            "classes:\n  Thing:\n    id_prefixes: []\n    annotations:\n      annotators: ols:go\n",
        )
        .unwrap();
        assert!(schema.class("Thing").unwrap().declared_prefixes().is_none());
    }

    #[test]
    fn non_string_annotations_still_load() {
        let schema = SchemaFragment::from_yaml_str(
            "classes:\n  Thing:\n    annotations:\n      priority: 3\n      annotators: [a, b]\n",
        )
        .unwrap();
        let thing = schema.class("Thing").unwrap();
        assert!(thing.annotators().is_some());
        assert!(thing.annotators().and_then(AnnotationValue::as_str).is_none());
    }

    #[test]
    fn unknown_class_is_an_error() {
        let schema = SchemaFragment::from_yaml_str(MONDO_SIMPLE).unwrap();
        assert!(matches!(
            schema.class("Gene"),
            Err(SchemaError::UnknownClass(name)) if name == "Gene"
        ));
    }

    #[test]
    fn reads_schema_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.yaml");
        std::fs::write(&path, MONDO_SIMPLE).unwrap();
        let schema = SchemaFragment::from_path(&path).unwrap();
        assert!(schema.classes.contains_key("Disease"));

        let missing = SchemaFragment::from_path(dir.path().join("nope.yaml"));
        assert!(matches!(missing, Err(SchemaError::Io { .. })));
    }
}
