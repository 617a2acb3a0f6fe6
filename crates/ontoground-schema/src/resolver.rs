//! Schema annotation rules
//!
//! Every entity type that declares both `id_prefixes` and an `annotators`
//! annotation yields one rule per (prefix, annotator) pair. Entity types that
//! declare only one of the two are skipped. Annotator references that do not
//! parse are dropped and reported as warnings; resolution itself never fails.

use crate::annotator::{parse_annotator_ref, split_annotators};
use crate::linkml::{ClassDefinition, SchemaError, SchemaFragment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SchemaAnnotationRule {
    pub id_prefix: String,
    pub preferred_ontology_id: String,
}

/// A non-fatal problem found while resolving annotation rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaParseWarning {
    pub class_name: String,
    pub annotator: String,
    pub message: String,
}

impl std::fmt::Display for SchemaParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "class `{}`: ignoring annotator {:?} ({})",
            self.class_name, self.annotator, self.message
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedRules {
    pub rules: Vec<SchemaAnnotationRule>,
    pub warnings: Vec<SchemaParseWarning>,
}

impl ResolvedRules {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Preferred ontology ids in first-seen order, without repeats.
    pub fn ontology_ids(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if !out.contains(&rule.preferred_ontology_id.as_str()) {
                out.push(&rule.preferred_ontology_id);
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaAnnotationResolver;

impl SchemaAnnotationResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve rules for every class in the fragment.
    pub fn resolve(&self, schema: &SchemaFragment) -> ResolvedRules {
        let mut out = ResolvedRules::default();
        for (name, class) in &schema.classes {
            Self::resolve_class(name, class, &mut out);
        }
        out
    }

    /// Resolve rules for a single class.
    pub fn resolve_for_class(
        &self,
        schema: &SchemaFragment,
        class_name: &str,
    ) -> Result<ResolvedRules, SchemaError> {
        let class = schema.class(class_name)?;
        let mut out = ResolvedRules::default();
        Self::resolve_class(class_name, class, &mut out);
        Ok(out)
    }

    fn resolve_class(name: &str, class: &ClassDefinition, out: &mut ResolvedRules) {
        let (Some(prefixes), Some(annotators)) = (class.declared_prefixes(), class.annotators())
        else {
            return;
        };

        let Some(value) = annotators.as_str() else {
            Self::warn(
                out,
                SchemaParseWarning {
                    class_name: name.to_string(),
                    annotator: format!("{annotators:?}"),
                    message: "annotators must be a string".to_string(),
                },
            );
            return;
        };

        for reference in split_annotators(value) {
            match parse_annotator_ref(reference) {
                Ok(parsed) => {
                    for prefix in prefixes {
                        let rule = SchemaAnnotationRule {
                            id_prefix: prefix.clone(),
                            preferred_ontology_id: parsed.ontology_id.clone(),
                        };
                        if !out.rules.contains(&rule) {
                            out.rules.push(rule);
                        }
                    }
                }
                Err(err) => Self::warn(
                    out,
                    SchemaParseWarning {
                        class_name: name.to_string(),
                        annotator: reference.to_string(),
                        message: err.message,
                    },
                ),
            }
        }
    }

    fn warn(out: &mut ResolvedRules, warning: SchemaParseWarning) {
        tracing::warn!(
            class = %warning.class_name,
            annotator = %warning.annotator,
            "{}",
            warning.message
        );
        out.warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(yaml: &str) -> SchemaFragment {
        SchemaFragment::from_yaml_str(yaml).unwrap()
    }

    #[test]
    fn hp_prefix_resolves_to_hp_rule() {
        let s = schema(
            r#"
classes:
  Phenotype:
    id_prefixes: [HP]
    annotations:
      annotators: sqlite:obo:hp
"#,
        );
        let resolved = SchemaAnnotationResolver::new().resolve(&s);
        assert_eq!(
            resolved.rules,
            vec![SchemaAnnotationRule {
                id_prefix: "HP".to_string(),
                preferred_ontology_id: "hp".to_string(),
            }]
        );
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn classes_missing_either_field_are_skipped() {
        let s = schema(
            r#"
classes:
  OnlyPrefixes:
    id_prefixes: [GO]
  OnlyAnnotators:
    annotations:
      annotators: ols:cl
  Neither:
    description: nothing here
"#,
        );
        let resolved = SchemaAnnotationResolver::new().resolve(&s);
        assert!(resolved.is_empty());
        assert!(resolved.warnings.is_empty());
    }

    #[test]
    fn unparseable_annotator_is_dropped_with_warning() {
        let s = schema(
            r#"
classes:
  Disease:
    id_prefixes: [MONDO, DOID]
    annotations:
      annotators: "sqlite:obo:mondo, not a reference"
"#,
        );
        let resolved = SchemaAnnotationResolver::new().resolve(&s);
        assert_eq!(resolved.rules.len(), 2);
        assert_eq!(resolved.ontology_ids(), vec!["mondo"]);
        assert_eq!(resolved.warnings.len(), 1);
        assert_eq!(resolved.warnings[0].class_name, "Disease");
        assert_eq!(resolved.warnings[0].annotator, "not a reference");
    }

    #[test]
    fn non_string_annotators_warn() {
        let s = schema(
            r#"
classes:
  Gene:
    id_prefixes: [HGNC]
    annotations:
      annotators: [ols:hgnc]
"#,
        );
        let resolved = SchemaAnnotationResolver::new().resolve(&s);
        assert!(resolved.is_empty());
        assert_eq!(resolved.warnings.len(), 1);
    }

    #[test]
    fn resolve_for_class_restricts_to_one_entity_type() {
        let s = schema(
            r#"
classes:
  Disease:
    id_prefixes: [MONDO]
    annotations:
      annotators: sqlite:obo:mondo
  Phenotype:
    id_prefixes: [HP]
    annotations:
      annotators: sqlite:obo:hp
"#,
        );
        let resolver = SchemaAnnotationResolver::new();
        assert_eq!(resolver.resolve(&s).ontology_ids(), vec!["mondo", "hp"]);

        let only = resolver.resolve_for_class(&s, "Phenotype").unwrap();
        assert_eq!(only.ontology_ids(), vec!["hp"]);
        assert_eq!(only.rules.len(), 1);
        assert_eq!(only.rules[0].id_prefix, "HP");

        assert!(resolver.resolve_for_class(&s, "Gene").is_err());
    }
}
