//! Ontology catalog: the fixed universe of ontologies a request may rank.

use crate::OntologyDescriptor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("ontology `{0}` not found in catalog")]
    NotFound(String),
    #[error("duplicate ontology id `{0}` in catalog")]
    Duplicate(String),
    #[error("ontology catalog is empty")]
    Empty,
    #[error("failed to read catalog `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Read-only registry of known ontologies, in declaration order.
///
/// Ids are matched case-insensitively; declaration order is the fallback
/// ranking order when the ranker output is unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OntologyCatalog {
    entries: Vec<OntologyDescriptor>,
}

#[derive(Debug, Deserialize, Serialize)]
struct CatalogFile {
    ontologies: Vec<OntologyDescriptor>,
}

impl OntologyCatalog {
    pub fn new(entries: Vec<OntologyDescriptor>) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i]
                .iter()
                .any(|prev| prev.id.eq_ignore_ascii_case(&entry.id))
            {
                return Err(CatalogError::Duplicate(entry.id.clone()));
            }
        }
        Ok(Self { entries })
    }

    /// The OBO Foundry ontologies commonly used for biomedical grounding.
    pub fn obo_default() -> Self {
        let entries = [
            ("mondo", "Mondo Disease Ontology", "Use for human disease-related queries"),
            ("doid", "Human Disease Ontology", "Use for human disease classification queries"),
            ("hp", "Human Phenotype Ontology", "Use for human phenotype-related queries"),
            ("mp", "Mammalian Phenotype Ontology", "Use for mammalian phenotype-related queries"),
            ("go", "Gene Ontology", "Use for gene function and biological process queries"),
            ("uberon", "Uberon multi-species anatomy ontology", "Use for anatomical structure queries"),
            ("cl", "Cell Ontology", "Use for cell type and lineage queries"),
            ("chebi", "Chemical Entities of Biological Interest", "Use for chemical and molecular queries"),
            ("pr", "Protein Ontology", "Use for protein-related queries"),
            ("so", "Sequence Ontology", "Use for sequence-related queries"),
            ("pato", "Phenotype And Trait Ontology", "Use for phenotype and trait-related queries"),
            ("maxo", "Medical Action Ontology", "Use for medical action-related queries"),
        ];
        Self {
            entries: entries
                .iter()
                .map(|(id, title, hint)| OntologyDescriptor::new(id, title, hint))
                .collect(),
        }
    }

    /// Load a catalog file of the form `ontologies: [{id, title, scope_hint}]`.
    pub fn from_yaml_str(text: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(text)?;
        Self::new(file.ontologies)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn all(&self) -> &[OntologyDescriptor] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Result<&OntologyDescriptor, CatalogError> {
        self.position(id)
            .map(|i| &self.entries[i])
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Declaration index of `id`.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.id.eq_ignore_ascii_case(id))
    }

    /// The named ontologies that exist in the catalog, in declaration order.
    pub fn select<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Vec<OntologyDescriptor> {
        let wanted: Vec<usize> = ids.into_iter().filter_map(|id| self.position(id)).collect();
        self.entries
            .iter()
            .enumerate()
            .filter(|(i, _)| wanted.contains(i))
            .map(|(_, e)| e.clone())
            .collect()
    }
}
