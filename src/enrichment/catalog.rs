//! Functional annotation catalogs

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DgeError, Result};

/// Ontology branch a term belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OntologyBranch {
    #[default]
    BiologicalProcess,
    MolecularFunction,
    CellularComponent,
}

impl OntologyBranch {
    pub fn short_name(&self) -> &'static str {
        match self {
            OntologyBranch::BiologicalProcess => "BP",
            OntologyBranch::MolecularFunction => "MF",
            OntologyBranch::CellularComponent => "CC",
        }
    }
}

impl fmt::Display for OntologyBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for OntologyBranch {
    type Err = DgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "bp" | "biological_process" | "biologicalprocess" => Ok(OntologyBranch::BiologicalProcess),
            "mf" | "molecular_function" | "molecularfunction" => Ok(OntologyBranch::MolecularFunction),
            "cc" | "cellular_component" | "cellularcomponent" => Ok(OntologyBranch::CellularComponent),
            other => Err(DgeError::InvalidInput {
                reason: format!("unknown ontology branch '{}'", other),
            }),
        }
    }
}

/// A catalog term and its annotated genes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedTerm {
    pub id: String,
    pub description: String,
    pub genes: Vec<String>,
}

/// Source of term memberships for one ontology branch at a time
pub trait AnnotationCatalog: Send + Sync {
    fn terms(&self, branch: OntologyBranch) -> &[AnnotatedTerm];
}

/// Catalog held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    branches: HashMap<OntologyBranch, Vec<AnnotatedTerm>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a term; genes are appended when the term id already exists in the branch
    pub fn add_term(&mut self, branch: OntologyBranch, id: &str, description: &str, genes: &[&str]) {
        let terms = self.branches.entry(branch).or_default();
        let term = match terms.iter().position(|t| t.id == id) {
            Some(pos) => &mut terms[pos],
            None => {
                terms.push(AnnotatedTerm {
                    id: id.to_string(),
                    description: description.to_string(),
                    genes: Vec::new(),
                });
                let last = terms.len() - 1;
                &mut terms[last]
            }
        };
        for gene in genes {
            if !term.genes.iter().any(|g| g == gene) {
                term.genes.push(gene.to_string());
            }
        }
    }

    /// Load a tab-separated file with columns: branch, term id, description, gene.
    /// One row per (term, gene) pair; a header line is expected.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_path(path)?;

        let mut catalog = Self::new();
        // (branch, term id) -> position, so large files avoid a linear term search
        let mut index: HashMap<(OntologyBranch, String), usize> = HashMap::new();

        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let line = line + 2;
            if record.len() < 4 {
                return Err(DgeError::Parse {
                    line,
                    reason: format!("expected 4 columns, found {}", record.len()),
                });
            }
            let branch: OntologyBranch = record[0].parse().map_err(|e: DgeError| DgeError::Parse {
                line,
                reason: e.to_string(),
            })?;
            let term_id = record[1].trim();
            let gene = record[3].trim();
            if term_id.is_empty() || gene.is_empty() {
                return Err(DgeError::Parse {
                    line,
                    reason: "empty term id or gene".to_string(),
                });
            }

            let terms = catalog.branches.entry(branch).or_default();
            let pos = *index.entry((branch, term_id.to_string())).or_insert_with(|| {
                terms.push(AnnotatedTerm {
                    id: term_id.to_string(),
                    description: record[2].trim().to_string(),
                    genes: Vec::new(),
                });
                terms.len() - 1
            });
            let genes = &mut terms[pos].genes;
            if !genes.iter().any(|g| g == gene) {
                genes.push(gene.to_string());
            }
        }

        log::info!(
            "Loaded annotation catalog: {} BP, {} MF, {} CC terms",
            catalog.n_terms(OntologyBranch::BiologicalProcess),
            catalog.n_terms(OntologyBranch::MolecularFunction),
            catalog.n_terms(OntologyBranch::CellularComponent)
        );
        Ok(catalog)
    }

    pub fn n_terms(&self, branch: OntologyBranch) -> usize {
        self.terms(branch).len()
    }
}

impl AnnotationCatalog for InMemoryCatalog {
    fn terms(&self, branch: OntologyBranch) -> &[AnnotatedTerm] {
        self.branches.get(&branch).map(|t| t.as_slice()).unwrap_or(&[])
    }
}
