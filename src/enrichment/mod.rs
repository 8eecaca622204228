//! Functional enrichment of gene sets against an annotation catalog

mod catalog;
mod hypergeometric;
mod mapping;

pub use catalog::{AnnotatedTerm, AnnotationCatalog, InMemoryCatalog, OntologyBranch};
pub use hypergeometric::{enrich, hypergeometric_pvalue, EnrichmentParams, EnrichmentReport, EnrichmentResult};
pub use mapping::{GeneIdMapper, IdentityMapper, MappingTable};
