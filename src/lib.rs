//! rust_dge: differential expression, co-expression clustering and GO
//! over-representation for RNA-seq count data
//!
//! # Example
//!
//! ```ignore
//! use rust_dge::prelude::*;
//!
//! let counts = read_count_matrix("counts.tsv")?;
//! let design = read_design("design.tsv", counts.sample_ids(), Some("Control"))?;
//!
//! let output = run_pipeline(counts, design, &AnalysisConfig::default(), &CancelToken::new())?;
//! for contrast in output.results.iter() {
//!     println!("{}: {} significant", contrast.name(), contrast.n_significant(0.05));
//! }
//! ```

pub mod cancel;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod data;
pub mod dispersion;
pub mod enrichment;
pub mod error;
pub mod glm;
pub mod io;
pub mod normalization;
pub mod pca;
pub mod stats;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::cluster::{cluster_genes, ClusterAssignment, ClusterModel, ClusterParams};
    pub use crate::config::AnalysisConfig;
    pub use crate::data::{CountMatrix, DesignTable, DgeDataSet};
    pub use crate::dispersion::{estimate_dispersions, DispersionParams, DispersionTable, TrendFitMethod};
    pub use crate::enrichment::{
        enrich, AnnotationCatalog, EnrichmentParams, EnrichmentReport, GeneIdMapper, IdentityMapper,
        InMemoryCatalog, MappingTable, OntologyBranch,
    };
    pub use crate::error::{DgeError, Result};
    pub use crate::glm::{fit_glm, GlmFitParams};
    pub use crate::io::{read_count_matrix, read_design};
    pub use crate::normalization::{estimate_size_factors, SizeFactorParams, SizeFactors};
    pub use crate::pca::{pca, PcaParams, PcaResult};
    pub use crate::testing::{
        benjamini_hochberg, results, select_differential, wald_test, DiffExpSet, SelectionParams, TestResults,
    };
    pub use crate::{run_enrichment, run_pipeline, PipelineOutput};
}

use ndarray::Array2;
use serde::Serialize;

use prelude::*;

/// Everything a full run produces
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    /// Dataset after the count floor, carrying size factors and dispersions
    #[serde(skip)]
    pub dataset: DgeDataSet,
    /// Genes removed by the count floor
    pub n_filtered: usize,
    pub results: TestResults,
    pub diff_exp: DiffExpSet,
    /// Normalized counts of the differential genes (genes x samples)
    pub normalized_submatrix: Array2<f64>,
    /// None when fewer than two differential genes were found
    pub clusters: Option<ClusterAssignment>,
    /// None when the differential genes carry no variance to project
    pub pca: Option<PcaResult>,
    /// Genes passing the count floor; the enrichment universe
    pub universe: Vec<String>,
}

/// Stage outcomes that only mean "nothing to do here" become None
fn optional_stage<T>(outcome: Result<T>) -> Result<Option<T>> {
    match outcome {
        Ok(value) => Ok(Some(value)),
        Err(DgeError::InsufficientData { stage, reason }) => {
            log::warn!("Skipping {}: {}", stage, reason);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Run count floor, normalization, dispersion estimation, testing,
/// selection, PCA and clustering
pub fn run_pipeline(
    counts: CountMatrix,
    design: DesignTable,
    config: &AnalysisConfig,
    cancel: &CancelToken,
) -> Result<PipelineOutput> {
    config.validate()?;

    let design = match config.reference_level.as_deref() {
        Some(level) if level != design.reference() => {
            DesignTable::new(design.sample_ids().to_vec(), design.conditions().to_vec(), Some(level))?
        }
        _ => design,
    };

    let (counts, n_filtered) = counts.filter_by_total(config.min_total_count)?;
    log::info!(
        "Count floor: kept {} genes, removed {} with total count <= {}",
        counts.n_genes(),
        n_filtered,
        config.min_total_count
    );
    let universe = counts.gene_ids().to_vec();

    let mut dds = DgeDataSet::new(counts, design)?;
    log::info!(
        "Design: {} samples, reference '{}', levels {:?}",
        dds.n_samples(),
        dds.design().reference(),
        dds.design().levels()
    );

    estimate_size_factors(&mut dds, &config.size_factors)?;
    cancel.check("normalization")?;
    estimate_dispersions(&mut dds, &config.dispersion, cancel)?;

    let test_results = results(&dds, &config.glm, cancel)?;
    let diff_exp = select_differential(&test_results, &config.selection);
    let normalized_submatrix = dds.normalized_submatrix(&diff_exp.genes)?;

    let sample_ids = dds.counts().sample_ids().to_vec();
    let pca_result = optional_stage(pca(normalized_submatrix.view(), &sample_ids, &config.pca))?;
    let clusters = optional_stage(cluster_genes(
        normalized_submatrix.view(),
        &diff_exp.genes,
        &config.cluster,
        cancel,
    ))?;

    Ok(PipelineOutput {
        dataset: dds,
        n_filtered,
        results: test_results,
        diff_exp,
        normalized_submatrix,
        clusters,
        pca: pca_result,
        universe,
    })
}

/// Over-representation of the differential set against the floor-passing universe
pub fn run_enrichment(
    output: &PipelineOutput,
    mapper: &dyn GeneIdMapper,
    catalog: &dyn AnnotationCatalog,
    params: &EnrichmentParams,
) -> Result<EnrichmentReport> {
    enrich(&output.diff_exp.genes, &output.universe, mapper, catalog, params)
}
