//! DgeDataSet - count data, design, and the per-stage products of the pipeline

use ndarray::Array2;

use super::{CountMatrix, DesignTable};
use crate::dispersion::DispersionTable;
use crate::error::{DgeError, Result};
use crate::normalization::SizeFactors;

/// Main data structure for the analysis.
///
/// Stage products (size factors, dispersions) are stored wholesale; setting
/// new size factors invalidates the dispersions computed from the old ones.
#[derive(Debug, Clone)]
pub struct DgeDataSet {
    counts: CountMatrix,
    design: DesignTable,
    size_factors: Option<SizeFactors>,
    dispersions: Option<DispersionTable>,
}

impl DgeDataSet {
    /// Create a dataset, checking that every count-matrix sample has exactly
    /// one design entry. The design is reordered to the count-matrix sample order.
    pub fn new(counts: CountMatrix, design: DesignTable) -> Result<Self> {
        if counts.n_samples() != design.n_samples() {
            return Err(DgeError::InvalidDesign {
                reason: format!(
                    "count matrix has {} samples but design table has {}",
                    counts.n_samples(),
                    design.n_samples()
                ),
            });
        }

        let design = if counts.sample_ids() == design.sample_ids() {
            design
        } else {
            design.aligned_to(counts.sample_ids())?
        };

        for level in design.levels() {
            if design.samples_with_level(level).is_empty() {
                return Err(DgeError::InvalidDesign {
                    reason: format!("level '{}' has no samples", level),
                });
            }
        }

        let n_params = design.levels().len();
        if counts.n_samples() <= n_params {
            log::warn!(
                "{} samples for {} model parameters: no residual degrees of freedom for dispersion estimation",
                counts.n_samples(),
                n_params
            );
        }

        Ok(Self {
            counts,
            design,
            size_factors: None,
            dispersions: None,
        })
    }

    pub fn counts(&self) -> &CountMatrix {
        &self.counts
    }

    pub fn design(&self) -> &DesignTable {
        &self.design
    }

    pub fn n_genes(&self) -> usize {
        self.counts.n_genes()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.n_samples()
    }

    pub fn gene_ids(&self) -> &[String] {
        self.counts.gene_ids()
    }

    pub fn has_size_factors(&self) -> bool {
        self.size_factors.is_some()
    }

    pub fn size_factors(&self) -> Option<&SizeFactors> {
        self.size_factors.as_ref()
    }

    pub fn set_size_factors(&mut self, size_factors: SizeFactors) -> Result<()> {
        if size_factors.len() != self.n_samples() {
            return Err(DgeError::DimensionMismatch {
                expected: format!("{} size factors", self.n_samples()),
                got: format!("{} size factors", size_factors.len()),
            });
        }
        self.size_factors = Some(size_factors);
        self.dispersions = None;
        Ok(())
    }

    pub fn has_dispersions(&self) -> bool {
        self.dispersions.is_some()
    }

    pub fn dispersions(&self) -> Option<&DispersionTable> {
        self.dispersions.as_ref()
    }

    pub fn set_dispersions(&mut self, dispersions: DispersionTable) -> Result<()> {
        if dispersions.len() != self.n_genes() {
            return Err(DgeError::DimensionMismatch {
                expected: format!("{} dispersions", self.n_genes()),
                got: format!("{} dispersions", dispersions.len()),
            });
        }
        self.dispersions = Some(dispersions);
        Ok(())
    }

    /// Counts divided by each sample's size factor
    pub fn normalized_counts(&self) -> Option<Array2<f64>> {
        self.size_factors.as_ref().map(|sf| sf.normalize(self.counts.counts()))
    }

    /// Normalized counts restricted to the given gene ids, in the given order
    pub fn normalized_submatrix(&self, gene_ids: &[String]) -> Result<Array2<f64>> {
        let normalized = self.normalized_counts().ok_or_else(|| DgeError::InvalidInput {
            reason: "size factors must be estimated before extracting normalized counts".to_string(),
        })?;
        let indices = gene_ids
            .iter()
            .map(|id| {
                self.counts.gene_index(id).ok_or_else(|| DgeError::InvalidInput {
                    reason: format!("gene '{}' not in dataset", id),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(normalized.select(ndarray::Axis(0), &indices))
    }
}
