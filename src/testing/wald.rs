//! Wald test for differential expression

use serde::{Deserialize, Serialize};

use super::fdr::benjamini_hochberg;
use super::pvalue::calculate_pvalue;
use crate::data::DgeDataSet;
use crate::error::{DgeError, Result};
use crate::glm::GlmFit;

/// Why a gene's statistics are missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Degeneracy {
    /// IRLS stopped without meeting the deviance criterion
    NonConvergence,
    /// The final dispersion estimate is NaN or infinite
    NonFiniteDispersion,
    /// The coefficient's standard error is NaN, infinite or zero
    DegenerateStandardError,
}

impl Degeneracy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Degeneracy::NonConvergence => "non_convergence",
            Degeneracy::NonFiniteDispersion => "non_finite_dispersion",
            Degeneracy::DegenerateStandardError => "degenerate_standard_error",
        }
    }
}

/// One gene's row in a contrast table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRow {
    pub gene_id: String,
    pub base_mean: f64,
    pub log2_fold_change: f64,
    pub lfc_se: f64,
    pub stat: Option<f64>,
    pub pvalue: Option<f64>,
    pub padj: Option<f64>,
    pub dispersion: f64,
    pub degeneracy: Option<Degeneracy>,
}

/// Results for one non-reference level against the reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContrastResults {
    pub level: String,
    pub reference: String,
    pub rows: Vec<TestRow>,
}

impl ContrastResults {
    /// Contrast label, e.g. `treated_vs_control`
    pub fn name(&self) -> String {
        format!("{}_vs_{}", self.level, self.reference)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_tested(&self) -> usize {
        self.rows.iter().filter(|r| r.pvalue.is_some()).count()
    }

    /// Number of genes with adjusted p-value at or below `alpha`
    pub fn n_significant(&self, alpha: f64) -> usize {
        self.rows.iter().filter(|r| r.padj.is_some_and(|p| p <= alpha)).count()
    }
}

/// One [`ContrastResults`] per non-reference level, in level order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResults {
    pub contrasts: Vec<ContrastResults>,
}

impl TestResults {
    pub fn contrast(&self, level: &str) -> Option<&ContrastResults> {
        self.contrasts.iter().find(|c| c.level == level)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContrastResults> {
        self.contrasts.iter()
    }

    pub fn n_genes(&self) -> usize {
        self.contrasts.first().map_or(0, |c| c.len())
    }
}

/// Wald test of every non-reference coefficient.
/// Benjamini-Hochberg correction is applied separately within each contrast.
pub fn wald_test(dds: &DgeDataSet, fit: &GlmFit) -> Result<TestResults> {
    let dispersions = dds.dispersions().ok_or_else(|| DgeError::InvalidInput {
        reason: "dispersions must be estimated before testing".to_string(),
    })?;

    let n_genes = dds.n_genes();
    if fit.n_genes() != n_genes {
        return Err(DgeError::DimensionMismatch {
            expected: format!("{} fitted genes", n_genes),
            got: format!("{} fitted genes", fit.n_genes()),
        });
    }

    let ln2 = std::f64::consts::LN_2;
    let gene_ids = dds.gene_ids();
    let reference = dds.design().reference().to_string();

    let mut contrasts = Vec::new();
    for (offset, level) in dds.design().non_reference_levels().iter().enumerate() {
        let coef_idx = offset + 1;

        let mut rows: Vec<TestRow> = (0..n_genes)
            .map(|i| {
                let beta = fit.coefficients[[i, coef_idx]];
                let se = fit.standard_errors[[i, coef_idx]];
                let dispersion = dispersions.final_dispersions[i];

                let degeneracy = if !dispersion.is_finite() {
                    Some(Degeneracy::NonFiniteDispersion)
                } else if !fit.converged[i] {
                    Some(Degeneracy::NonConvergence)
                } else if !(se.is_finite() && se > 0.0) {
                    Some(Degeneracy::DegenerateStandardError)
                } else {
                    None
                };

                let (stat, pvalue) = match degeneracy {
                    None => {
                        let z = beta / se;
                        (Some(z), calculate_pvalue(z))
                    }
                    Some(_) => (None, None),
                };

                TestRow {
                    gene_id: gene_ids[i].clone(),
                    base_mean: dispersions.base_means[i],
                    log2_fold_change: beta / ln2,
                    lfc_se: se / ln2,
                    stat,
                    pvalue,
                    padj: None,
                    dispersion,
                    degeneracy,
                }
            })
            .collect();

        let pvalues: Vec<Option<f64>> = rows.iter().map(|r| r.pvalue).collect();
        for (row, padj) in rows.iter_mut().zip(benjamini_hochberg(&pvalues)) {
            row.padj = padj;
        }

        let contrast = ContrastResults {
            level: level.clone(),
            reference: reference.clone(),
            rows,
        };
        log::info!(
            "Wald test {}: {} of {} genes tested",
            contrast.name(),
            contrast.n_tested(),
            contrast.len()
        );
        contrasts.push(contrast);
    }

    Ok(TestResults { contrasts })
}
