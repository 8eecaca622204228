//! Selection of the differentially expressed gene set

use serde::{Deserialize, Serialize};

use super::wald::{TestResults, TestRow};

/// Thresholds for calling a gene differentially expressed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionParams {
    /// Maximum adjusted p-value (inclusive)
    pub alpha: f64,
    /// Minimum absolute log2 fold change (exclusive)
    pub lfc_threshold: f64,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            lfc_threshold: 1.0,
        }
    }
}

impl SelectionParams {
    pub fn passes(&self, row: &TestRow) -> bool {
        row.padj.is_some_and(|p| p <= self.alpha) && row.log2_fold_change.abs() > self.lfc_threshold
    }
}

/// Genes passing the thresholds in one contrast, split by direction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContrastSelection {
    pub contrast: String,
    pub up: Vec<String>,
    pub down: Vec<String>,
}

/// Union of the per-contrast selections in original gene order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffExpSet {
    pub genes: Vec<String>,
    pub per_contrast: Vec<ContrastSelection>,
}

impl DiffExpSet {
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn contains(&self, gene_id: &str) -> bool {
        self.genes.iter().any(|g| g == gene_id)
    }
}

/// Select genes whose adjusted p-value and fold change pass in at least one contrast
pub fn select_differential(results: &TestResults, params: &SelectionParams) -> DiffExpSet {
    let n_genes = results.n_genes();
    let mut selected = vec![false; n_genes];
    let mut per_contrast = Vec::with_capacity(results.contrasts.len());

    for contrast in results.iter() {
        let mut selection = ContrastSelection {
            contrast: contrast.name(),
            ..Default::default()
        };
        for (i, row) in contrast.rows.iter().enumerate() {
            if !params.passes(row) {
                continue;
            }
            selected[i] = true;
            if row.log2_fold_change > 0.0 {
                selection.up.push(row.gene_id.clone());
            } else {
                selection.down.push(row.gene_id.clone());
            }
        }
        log::info!(
            "{}: {} up, {} down (padj <= {}, |log2FC| > {})",
            selection.contrast,
            selection.up.len(),
            selection.down.len(),
            params.alpha,
            params.lfc_threshold
        );
        per_contrast.push(selection);
    }

    let genes: Vec<String> = match results.contrasts.first() {
        Some(first) => first
            .rows
            .iter()
            .zip(&selected)
            .filter(|(_, &s)| s)
            .map(|(row, _)| row.gene_id.clone())
            .collect(),
        None => Vec::new(),
    };

    log::info!("Differentially expressed set: {} genes", genes.len());
    DiffExpSet { genes, per_contrast }
}
