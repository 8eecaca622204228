//! Analysis configuration
//!
//! Every stage takes its own parameter struct; `AnalysisConfig` groups them
//! so a whole run can be described by one JSON file. Missing fields take
//! their defaults.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterParams;
use crate::dispersion::DispersionParams;
use crate::enrichment::EnrichmentParams;
use crate::error::{DgeError, Result};
use crate::glm::GlmFitParams;
use crate::normalization::SizeFactorParams;
use crate::pca::PcaParams;
use crate::testing::SelectionParams;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Genes with total count at or below this are dropped before normalization
    pub min_total_count: f64,
    /// Reference condition; the first observed level when unset
    pub reference_level: Option<String>,
    pub size_factors: SizeFactorParams,
    pub dispersion: DispersionParams,
    pub glm: GlmFitParams,
    pub selection: SelectionParams,
    pub cluster: ClusterParams,
    pub enrichment: EnrichmentParams,
    pub pca: PcaParams,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_total_count: 10.0,
            reference_level: None,
            size_factors: SizeFactorParams::default(),
            dispersion: DispersionParams::default(),
            glm: GlmFitParams::default(),
            selection: SelectionParams::default(),
            cluster: ClusterParams::default(),
            enrichment: EnrichmentParams::default(),
            pca: PcaParams::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no stage can run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(DgeError::InvalidInput { reason });
        if !(self.min_total_count >= 0.0) {
            return invalid(format!("min_total_count must be >= 0, got {}", self.min_total_count));
        }
        if !(self.selection.alpha > 0.0 && self.selection.alpha <= 1.0) {
            return invalid(format!("selection alpha must lie in (0, 1], got {}", self.selection.alpha));
        }
        if !(self.selection.lfc_threshold >= 0.0) {
            return invalid(format!(
                "lfc_threshold must be >= 0, got {}",
                self.selection.lfc_threshold
            ));
        }
        if self.cluster.max_k < 2 || self.cluster.min_k > self.cluster.max_k {
            return invalid(format!(
                "cluster range {}..={} is empty",
                self.cluster.min_k, self.cluster.max_k
            ));
        }
        if !(self.dispersion.min_disp > 0.0) {
            return invalid(format!("min_disp must be > 0, got {}", self.dispersion.min_disp));
        }
        if self.pca.n_components == 0 {
            return invalid("pca n_components must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispersion::TrendFitMethod;
    use crate::enrichment::OntologyBranch;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.min_total_count, 10.0);
        assert_eq!(config.selection.alpha, 0.05);
        assert_eq!(config.selection.lfc_threshold, 1.0);
        assert_eq!(config.cluster.max_k, 20);
        assert_eq!(config.enrichment.pvalue_cutoff, 0.001);
        assert_eq!(config.pca.n_components, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"reference_level": "Control", "selection": {{"alpha": 0.1}},
                "dispersion": {{"trend": "mean"}}, "enrichment": {{"branch": "MolecularFunction"}}}}"#
        )
        .unwrap();

        let config = AnalysisConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.reference_level.as_deref(), Some("Control"));
        assert_eq!(config.selection.alpha, 0.1);
        assert_eq!(config.selection.lfc_threshold, 1.0);
        assert_eq!(config.dispersion.trend, TrendFitMethod::Mean);
        assert_eq!(config.enrichment.branch, OntologyBranch::MolecularFunction);
        assert_eq!(config.min_total_count, 10.0);
    }

    #[test]
    fn test_invalid_cluster_range_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"cluster": {{"min_k": 5, "max_k": 3}}}}"#).unwrap();
        assert!(matches!(
            AnalysisConfig::from_json_file(file.path()),
            Err(DgeError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_malformed_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{ not json").unwrap();
        assert!(matches!(
            AnalysisConfig::from_json_file(file.path()),
            Err(DgeError::JsonError(_))
        ));
    }
}
