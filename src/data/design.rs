//! Sample-to-condition design table for a single categorical factor

use std::collections::HashMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{DgeError, Result};

/// One categorical `condition` per sample with a designated reference level.
///
/// Levels are kept in a fixed order: the reference first, then the remaining
/// levels in order of first appearance. That order defines the columns of the
/// model matrix and the order of the per-contrast result tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignTable {
    sample_ids: Vec<String>,
    conditions: Vec<String>,
    levels: Vec<String>,
}

impl DesignTable {
    /// Build a design table from parallel sample/condition lists.
    ///
    /// With `reference == None` the first observed level is the reference.
    pub fn new(sample_ids: Vec<String>, conditions: Vec<String>, reference: Option<&str>) -> Result<Self> {
        if sample_ids.len() != conditions.len() {
            return Err(DgeError::DimensionMismatch {
                expected: format!("{} conditions", sample_ids.len()),
                got: format!("{} conditions", conditions.len()),
            });
        }
        if sample_ids.is_empty() {
            return Err(DgeError::InvalidDesign {
                reason: "design table has no samples".to_string(),
            });
        }

        let mut seen = HashMap::new();
        for (i, id) in sample_ids.iter().enumerate() {
            if let Some(prev) = seen.insert(id.as_str(), i) {
                return Err(DgeError::InvalidDesign {
                    reason: format!("sample '{}' listed twice (rows {} and {})", id, prev + 1, i + 1),
                });
            }
        }

        let mut observed: Vec<String> = Vec::new();
        for c in &conditions {
            if c.is_empty() {
                return Err(DgeError::InvalidDesign {
                    reason: "empty condition value".to_string(),
                });
            }
            if !observed.contains(c) {
                observed.push(c.clone());
            }
        }

        let reference = match reference {
            Some(r) => {
                if !observed.iter().any(|l| l == r) {
                    return Err(DgeError::InvalidDesign {
                        reason: format!("reference level '{}' not among observed levels {:?}", r, observed),
                    });
                }
                r.to_string()
            }
            None => observed[0].clone(),
        };

        if observed.len() < 2 {
            return Err(DgeError::InvalidDesign {
                reason: format!("condition has a single level ('{}'); at least two are required", reference),
            });
        }

        let mut levels = vec![reference.clone()];
        levels.extend(observed.into_iter().filter(|l| *l != reference));

        Ok(Self {
            sample_ids,
            conditions,
            levels,
        })
    }

    /// Build from an explicit sample -> condition mapping, ordered by `sample_order`
    pub fn from_mapping(
        mapping: &HashMap<String, String>,
        sample_order: &[String],
        reference: Option<&str>,
    ) -> Result<Self> {
        let conditions = sample_order
            .iter()
            .map(|s| {
                mapping.get(s).cloned().ok_or_else(|| DgeError::InvalidDesign {
                    reason: format!("sample '{}' has no condition assignment", s),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if mapping.len() != sample_order.len() {
            return Err(DgeError::InvalidDesign {
                reason: format!(
                    "design lists {} samples but the count matrix has {}",
                    mapping.len(),
                    sample_order.len()
                ),
            });
        }
        Self::new(sample_order.to_vec(), conditions, reference)
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    /// All levels, reference first
    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn reference(&self) -> &str {
        &self.levels[0]
    }

    /// Levels tested against the reference
    pub fn non_reference_levels(&self) -> &[String] {
        &self.levels[1..]
    }

    /// Index of a level in `levels()`
    pub fn level_index(&self, level: &str) -> Option<usize> {
        self.levels.iter().position(|l| l == level)
    }

    /// Sample indices carrying a given level
    pub fn samples_with_level(&self, level: &str) -> Vec<usize> {
        self.conditions
            .iter()
            .enumerate()
            .filter(|(_, c)| c.as_str() == level)
            .map(|(i, _)| i)
            .collect()
    }

    /// Reorder to match the sample order of a count matrix
    pub fn aligned_to(&self, sample_order: &[String]) -> Result<Self> {
        if sample_order.len() != self.sample_ids.len() {
            return Err(DgeError::DimensionMismatch {
                expected: format!("{} samples in design", sample_order.len()),
                got: format!("{} samples in design", self.sample_ids.len()),
            });
        }
        let mapping: HashMap<String, String> = self
            .sample_ids
            .iter()
            .cloned()
            .zip(self.conditions.iter().cloned())
            .collect();
        Self::from_mapping(&mapping, sample_order, Some(self.reference()))
    }

    /// Treatment-coded model matrix: intercept + one indicator per non-reference level
    pub fn model_matrix(&self) -> Array2<f64> {
        let n = self.n_samples();
        let p = self.levels.len();
        let mut design = Array2::zeros((n, p));
        for (i, cond) in self.conditions.iter().enumerate() {
            design[[i, 0]] = 1.0;
            if let Some(l) = self.level_index(cond) {
                if l > 0 {
                    design[[i, l]] = 1.0;
                }
            }
        }
        design
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_levels_reference_first() {
        let design = DesignTable::new(
            strings(&["s1", "s2", "s3", "s4"]),
            strings(&["treated", "control", "treated", "control"]),
            Some("control"),
        )
        .unwrap();
        assert_eq!(design.levels(), &strings(&["control", "treated"])[..]);
        assert_eq!(design.samples_with_level("control"), vec![1, 3]);
    }

    #[test]
    fn test_missing_reference_rejected() {
        let result = DesignTable::new(strings(&["s1", "s2"]), strings(&["a", "b"]), Some("c"));
        assert!(matches!(result, Err(DgeError::InvalidDesign { .. })));
    }

    #[test]
    fn test_single_level_rejected() {
        let result = DesignTable::new(strings(&["s1", "s2"]), strings(&["a", "a"]), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_model_matrix_three_levels() {
        let design = DesignTable::new(
            strings(&["s1", "s2", "s3"]),
            strings(&["ctl", "A", "B"]),
            Some("ctl"),
        )
        .unwrap();
        let x = design.model_matrix();
        assert_eq!(x.dim(), (3, 3));
        assert_eq!(x.row(0).to_vec(), vec![1.0, 0.0, 0.0]);
        assert_eq!(x.row(1).to_vec(), vec![1.0, 1.0, 0.0]);
        assert_eq!(x.row(2).to_vec(), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_aligned_to_reorders() {
        let design = DesignTable::new(strings(&["s1", "s2"]), strings(&["a", "b"]), Some("a")).unwrap();
        let aligned = design.aligned_to(&strings(&["s2", "s1"])).unwrap();
        assert_eq!(aligned.conditions(), &strings(&["b", "a"])[..]);
        assert_eq!(aligned.reference(), "a");
    }
}
