//! Statistical testing for differential expression

mod fdr;
mod pvalue;
mod selection;
mod wald;

pub use fdr::benjamini_hochberg;
pub use pvalue::calculate_pvalue;
pub use selection::{select_differential, ContrastSelection, DiffExpSet, SelectionParams};
pub use wald::{wald_test, ContrastResults, Degeneracy, TestResults, TestRow};

use crate::cancel::CancelToken;
use crate::data::DgeDataSet;
use crate::error::Result;
use crate::glm::{fit_glm, GlmFitParams};

/// Fit the GLM and run the Wald test for every non-reference level
pub fn results(dds: &DgeDataSet, params: &GlmFitParams, cancel: &CancelToken) -> Result<TestResults> {
    let fit = fit_glm(dds, params, cancel)?;
    wald_test(dds, &fit)
}
