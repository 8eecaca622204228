//! GLM fitting using Iteratively Reweighted Least Squares (IRLS)

use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::negative_binomial::{nb_log_likelihood, nb_mean, nb_weight, MAX_BETA, MIN_MU};
use crate::cancel::CancelToken;
use crate::data::DgeDataSet;
use crate::error::{DgeError, Result};

/// Small ridge added to the diagonal of X'WX
const RIDGE: f64 = 1e-6 / (std::f64::consts::LN_2 * std::f64::consts::LN_2);

/// Configurable parameters for GLM fitting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlmFitParams {
    /// Maximum IRLS iterations
    pub maxit: usize,
    /// Relative deviance change that counts as converged
    pub beta_tol: f64,
}

impl Default for GlmFitParams {
    fn default() -> Self {
        Self {
            maxit: 100,
            beta_tol: 1e-8,
        }
    }
}

/// Fit of one gene: natural-log coefficients and their standard errors
#[derive(Debug, Clone)]
pub struct GeneFit {
    pub coefficients: Vec<f64>,
    pub standard_errors: Vec<f64>,
    pub converged: bool,
    pub iterations: usize,
    pub deviance: f64,
}

/// Coefficients and standard errors for every gene, rows in gene order
#[derive(Debug, Clone)]
pub struct GlmFit {
    /// `Intercept` followed by one `<level>_vs_<reference>` per non-reference level
    pub coef_names: Vec<String>,
    pub coefficients: Array2<f64>,
    pub standard_errors: Array2<f64>,
    pub converged: Vec<bool>,
    pub deviance: Array1<f64>,
}

impl GlmFit {
    pub fn n_genes(&self) -> usize {
        self.coefficients.nrows()
    }

    pub fn n_not_converged(&self) -> usize {
        self.converged.iter().filter(|&&c| !c).count()
    }
}

/// Fit the NB GLM (intercept + one indicator per non-reference level) to every gene
pub fn fit_glm(dds: &DgeDataSet, params: &GlmFitParams, cancel: &CancelToken) -> Result<GlmFit> {
    let size_factors = dds.size_factors().ok_or_else(|| DgeError::InvalidInput {
        reason: "size factors must be estimated before fitting the GLM".to_string(),
    })?;
    let dispersions = dds.dispersions().ok_or_else(|| DgeError::InvalidInput {
        reason: "dispersions must be estimated before fitting the GLM".to_string(),
    })?;

    let design = dds.design().model_matrix();
    let n_coefs = design.ncols();

    for j in 0..n_coefs {
        if design.column(j).iter().all(|&x| x == 0.0) {
            return Err(DgeError::InvalidDesign {
                reason: format!("model matrix column {} is all zeros", j),
            });
        }
    }

    let reference = dds.design().reference();
    let mut coef_names = vec!["Intercept".to_string()];
    coef_names.extend(
        dds.design()
            .non_reference_levels()
            .iter()
            .map(|level| format!("{}_vs_{}", level, reference)),
    );

    let counts = dds.counts().counts();
    let sf = size_factors.as_slice();
    let n_genes = dds.n_genes();

    log::info!("Fitting NB GLM for {} genes ({} coefficients)", n_genes, n_coefs);

    let fits: Vec<GeneFit> = (0..n_genes)
        .into_par_iter()
        .map(|i| {
            cancel.check("testing")?;
            let row = counts.row(i).to_vec();
            let alpha = dispersions.final_dispersions[i];
            Ok(fit_single_gene(&row, &design, sf, alpha, params))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut coefficients = Array2::zeros((n_genes, n_coefs));
    let mut standard_errors = Array2::zeros((n_genes, n_coefs));
    let mut converged = Vec::with_capacity(n_genes);
    let mut deviance = Array1::zeros(n_genes);

    for (i, fit) in fits.into_iter().enumerate() {
        for j in 0..n_coefs {
            coefficients[[i, j]] = fit.coefficients[j];
            standard_errors[[i, j]] = fit.standard_errors[j];
        }
        converged.push(fit.converged);
        deviance[i] = fit.deviance;
    }

    let result = GlmFit {
        coef_names,
        coefficients,
        standard_errors,
        converged,
        deviance,
    };
    if result.n_not_converged() > 0 {
        log::warn!("{} genes did not converge in IRLS", result.n_not_converged());
    }
    Ok(result)
}

/// Fit one gene by IRLS with a fixed dispersion `alpha`
pub fn fit_single_gene(
    counts: &[f64],
    design: &Array2<f64>,
    size_factors: &[f64],
    alpha: f64,
    params: &GlmFitParams,
) -> GeneFit {
    let n_samples = counts.len();
    let n_coefs = design.ncols();

    if !(alpha.is_finite() && alpha > 0.0) {
        return GeneFit {
            coefficients: vec![f64::NAN; n_coefs],
            standard_errors: vec![f64::NAN; n_coefs],
            converged: false,
            iterations: 0,
            deviance: f64::NAN,
        };
    }

    // Start from least squares on log(normalized + 0.1)
    let log_counts: Vec<f64> = counts
        .iter()
        .zip(size_factors)
        .map(|(&c, &s)| (c / s + 0.1).ln())
        .collect();
    let ones = vec![1.0; n_samples];
    let xtx = cross_product(design, &ones);
    let xty = weighted_response(design, &ones, &log_counts);
    let mut beta = solve_symmetric_system(&xtx, &xty, n_coefs);

    if beta.iter().any(|b| !b.is_finite()) {
        let mean_count = counts.iter().zip(size_factors).map(|(&c, &s)| c / s).sum::<f64>() / n_samples as f64;
        beta = vec![0.0; n_coefs];
        beta[0] = mean_count.max(0.1).ln();
    }

    let linear_predictor = |beta: &[f64], i: usize| -> f64 { (0..n_coefs).map(|j| design[[i, j]] * beta[j]).sum() };

    let mut converged = false;
    let mut iterations = 0;
    let mut dev_old = 0.0;
    let mut dev = f64::NAN;
    let mut weights = vec![0.0; n_samples];
    let mut working_response = vec![0.0; n_samples];

    for iter in 0..params.maxit {
        iterations = iter + 1;
        for i in 0..n_samples {
            let mu = nb_mean(linear_predictor(&beta, i), size_factors[i]).max(MIN_MU);
            weights[i] = nb_weight(mu, alpha);
            working_response[i] = (mu / size_factors[i]).ln() + (counts[i] - mu) / mu;
        }

        let mut xtwx = cross_product(design, &weights);
        for j in 0..n_coefs {
            xtwx[j * n_coefs + j] += RIDGE;
        }
        let xtwz = weighted_response(design, &weights, &working_response);
        beta = solve_symmetric_system(&xtwx, &xtwz, n_coefs);

        if beta.iter().any(|b| !b.is_finite() || b.abs() > MAX_BETA) {
            break;
        }

        dev = (0..n_samples)
            .map(|i| {
                let mu = nb_mean(linear_predictor(&beta, i), size_factors[i]).max(MIN_MU);
                -2.0 * nb_log_likelihood(counts[i], mu, alpha)
            })
            .sum();

        let conv_test = (dev - dev_old).abs() / (dev.abs() + 0.1);
        if conv_test.is_nan() {
            break;
        }
        if iter > 0 && conv_test < params.beta_tol {
            converged = true;
            break;
        }
        dev_old = dev;
    }

    for i in 0..n_samples {
        let mu = nb_mean(linear_predictor(&beta, i), size_factors[i]).max(MIN_MU);
        weights[i] = nb_weight(mu, alpha);
    }
    let standard_errors = standard_errors(design, &weights);

    GeneFit {
        coefficients: beta,
        standard_errors,
        converged,
        iterations,
        deviance: dev,
    }
}

/// X'WX as a flat row-major matrix
fn cross_product(design: &Array2<f64>, weights: &[f64]) -> Vec<f64> {
    let n_coefs = design.ncols();
    let mut xtwx = vec![0.0; n_coefs * n_coefs];
    for (i, &w) in weights.iter().enumerate() {
        for j in 0..n_coefs {
            for k in 0..n_coefs {
                xtwx[j * n_coefs + k] += w * design[[i, j]] * design[[i, k]];
            }
        }
    }
    xtwx
}

/// X'Wz
fn weighted_response(design: &Array2<f64>, weights: &[f64], response: &[f64]) -> Vec<f64> {
    let n_coefs = design.ncols();
    let mut xtwz = vec![0.0; n_coefs];
    for (i, (&w, &z)) in weights.iter().zip(response).enumerate() {
        for j in 0..n_coefs {
            xtwz[j] += w * design[[i, j]] * z;
        }
    }
    xtwz
}

/// Solve a symmetric positive definite system by Cholesky decomposition
pub(crate) fn solve_symmetric_system(a: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut l = vec![0.0; n * n];

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                // Not positive definite: keep the factorization finite
                if sum <= 0.0 {
                    sum = 1e-12;
                }
                l[i * n + j] = sum.sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }

    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * n + j] * y[j];
        }
        y[i] = sum / l[i * n + i];
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j * n + i] * x[j];
        }
        x[i] = sum / l[i * n + i];
    }
    x
}

fn invert_symmetric_matrix(a: &[f64], n: usize) -> Vec<f64> {
    let mut result = vec![0.0; n * n];
    for i in 0..n {
        let mut e = vec![0.0; n];
        e[i] = 1.0;
        let col = solve_symmetric_system(a, &e, n);
        for j in 0..n {
            result[j * n + i] = col[j];
        }
    }
    result
}

/// Standard errors from the ridge-sandwich covariance
/// (X'WX + R)^-1 X'WX (X'WX + R)^-1
fn standard_errors(design: &Array2<f64>, weights: &[f64]) -> Vec<f64> {
    let n = design.ncols();
    let xtwx = cross_product(design, weights);
    let mut ridged = xtwx.clone();
    for j in 0..n {
        ridged[j * n + j] += RIDGE;
    }
    let inv = invert_symmetric_matrix(&ridged, n);

    let mut temp = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                temp[i * n + j] += inv[i * n + k] * xtwx[k * n + j];
            }
        }
    }

    (0..n)
        .map(|i| {
            let var: f64 = (0..n).map(|k| temp[i * n + k] * inv[k * n + i]).sum();
            if var > 0.0 {
                var.sqrt()
            } else {
                f64::NAN
            }
        })
        .collect()
}
