//! Generalized Linear Model fitting for negative binomial data

mod fitting;
mod negative_binomial;

pub use fitting::{fit_glm, fit_single_gene, GeneFit, GlmFit, GlmFitParams};
pub use negative_binomial::{nb_log_likelihood, nb_mean, nb_weight, MAX_BETA, MIN_MU};
