//! Normalization of RNA-seq count data

mod size_factors;

pub use size_factors::{estimate_size_factors, median_of_ratios, SizeFactorParams, SizeFactors};
