//! Reading inputs and writing result tables

mod input;
mod output;

pub use input::{read_count_matrix, read_design, read_expression_table, ExpressionTable};
pub use output::{
    write_clusters, write_enrichment, write_json, write_matrix, write_size_factors, write_test_results,
};
