//! Data structures for differential expression analysis

mod count_matrix;
mod dataset;
mod design;

pub use count_matrix::CountMatrix;
pub use dataset::DgeDataSet;
pub use design::DesignTable;
