pub mod options;

pub use options::{RowMatrixOptions, TriangularityPolicy};
