//! Matrix module: the generic distributed row-matrix operator and a CSR
//! storage adapter for it.

pub mod row_matrix;
pub use row_matrix::{BasicRowMatrix, MatrixProperties, SumStatus};
pub mod sparse;
pub use sparse::CsrMatrix;
