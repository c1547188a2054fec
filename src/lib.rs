//! distmat: distributed sparse row-matrix operators
//!
//! This crate turns any row-wise sparse storage into a distributed linear
//! operator: it reconciles row/column/domain/range maps into import and
//! export plans, derives nonzero counts, norms and triangularity, and
//! implements scaling, diagonal extraction and (transposed) multi-vector
//! products over MPI, in-process thread groups, or a single process.

pub mod parallel;

pub mod config;
pub mod core;
pub mod error;
pub mod map;
pub mod matrix;
pub mod utils;

// Re-exports for convenience
pub use config::*;
pub use self::core::*;
pub use error::*;
pub use map::*;
pub use matrix::*;
pub use utils::*;
