//! Core types: multi-vectors and the traits at the storage/operator seams.

pub mod multivector;
pub mod traits;

pub use multivector::MultiVector;
pub use traits::{EntryViewMut, LinearOperator, RowAccessor};
