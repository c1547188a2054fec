use thiserror::Error;

// Unified error type for distmat

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatError {
    #[error("map mismatch in {operation}: vector map is not an accepted distribution")]
    MapMismatch { operation: &'static str },
    #[error("multi-vector count mismatch: x has {x} vectors, y has {y}")]
    VectorCountMismatch { x: usize, y: usize },
    #[error("local length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("local row {row} out of range (rows = {num_rows})")]
    RowOutOfRange { row: usize, num_rows: usize },
    #[error("row buffer too small: need {required}, got {provided}")]
    InsufficientBuffer { required: usize, provided: usize },
    #[error("local nonzero {index} out of range (nonzeros = {num_entries})")]
    EntryOutOfRange { index: usize, num_entries: usize },
    #[error("local column {column} out of range (columns = {num_cols})")]
    ColumnOutOfRange { column: usize, num_cols: usize },
    #[error("global index {0} is not owned by any rank of the source map")]
    MissingGlobalIndex(i64),
    #[error("global index {0} listed more than once on this rank")]
    DuplicateGlobalIndex(i64),
    #[error("structure constants have not been computed")]
    StructureNotComputed,
    #[error("stale structure constants: {computed} nonzeros counted, {stored} stored")]
    StaleStructure { computed: usize, stored: usize },
    #[error("invalid storage structure: {0}")]
    InvalidStructure(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}
