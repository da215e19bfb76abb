use std::path::PathBuf;

use thiserror::Error;

use crate::file::Slot;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("could not locate key; not found")]
    NotFound,
    #[error("key already exists")]
    AlreadyExists,
    #[error("encoded document has {size} bytes, but a slot can only hold {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("maximum number of records was reached; store is full")]
    StoreFull,
    #[error("could not encode document")]
    Encode(#[source] serde_json::Error),
    #[error("could not decode document")]
    Decode(#[source] serde_json::Error),
    #[error("document is not a [key, value] pair")]
    MalformedDocument,
    #[error("slot {0} does not hold a readable document")]
    Corrupt(Slot),
    #[error("query predicate {0:?} has no operator (one of = < > ^)")]
    InvalidPredicate(String),
    #[error(transparent)]
    Pattern(#[from] regex::Error),
    #[error("{} is not an index file", .0.display())]
    NotAnIndexFile(PathBuf),
    #[error("index file was written with page size {found}, but the store uses {expected}")]
    PageSizeMismatch { expected: usize, found: usize },
    #[error("index file version {0} is not supported")]
    UnsupportedVersion(u32),
    #[error("page size {0} must be a power of two and at least 512 bytes")]
    InvalidPageSize(usize),
    #[error("grow size {0} must not be zero")]
    GrowSizeTooSmall(usize),
    #[error(transparent)]
    IO(#[from] std::io::Error),
}
