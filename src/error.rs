//! Error kinds surfaced by the stores, views, and writers.

use std::io;
use thiserror::Error;

/// Errors that can occur while opening, reading, or writing a store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Truncated header, truncated interval array, or a record extending
    /// past the end of the file. Raised only while opening a store.
    #[error("malformed store file: {0}")]
    MalformedFile(String),

    /// The id is absent from the store and `use_default` was false.
    #[error("id {0} not found")]
    IdNotFound(u32),

    /// A positional accessor was given an index past the record's end.
    #[error("interval {index} out of range for id {id} ({count} intervals)")]
    IndexOutOfRange { id: u32, index: usize, count: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
