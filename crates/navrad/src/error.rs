use thiserror::Error;

/// Failures that abort an operation. Per-record parse problems are not
/// errors at this level: they are logged and the record is skipped.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}: missing or malformed navaid file header")]
    BadHeader(String),

    #[error("navaid file version {0} not supported")]
    UnsupportedVersion(u32),

    #[error("no usable navaid data source found")]
    NoUsableSource,

    #[error("configuration out of range: {0}")]
    BadConfig(&'static str),
}
