use std::io;

use thiserror::Error;

/// A serialization error.
#[derive(Error, Debug)]
pub enum WireError {
    /// An io error that prevented deserialization
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The data to be deserialized was malformed.
    #[error("parse error: {0}")]
    Parse(&'static str),
}
