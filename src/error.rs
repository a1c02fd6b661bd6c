use thiserror::Error;

use crate::FourCC;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    InvalidData(&'static str),

    #[error("truncated {kind} atom: needed {needed} bytes but only {available} remain")]
    TruncatedInput {
        kind: FourCC,
        needed: u64,
        available: u64,
    },

    #[error("malformed {0} container: {1}")]
    MalformedContainer(FourCC, &'static str),

    #[error("no atom at path {0:?}")]
    PathNotFound(String),

    #[error("no property at path {0:?}")]
    PropertyNotFound(String),

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("property {0} is read-only")]
    PropertyReadOnly(String),

    #[error("atom tree is nested deeper than {0} levels")]
    TreeTooDeep(usize),

    #[error("property {name} is not {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("invalid value for property {0}: {1}")]
    InvalidValue(String, &'static str),

    #[error("{0} atom was neither parsed nor generated")]
    NotPopulated(FourCC),

    #[error("{0} atom is already populated")]
    AlreadyPopulated(FourCC),
}

impl Error {
    /// Errors that describe a broken atom layout rather than a broken stream or
    /// a caller mistake. A container may keep the offending child as an opaque
    /// blob instead of failing the whole parse.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::TruncatedInput { .. } | Self::MalformedContainer(..)
        )
    }
}
