//! Error types for chain database operations.

use follower_codec::CodecError;
use follower_common::RealPoint;
use std::{io, path::PathBuf};

/// Errors returned by [`ChainDb`](crate::ChainDb) and its stores.
#[derive(Debug, thiserror::Error)]
pub enum ChainDbError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A block offered for selection was never written to volatile storage.
    #[error("block {point} is not in volatile storage")]
    UnreachableBlock { point: RealPoint },

    /// A stored header could not be decoded.
    #[error("stored header {point} is corrupt: {source}")]
    CorruptHeader {
        point: RealPoint,
        #[source]
        source: CodecError,
    },

    /// The record of the newest migrated block could not be read or written.
    #[error("immutable tip {path} is corrupt: {source}")]
    CorruptTip {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ChainDbError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| ChainDbError::Io { path, source }
    }
}
