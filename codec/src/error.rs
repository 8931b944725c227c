use crate::header::HeaderKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    /// No header format accepted the bytes
    #[error("unrecognized header: {bytes}")]
    UnrecognizedHeader { bytes: String },

    #[error("invalid {kind} header encoding: {reason}")]
    InvalidHeaderEncoding { kind: HeaderKind, reason: String },

    #[error("invalid header envelope: {0}")]
    InvalidEnvelope(String),

    #[error("unknown era index {0}")]
    UnknownEra(u8),
}

impl CodecError {
    pub(crate) fn unrecognized(bytes: &[u8]) -> Self {
        CodecError::UnrecognizedHeader {
            bytes: hex::encode(bytes),
        }
    }

    pub(crate) fn invalid(kind: HeaderKind, reason: impl ToString) -> Self {
        CodecError::InvalidHeaderEncoding {
            kind,
            reason: reason.to_string(),
        }
    }
}
