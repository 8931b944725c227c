//! Normalised multi-era header

use crate::{
    byron::{ByronBoundaryHeader, ByronHeader},
    cbor::{DecodeResult, decode_exact},
    error::CodecError,
    praos::PraosHeader,
    tpraos::TPraosHeader,
};
use follower_common::{BlockHash, Era, RealPoint, crypto::blake2b_256};
use minicbor as cbor;
use std::{fmt, sync::OnceLock};
use tracing::debug;

/// Pre-image prefix (`[0x82, variant]`) for Byron header hashes
const BOUNDARY_HASH_PREFIX: [u8; 2] = [0x82, 0x00];
const BYRON_HASH_PREFIX: [u8; 2] = [0x82, 0x01];

/// Wire format of a header, in historical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeaderKind {
    ByronBoundary,
    Byron,
    Shelley,
    Allegra,
    Mary,
    Alonzo,
    Babbage,
    Conway,
}

impl HeaderKind {
    /// Order in which formats are tried when the era is unknown
    pub const ALL: [HeaderKind; 8] = [
        HeaderKind::ByronBoundary,
        HeaderKind::Byron,
        HeaderKind::Shelley,
        HeaderKind::Allegra,
        HeaderKind::Mary,
        HeaderKind::Alonzo,
        HeaderKind::Babbage,
        HeaderKind::Conway,
    ];

    pub fn era(&self) -> Era {
        match self {
            HeaderKind::ByronBoundary | HeaderKind::Byron => Era::Byron,
            HeaderKind::Shelley => Era::Shelley,
            HeaderKind::Allegra => Era::Allegra,
            HeaderKind::Mary => Era::Mary,
            HeaderKind::Alonzo => Era::Alonzo,
            HeaderKind::Babbage => Era::Babbage,
            HeaderKind::Conway => Era::Conway,
        }
    }

    /// Kind for a non-Byron era
    fn for_era(era: Era) -> Option<HeaderKind> {
        match era {
            Era::Byron => None,
            Era::Shelley => Some(HeaderKind::Shelley),
            Era::Allegra => Some(HeaderKind::Allegra),
            Era::Mary => Some(HeaderKind::Mary),
            Era::Alonzo => Some(HeaderKind::Alonzo),
            Era::Babbage => Some(HeaderKind::Babbage),
            Era::Conway => Some(HeaderKind::Conway),
        }
    }

    /// Era implied by a header's protocol major version
    fn for_protocol_version(major: u64) -> Option<HeaderKind> {
        match major {
            2 => Some(HeaderKind::Shelley),
            3 => Some(HeaderKind::Allegra),
            4 => Some(HeaderKind::Mary),
            5 | 6 => Some(HeaderKind::Alonzo),
            7 | 8 => Some(HeaderKind::Babbage),
            9.. => Some(HeaderKind::Conway),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderKind::ByronBoundary => f.write_str("byron boundary"),
            other => write!(f, "{}", other.era()),
        }
    }
}

/// Era-specific header content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderBody {
    Boundary(ByronBoundaryHeader),
    Byron(ByronHeader),
    Shelley(TPraosHeader),
    Allegra(TPraosHeader),
    Mary(TPraosHeader),
    Alonzo(TPraosHeader),
    Babbage(PraosHeader),
    Conway(PraosHeader),
}

impl HeaderBody {
    pub fn kind(&self) -> HeaderKind {
        match self {
            HeaderBody::Boundary(_) => HeaderKind::ByronBoundary,
            HeaderBody::Byron(_) => HeaderKind::Byron,
            HeaderBody::Shelley(_) => HeaderKind::Shelley,
            HeaderBody::Allegra(_) => HeaderKind::Allegra,
            HeaderBody::Mary(_) => HeaderKind::Mary,
            HeaderBody::Alonzo(_) => HeaderKind::Alonzo,
            HeaderBody::Babbage(_) => HeaderKind::Babbage,
            HeaderBody::Conway(_) => HeaderKind::Conway,
        }
    }

    /// Decode `bytes` as exactly one header of `kind`
    ///
    /// With `check_version`, a shared Shelley-family shape is only accepted
    /// when its protocol version belongs to `kind`.
    fn decode_as(kind: HeaderKind, bytes: &[u8], check_version: bool) -> DecodeResult<Self> {
        let version_matches = |major: u64| {
            if check_version && HeaderKind::for_protocol_version(major) != Some(kind) {
                Err(cbor::decode::Error::message(format!(
                    "protocol version {major} does not belong to {kind}"
                )))
            } else {
                Ok(())
            }
        };

        Ok(match kind {
            HeaderKind::ByronBoundary => HeaderBody::Boundary(decode_exact(bytes)?),
            HeaderKind::Byron => HeaderBody::Byron(decode_exact(bytes)?),
            HeaderKind::Shelley
            | HeaderKind::Allegra
            | HeaderKind::Mary
            | HeaderKind::Alonzo => {
                let header: TPraosHeader = decode_exact(bytes)?;
                version_matches(header.protocol_major)?;
                match kind {
                    HeaderKind::Shelley => HeaderBody::Shelley(header),
                    HeaderKind::Allegra => HeaderBody::Allegra(header),
                    HeaderKind::Mary => HeaderBody::Mary(header),
                    _ => HeaderBody::Alonzo(header),
                }
            }
            HeaderKind::Babbage | HeaderKind::Conway => {
                let header: PraosHeader = decode_exact(bytes)?;
                version_matches(header.protocol_major)?;
                match kind {
                    HeaderKind::Babbage => HeaderBody::Babbage(header),
                    _ => HeaderBody::Conway(header),
                }
            }
        })
    }

    fn encode(&self) -> Vec<u8> {
        let encoded = match self {
            HeaderBody::Boundary(h) => minicbor::to_vec(h),
            HeaderBody::Byron(h) => minicbor::to_vec(h),
            HeaderBody::Shelley(h)
            | HeaderBody::Allegra(h)
            | HeaderBody::Mary(h)
            | HeaderBody::Alonzo(h) => minicbor::to_vec(h),
            HeaderBody::Babbage(h) | HeaderBody::Conway(h) => minicbor::to_vec(h),
        };
        encoded.expect("infallible")
    }
}

/// A block header of any era, normalised to the fields chain selection needs
///
/// Decoded headers keep their original bytes, so [`MultiEraHeader::to_cbor`]
/// and the hash always reflect exactly what the peer sent.
#[derive(Clone)]
pub struct MultiEraHeader {
    body: HeaderBody,
    cbor: OnceLock<Vec<u8>>,
    hash: OnceLock<BlockHash>,
}

impl MultiEraHeader {
    /// Build a header from content; its encoding is produced on first use
    pub fn new(body: HeaderBody) -> Self {
        Self {
            body,
            cbor: OnceLock::new(),
            hash: OnceLock::new(),
        }
    }

    /// Decode a header from its unwrapped bytes
    ///
    /// `era` and `byron_variant` (0 boundary, 1 standard) come from the
    /// wire envelope when known. Without an era every format is tried in
    /// historical order and the first that parses wins.
    pub fn decode(
        era: Option<Era>,
        byron_variant: Option<u8>,
        bytes: &[u8],
    ) -> Result<Self, CodecError> {
        let body = match era {
            None => Self::infer(bytes)?,
            Some(Era::Byron) => match byron_variant {
                Some(0) => Self::decode_kind(HeaderKind::ByronBoundary, bytes)?,
                Some(1) => Self::decode_kind(HeaderKind::Byron, bytes)?,
                Some(other) => {
                    return Err(CodecError::invalid(
                        HeaderKind::Byron,
                        format!("unknown byron header variant {other}"),
                    ));
                }
                None => HeaderBody::decode_as(HeaderKind::ByronBoundary, bytes, false)
                    .or_else(|_| HeaderBody::decode_as(HeaderKind::Byron, bytes, false))
                    .map_err(|e| CodecError::invalid(HeaderKind::Byron, e))?,
            },
            Some(era) => {
                let kind = HeaderKind::for_era(era).ok_or(CodecError::UnknownEra(era as u8))?;
                Self::decode_kind(kind, bytes)?
            }
        };

        Ok(Self {
            body,
            cbor: OnceLock::from(bytes.to_vec()),
            hash: OnceLock::new(),
        })
    }

    fn decode_kind(kind: HeaderKind, bytes: &[u8]) -> Result<HeaderBody, CodecError> {
        HeaderBody::decode_as(kind, bytes, false).map_err(|e| CodecError::invalid(kind, e))
    }

    /// Try every format in historical order, preferring the era that owns
    /// the header's protocol version
    ///
    /// Headers signalling the next era's version carry a major that belongs
    /// to no format they parse as; the first structurally valid parse is
    /// taken for those.
    fn infer(bytes: &[u8]) -> Result<HeaderBody, CodecError> {
        let mut fallback = None;
        for kind in HeaderKind::ALL {
            match HeaderBody::decode_as(kind, bytes, true) {
                Ok(body) => return Ok(body),
                Err(e) => debug!("Not a {kind} header: {e}"),
            }
            if fallback.is_none() {
                fallback = HeaderBody::decode_as(kind, bytes, false).ok();
            }
        }
        fallback.ok_or_else(|| CodecError::unrecognized(bytes))
    }

    pub fn body(&self) -> &HeaderBody {
        &self.body
    }

    pub fn into_body(self) -> HeaderBody {
        self.body
    }

    pub fn kind(&self) -> HeaderKind {
        self.body.kind()
    }

    pub fn era(&self) -> Era {
        self.kind().era()
    }

    /// Canonical bytes: the original input when decoded, else a fresh encoding
    pub fn to_cbor(&self) -> &[u8] {
        self.cbor.get_or_init(|| self.body.encode())
    }

    pub fn hash(&self) -> BlockHash {
        *self.hash.get_or_init(|| {
            let bytes = self.to_cbor();
            match self.body {
                HeaderBody::Boundary(_) => blake2b_256(&[&BOUNDARY_HASH_PREFIX, bytes]),
                HeaderBody::Byron(_) => blake2b_256(&[&BYRON_HASH_PREFIX, bytes]),
                _ => blake2b_256(&[bytes]),
            }
        })
    }

    pub fn prev_hash(&self) -> BlockHash {
        match &self.body {
            HeaderBody::Boundary(h) => h.prev_hash,
            HeaderBody::Byron(h) => h.prev_hash,
            HeaderBody::Shelley(h)
            | HeaderBody::Allegra(h)
            | HeaderBody::Mary(h)
            | HeaderBody::Alonzo(h) => h.prev_hash,
            HeaderBody::Babbage(h) | HeaderBody::Conway(h) => h.prev_hash,
        }
    }

    pub fn slot(&self) -> u64 {
        match &self.body {
            HeaderBody::Boundary(h) => h.slot(),
            HeaderBody::Byron(h) => h.slot(),
            HeaderBody::Shelley(h)
            | HeaderBody::Allegra(h)
            | HeaderBody::Mary(h)
            | HeaderBody::Alonzo(h) => h.slot,
            HeaderBody::Babbage(h) | HeaderBody::Conway(h) => h.slot,
        }
    }

    /// Block number; Byron headers carry it as the chain difficulty
    pub fn block_number(&self) -> u64 {
        match &self.body {
            HeaderBody::Boundary(h) => h.difficulty,
            HeaderBody::Byron(h) => h.difficulty,
            HeaderBody::Shelley(h)
            | HeaderBody::Allegra(h)
            | HeaderBody::Mary(h)
            | HeaderBody::Alonzo(h) => h.block_number,
            HeaderBody::Babbage(h) | HeaderBody::Conway(h) => h.block_number,
        }
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self.body, HeaderBody::Boundary(_))
    }

    pub fn point(&self) -> RealPoint {
        RealPoint::new(self.slot(), self.hash())
    }
}

impl PartialEq for MultiEraHeader {
    fn eq(&self, other: &Self) -> bool {
        self.body == other.body
    }
}

impl Eq for MultiEraHeader {}

impl fmt::Debug for MultiEraHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiEraHeader")
            .field("kind", &self.kind())
            .field("slot", &self.slot())
            .field("hash", &self.hash())
            .finish()
    }
}

impl From<HeaderBody> for MultiEraHeader {
    fn from(body: HeaderBody) -> Self {
        Self::new(body)
    }
}
