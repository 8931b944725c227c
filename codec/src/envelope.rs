//! Hard-fork-combinator envelope around header bytes
//!
//! Shelley onwards: `[era_index, #6.24(bytes)]`.
//! Byron: `[0, [[variant, size_hint], #6.24(bytes)]]`.

use crate::{cbor::array_of, error::CodecError, header::MultiEraHeader};
use follower_common::Era;
use minicbor::{self as cbor, data::Tag};

const ENCODED_CBOR_TAG: u64 = 24;

/// Header bytes as carried by chain-sync, with their era tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedHeader {
    pub era: Era,
    /// Byron only: header variant (0 boundary, 1 standard) and block size hint
    pub byron_prefix: Option<(u8, u64)>,
    pub cbor: Vec<u8>,
}

impl WrappedHeader {
    pub fn from_envelope(bytes: &[u8]) -> Result<Self, CodecError> {
        let invalid = |e: cbor::decode::Error| CodecError::InvalidEnvelope(e.to_string());
        let mut d = cbor::Decoder::new(bytes);

        array_of(&mut d, 2, "envelope").map_err(invalid)?;
        let index = d.u8().map_err(invalid)?;
        let era = Era::try_from(index).map_err(|_| CodecError::UnknownEra(index))?;

        let byron_prefix = if era == Era::Byron {
            array_of(&mut d, 2, "byron envelope").map_err(invalid)?;
            array_of(&mut d, 2, "byron prefix").map_err(invalid)?;
            Some((d.u8().map_err(invalid)?, d.u64().map_err(invalid)?))
        } else {
            None
        };

        let tag = d.tag().map_err(invalid)?;
        if tag.as_u64() != ENCODED_CBOR_TAG {
            return Err(CodecError::InvalidEnvelope(format!(
                "expected tag {ENCODED_CBOR_TAG}, got {}",
                tag.as_u64()
            )));
        }
        let cbor = d.bytes().map_err(invalid)?.to_vec();

        if d.position() != bytes.len() {
            return Err(CodecError::InvalidEnvelope(format!(
                "{} trailing bytes",
                bytes.len() - d.position()
            )));
        }

        Ok(Self {
            era,
            byron_prefix,
            cbor,
        })
    }

    pub fn to_envelope(&self) -> Vec<u8> {
        minicbor::to_vec(self).expect("infallible")
    }

    /// Decode the wrapped bytes, trusting the era tags
    pub fn decode(&self) -> Result<MultiEraHeader, CodecError> {
        MultiEraHeader::decode(
            Some(self.era),
            self.byron_prefix.map(|(variant, _)| variant),
            &self.cbor,
        )
    }
}

impl<C> cbor::Encode<C> for WrappedHeader {
    fn encode<W: cbor::encode::Write>(
        &self,
        e: &mut cbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), cbor::encode::Error<W::Error>> {
        e.array(2)?.u8(self.era as u8)?;
        if let Some((variant, size)) = self.byron_prefix {
            e.array(2)?.array(2)?.u8(variant)?.u64(size)?;
        }
        e.tag(Tag::new(ENCODED_CBOR_TAG))?.bytes(&self.cbor)?.ok()
    }
}

impl From<&MultiEraHeader> for WrappedHeader {
    fn from(header: &MultiEraHeader) -> Self {
        let cbor = header.to_cbor().to_vec();
        let byron_prefix = (header.era() == Era::Byron)
            .then(|| (u8::from(!header.is_boundary()), cbor.len() as u64));
        Self {
            era: header.era(),
            byron_prefix,
            cbor,
        }
    }
}
