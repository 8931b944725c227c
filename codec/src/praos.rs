//! Praos headers (Babbage, Conway)

use crate::cbor::array_of;
use crate::tpraos::{OperationalCert, VrfCert};
use follower_common::BlockHash;
use minicbor as cbor;

/// Header of the Praos eras
///
/// `[header_body, body_signature]` with a 10 field body holding a single VRF
/// result, a nested operational certificate and a nested protocol version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PraosHeader {
    pub block_number: u64,
    pub slot: u64,
    pub prev_hash: BlockHash,
    pub issuer_vkey: Vec<u8>,
    pub vrf_vkey: Vec<u8>,
    pub vrf_result: VrfCert,
    pub body_size: u64,
    pub body_hash: BlockHash,
    pub operational_cert: OperationalCert,
    pub protocol_major: u64,
    pub protocol_minor: u64,
    pub body_signature: Vec<u8>,
}

impl<'b, C> cbor::Decode<'b, C> for OperationalCert {
    fn decode(d: &mut cbor::Decoder<'b>, _ctx: &mut C) -> Result<Self, cbor::decode::Error> {
        array_of(d, 4, "operational certificate")?;
        Ok(Self {
            hot_vkey: d.bytes()?.to_vec(),
            sequence_number: d.u64()?,
            kes_period: d.u64()?,
            sigma: d.bytes()?.to_vec(),
        })
    }
}

impl<C> cbor::Encode<C> for OperationalCert {
    fn encode<W: cbor::encode::Write>(
        &self,
        e: &mut cbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), cbor::encode::Error<W::Error>> {
        e.array(4)?;
        e.bytes(&self.hot_vkey)?;
        e.u64(self.sequence_number)?;
        e.u64(self.kes_period)?;
        e.bytes(&self.sigma)?.ok()
    }
}

impl<'b, C> cbor::Decode<'b, C> for PraosHeader {
    fn decode(d: &mut cbor::Decoder<'b>, ctx: &mut C) -> Result<Self, cbor::decode::Error> {
        array_of(d, 2, "praos header")?;
        array_of(d, 10, "praos header body")?;
        let block_number = d.u64()?;
        let slot = d.u64()?;
        let prev_hash = d.decode()?;
        let issuer_vkey = d.bytes()?.to_vec();
        let vrf_vkey = d.bytes()?.to_vec();
        let vrf_result = d.decode_with(ctx)?;
        let body_size = d.u64()?;
        let body_hash = d.decode()?;
        let operational_cert = d.decode_with(ctx)?;
        array_of(d, 2, "protocol version")?;
        let protocol_major = d.u64()?;
        let protocol_minor = d.u64()?;
        let body_signature = d.bytes()?.to_vec();

        Ok(Self {
            block_number,
            slot,
            prev_hash,
            issuer_vkey,
            vrf_vkey,
            vrf_result,
            body_size,
            body_hash,
            operational_cert,
            protocol_major,
            protocol_minor,
            body_signature,
        })
    }
}

impl<C> cbor::Encode<C> for PraosHeader {
    fn encode<W: cbor::encode::Write>(
        &self,
        e: &mut cbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), cbor::encode::Error<W::Error>> {
        e.array(2)?;
        e.array(10)?;
        e.u64(self.block_number)?;
        e.u64(self.slot)?;
        e.bytes(self.prev_hash.as_ref())?;
        e.bytes(&self.issuer_vkey)?;
        e.bytes(&self.vrf_vkey)?;
        e.encode_with(&self.vrf_result, ctx)?;
        e.u64(self.body_size)?;
        e.bytes(self.body_hash.as_ref())?;
        e.encode_with(&self.operational_cert, ctx)?;
        e.array(2)?.u64(self.protocol_major)?.u64(self.protocol_minor)?;
        e.bytes(&self.body_signature)?.ok()
    }
}
