//! Transitional Praos headers (Shelley, Allegra, Mary, Alonzo)

use crate::cbor::{array_of, sized_bytes};
use follower_common::BlockHash;
use minicbor as cbor;

const VRF_PROOF_LENGTH: usize = 80;

/// VRF output with its proof
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrfCert {
    pub output: Vec<u8>,
    pub proof: Vec<u8>,
}

impl<'b, C> cbor::Decode<'b, C> for VrfCert {
    fn decode(d: &mut cbor::Decoder<'b>, _ctx: &mut C) -> Result<Self, cbor::decode::Error> {
        array_of(d, 2, "vrf certificate")?;
        Ok(Self {
            output: d.bytes()?.to_vec(),
            proof: sized_bytes(d, VRF_PROOF_LENGTH, "vrf proof")?,
        })
    }
}

impl<C> cbor::Encode<C> for VrfCert {
    fn encode<W: cbor::encode::Write>(
        &self,
        e: &mut cbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), cbor::encode::Error<W::Error>> {
        e.array(2)?.bytes(&self.output)?.bytes(&self.proof)?.ok()
    }
}

/// Operational certificate delegating to a hot KES key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationalCert {
    pub hot_vkey: Vec<u8>,
    pub sequence_number: u64,
    pub kes_period: u64,
    pub sigma: Vec<u8>,
}

/// Header of the transitional Praos eras
///
/// `[header_body, body_signature]` with a 15 field body; the operational
/// certificate and protocol version are inlined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TPraosHeader {
    pub block_number: u64,
    pub slot: u64,
    pub prev_hash: BlockHash,
    pub issuer_vkey: Vec<u8>,
    pub vrf_vkey: Vec<u8>,
    pub nonce_vrf: VrfCert,
    pub leader_vrf: VrfCert,
    pub body_size: u64,
    pub body_hash: BlockHash,
    pub operational_cert: OperationalCert,
    pub protocol_major: u64,
    pub protocol_minor: u64,
    pub body_signature: Vec<u8>,
}

impl<'b, C> cbor::Decode<'b, C> for TPraosHeader {
    fn decode(d: &mut cbor::Decoder<'b>, ctx: &mut C) -> Result<Self, cbor::decode::Error> {
        array_of(d, 2, "tpraos header")?;
        array_of(d, 15, "tpraos header body")?;
        let block_number = d.u64()?;
        let slot = d.u64()?;
        let prev_hash = d.decode()?;
        let issuer_vkey = d.bytes()?.to_vec();
        let vrf_vkey = d.bytes()?.to_vec();
        let nonce_vrf = d.decode_with(ctx)?;
        let leader_vrf = d.decode_with(ctx)?;
        let body_size = d.u64()?;
        let body_hash = d.decode()?;
        let operational_cert = OperationalCert {
            hot_vkey: d.bytes()?.to_vec(),
            sequence_number: d.u64()?,
            kes_period: d.u64()?,
            sigma: d.bytes()?.to_vec(),
        };
        let protocol_major = d.u64()?;
        let protocol_minor = d.u64()?;
        let body_signature = d.bytes()?.to_vec();

        Ok(Self {
            block_number,
            slot,
            prev_hash,
            issuer_vkey,
            vrf_vkey,
            nonce_vrf,
            leader_vrf,
            body_size,
            body_hash,
            operational_cert,
            protocol_major,
            protocol_minor,
            body_signature,
        })
    }
}

impl<C> cbor::Encode<C> for TPraosHeader {
    fn encode<W: cbor::encode::Write>(
        &self,
        e: &mut cbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), cbor::encode::Error<W::Error>> {
        e.array(2)?;
        e.array(15)?;
        e.u64(self.block_number)?;
        e.u64(self.slot)?;
        e.bytes(self.prev_hash.as_ref())?;
        e.bytes(&self.issuer_vkey)?;
        e.bytes(&self.vrf_vkey)?;
        e.encode_with(&self.nonce_vrf, ctx)?;
        e.encode_with(&self.leader_vrf, ctx)?;
        e.u64(self.body_size)?;
        e.bytes(self.body_hash.as_ref())?;
        let cert = &self.operational_cert;
        e.bytes(&cert.hot_vkey)?;
        e.u64(cert.sequence_number)?;
        e.u64(cert.kes_period)?;
        e.bytes(&cert.sigma)?;
        e.u64(self.protocol_major)?;
        e.u64(self.protocol_minor)?;
        e.bytes(&self.body_signature)?.ok()
    }
}
