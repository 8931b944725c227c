//! Byron-era headers: epoch boundary blocks and standard blocks

use crate::cbor::{array_of, raw_array, raw_item, write_raw};
use follower_common::{BlockHash, params::BYRON_EPOCH_LENGTH};
use minicbor as cbor;

/// Header of an epoch boundary block
///
/// `[protocol_magic, prev_hash, body_proof, [epoch, [difficulty]], extra_data]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByronBoundaryHeader {
    pub protocol_magic: u32,
    pub prev_hash: BlockHash,
    pub body_proof: BlockHash,
    pub epoch: u64,
    /// Chain difficulty, shared with the preceding block
    pub difficulty: u64,
    /// Raw CBOR of the extra data (attributes)
    pub extra_data: Vec<u8>,
}

impl ByronBoundaryHeader {
    pub fn slot(&self) -> u64 {
        self.epoch * BYRON_EPOCH_LENGTH
    }
}

impl<'b, C> cbor::Decode<'b, C> for ByronBoundaryHeader {
    fn decode(d: &mut cbor::Decoder<'b>, _ctx: &mut C) -> Result<Self, cbor::decode::Error> {
        array_of(d, 5, "boundary header")?;
        let protocol_magic = d.u32()?;
        let prev_hash = d.decode()?;
        let body_proof = d.decode()?;

        array_of(d, 2, "boundary consensus data")?;
        let epoch = d.u64()?;
        array_of(d, 1, "boundary difficulty")?;
        let difficulty = d.u64()?;

        let extra_data = raw_item(d)?;

        Ok(Self {
            protocol_magic,
            prev_hash,
            body_proof,
            epoch,
            difficulty,
            extra_data,
        })
    }
}

impl<C> cbor::Encode<C> for ByronBoundaryHeader {
    fn encode<W: cbor::encode::Write>(
        &self,
        e: &mut cbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), cbor::encode::Error<W::Error>> {
        e.array(5)?;
        e.u32(self.protocol_magic)?;
        e.bytes(self.prev_hash.as_ref())?;
        e.bytes(self.body_proof.as_ref())?;
        e.array(2)?.u64(self.epoch)?;
        e.array(1)?.u64(self.difficulty)?;
        write_raw(e, &self.extra_data)
    }
}

/// Header of a standard Byron block
///
/// `[protocol_magic, prev_hash, body_proof, consensus_data, extra_data]` where
/// consensus data is `[[epoch, slot], issuer_pubkey, [difficulty], block_signature]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByronHeader {
    pub protocol_magic: u32,
    pub prev_hash: BlockHash,
    /// Raw CBOR of `[tx_proof, ssc_proof, dlg_proof, upd_proof]`
    pub body_proof: Vec<u8>,
    pub epoch: u64,
    pub slot_in_epoch: u64,
    pub issuer_pubkey: Vec<u8>,
    pub difficulty: u64,
    /// Raw CBOR of the block signature
    pub block_signature: Vec<u8>,
    /// Raw CBOR of `[block_version, software_version, attributes, extra_proof]`
    pub extra_data: Vec<u8>,
}

impl ByronHeader {
    pub fn slot(&self) -> u64 {
        self.epoch * BYRON_EPOCH_LENGTH + self.slot_in_epoch
    }
}

impl<'b, C> cbor::Decode<'b, C> for ByronHeader {
    fn decode(d: &mut cbor::Decoder<'b>, _ctx: &mut C) -> Result<Self, cbor::decode::Error> {
        array_of(d, 5, "byron header")?;
        let protocol_magic = d.u32()?;
        let prev_hash = d.decode()?;
        let body_proof = raw_array(d, 4, "byron body proof")?;

        array_of(d, 4, "byron consensus data")?;
        array_of(d, 2, "byron slot id")?;
        let epoch = d.u64()?;
        let slot_in_epoch = d.u64()?;
        let issuer_pubkey = d.bytes()?.to_vec();
        array_of(d, 1, "byron difficulty")?;
        let difficulty = d.u64()?;
        let block_signature = raw_item(d)?;

        let extra_data = raw_array(d, 4, "byron extra data")?;

        Ok(Self {
            protocol_magic,
            prev_hash,
            body_proof,
            epoch,
            slot_in_epoch,
            issuer_pubkey,
            difficulty,
            block_signature,
            extra_data,
        })
    }
}

impl<C> cbor::Encode<C> for ByronHeader {
    fn encode<W: cbor::encode::Write>(
        &self,
        e: &mut cbor::Encoder<W>,
        _ctx: &mut C,
    ) -> Result<(), cbor::encode::Error<W::Error>> {
        e.array(5)?;
        e.u32(self.protocol_magic)?;
        e.bytes(self.prev_hash.as_ref())?;
        write_raw(e, &self.body_proof)?;
        e.array(4)?;
        e.array(2)?.u64(self.epoch)?.u64(self.slot_in_epoch)?;
        e.bytes(&self.issuer_pubkey)?;
        e.array(1)?.u64(self.difficulty)?;
        write_raw(e, &self.block_signature)?;
        write_raw(e, &self.extra_data)
    }
}
