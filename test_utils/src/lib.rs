//! Builders for well-formed headers of every era, chained by previous hash

use follower_codec::{
    ByronBoundaryHeader, ByronHeader, HeaderBody, HeaderKind, MultiEraHeader, OperationalCert,
    PraosHeader, TPraosHeader, VrfCert,
};
use follower_common::{params::BYRON_EPOCH_LENGTH, BlockHash};
use minicbor::Encoder;

pub fn test_hash(n: u8) -> BlockHash {
    BlockHash::new([n; 32])
}

/// Description of a header to build
#[derive(Debug, Clone)]
pub struct TestHeader {
    pub kind: HeaderKind,
    pub prev_hash: BlockHash,
    pub slot: u64,
    pub block_number: u64,
    /// Distinguishes otherwise identical headers, e.g. competing forks
    pub issuer: u8,
    /// Overrides the era's usual protocol major version
    pub protocol_major: Option<u64>,
}

impl TestHeader {
    pub fn conway(prev_hash: BlockHash, slot: u64, block_number: u64) -> Self {
        Self {
            kind: HeaderKind::Conway,
            prev_hash,
            slot,
            block_number,
            issuer: 0,
            protocol_major: None,
        }
    }

    pub fn kind(mut self, kind: HeaderKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn issuer(mut self, issuer: u8) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn protocol_major(mut self, major: u64) -> Self {
        self.protocol_major = Some(major);
        self
    }

    pub fn body(&self) -> HeaderBody {
        match self.kind {
            HeaderKind::ByronBoundary => HeaderBody::Boundary(ByronBoundaryHeader {
                protocol_magic: 764824073,
                prev_hash: self.prev_hash,
                body_proof: BlockHash::new([self.issuer; 32]),
                epoch: self.slot / BYRON_EPOCH_LENGTH,
                difficulty: self.block_number,
                extra_data: vec![0x81, 0xa0],
            }),
            HeaderKind::Byron => HeaderBody::Byron(ByronHeader {
                protocol_magic: 764824073,
                prev_hash: self.prev_hash,
                body_proof: byron_body_proof(),
                epoch: self.slot / BYRON_EPOCH_LENGTH,
                slot_in_epoch: self.slot % BYRON_EPOCH_LENGTH,
                issuer_pubkey: vec![self.issuer; 64],
                difficulty: self.block_number,
                block_signature: byron_signature(),
                extra_data: byron_extra_data(),
            }),
            HeaderKind::Shelley => HeaderBody::Shelley(self.tpraos(2)),
            HeaderKind::Allegra => HeaderBody::Allegra(self.tpraos(3)),
            HeaderKind::Mary => HeaderBody::Mary(self.tpraos(4)),
            HeaderKind::Alonzo => HeaderBody::Alonzo(self.tpraos(6)),
            HeaderKind::Babbage => HeaderBody::Babbage(self.praos(8)),
            HeaderKind::Conway => HeaderBody::Conway(self.praos(10)),
        }
    }

    pub fn build(&self) -> MultiEraHeader {
        MultiEraHeader::new(self.body())
    }

    fn tpraos(&self, protocol_major: u64) -> TPraosHeader {
        let protocol_major = self.protocol_major.unwrap_or(protocol_major);
        TPraosHeader {
            block_number: self.block_number,
            slot: self.slot,
            prev_hash: self.prev_hash,
            issuer_vkey: vec![self.issuer; 32],
            vrf_vkey: vec![2; 32],
            nonce_vrf: vrf_cert(),
            leader_vrf: vrf_cert(),
            body_size: 1024,
            body_hash: BlockHash::new([3; 32]),
            operational_cert: operational_cert(),
            protocol_major,
            protocol_minor: 0,
            body_signature: vec![4; 448],
        }
    }

    fn praos(&self, protocol_major: u64) -> PraosHeader {
        let protocol_major = self.protocol_major.unwrap_or(protocol_major);
        PraosHeader {
            block_number: self.block_number,
            slot: self.slot,
            prev_hash: self.prev_hash,
            issuer_vkey: vec![self.issuer; 32],
            vrf_vkey: vec![2; 32],
            vrf_result: vrf_cert(),
            body_size: 2048,
            body_hash: BlockHash::new([3; 32]),
            operational_cert: operational_cert(),
            protocol_major,
            protocol_minor: 0,
            body_signature: vec![4; 448],
        }
    }
}

fn vrf_cert() -> VrfCert {
    VrfCert {
        output: vec![5; 64],
        proof: vec![6; 80],
    }
}

fn operational_cert() -> OperationalCert {
    OperationalCert {
        hot_vkey: vec![7; 32],
        sequence_number: 3,
        kes_period: 42,
        sigma: vec![8; 64],
    }
}

fn byron_body_proof() -> Vec<u8> {
    let mut buf = Vec::new();
    let mut e = Encoder::new(&mut buf);
    e.array(4).unwrap();
    e.array(3).unwrap().u32(0).unwrap().bytes(&[0; 32]).unwrap().bytes(&[0; 32]).unwrap();
    e.array(2).unwrap().u8(0).unwrap().bytes(&[0; 32]).unwrap();
    e.bytes(&[0; 32]).unwrap();
    e.bytes(&[0; 32]).unwrap();
    buf
}

fn byron_signature() -> Vec<u8> {
    let mut buf = Vec::new();
    Encoder::new(&mut buf).array(2).unwrap().u8(0).unwrap().bytes(&[9; 64]).unwrap();
    buf
}

fn byron_extra_data() -> Vec<u8> {
    let mut buf = Vec::new();
    let mut e = Encoder::new(&mut buf);
    e.array(4).unwrap();
    e.array(3).unwrap().u16(0).unwrap().u16(2).unwrap().u8(0).unwrap();
    e.array(2).unwrap().str("cardano-sl").unwrap().u32(1).unwrap();
    e.map(0).unwrap();
    e.bytes(&[0; 32]).unwrap();
    buf
}

/// `len` Conway headers chained on top of `parent`, one slot apart
pub fn chain_from(
    parent: BlockHash,
    first_slot: u64,
    first_number: u64,
    len: usize,
    issuer: u8,
) -> Vec<MultiEraHeader> {
    let mut headers = Vec::with_capacity(len);
    let mut prev_hash = parent;
    for i in 0..len as u64 {
        let header = TestHeader::conway(prev_hash, first_slot + i, first_number + i)
            .issuer(issuer)
            .build();
        prev_hash = header.hash();
        headers.push(header);
    }
    headers
}

/// Fake block bytes identifying their header
pub fn block_body(header: &MultiEraHeader) -> Vec<u8> {
    let mut body = b"block:".to_vec();
    body.extend_from_slice(header.hash().as_ref());
    body
}
