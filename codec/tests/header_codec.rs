use follower_codec::{CodecError, HeaderBody, HeaderKind, MultiEraHeader, WrappedHeader};
use follower_common::{crypto::blake2b_256, Era};
use follower_test_utils::{test_hash, TestHeader};

fn sample(kind: HeaderKind) -> TestHeader {
    let slot = match kind {
        HeaderKind::ByronBoundary => 2 * 21600,
        HeaderKind::Byron => 2 * 21600 + 5,
        _ => 90_000_000,
    };
    TestHeader::conway(test_hash(1), slot, 1234).kind(kind)
}

#[test]
fn every_kind_round_trips_without_an_era_hint() {
    for kind in HeaderKind::ALL {
        let original = sample(kind).build();
        let bytes = original.to_cbor().to_vec();

        let decoded = MultiEraHeader::decode(None, None, &bytes).unwrap();
        assert_eq!(decoded.kind(), kind);
        assert_eq!(decoded, original);
        assert_eq!(decoded.to_cbor(), bytes.as_slice());
        assert_eq!(decoded.hash(), original.hash());
        assert_eq!(decoded.prev_hash(), test_hash(1));
        assert_eq!(decoded.block_number(), 1234);
    }
}

#[test]
fn byron_hashes_prefix_the_variant() {
    let boundary = sample(HeaderKind::ByronBoundary).build();
    assert_eq!(
        boundary.hash(),
        blake2b_256(&[&[0x82, 0x00], boundary.to_cbor()])
    );

    let byron = sample(HeaderKind::Byron).build();
    assert_eq!(byron.hash(), blake2b_256(&[&[0x82, 0x01], byron.to_cbor()]));

    let shelley = sample(HeaderKind::Shelley).build();
    assert_eq!(shelley.hash(), blake2b_256(&[shelley.to_cbor()]));
}

#[test]
fn byron_slots_are_derived_from_epoch() {
    let boundary = TestHeader::conway(test_hash(0), 3 * 21600, 10)
        .kind(HeaderKind::ByronBoundary)
        .build();
    assert_eq!(boundary.slot(), 64800);
    assert!(boundary.is_boundary());

    let byron = TestHeader::conway(test_hash(0), 2 * 21600 + 5, 11)
        .kind(HeaderKind::Byron)
        .build();
    let HeaderBody::Byron(content) = byron.body() else {
        panic!("expected a byron header");
    };
    assert_eq!((content.epoch, content.slot_in_epoch), (2, 5));
    assert_eq!(byron.slot(), 43205);
    assert!(!byron.is_boundary());
}

#[test]
fn decoded_bytes_are_returned_verbatim() {
    let canonical = sample(HeaderKind::ByronBoundary).build().to_cbor().to_vec();
    // Re-encode the protocol magic (4 byte form) as a non-minimal 8 byte integer
    assert_eq!(canonical[1], 0x1a);
    let mut non_canonical = vec![canonical[0], 0x1b, 0, 0, 0, 0];
    non_canonical.extend_from_slice(&canonical[2..]);

    let decoded = MultiEraHeader::decode(None, None, &non_canonical).unwrap();
    assert_eq!(decoded.to_cbor(), non_canonical.as_slice());
    assert_eq!(
        decoded.hash(),
        blake2b_256(&[&[0x82, 0x00], &non_canonical])
    );

    let fresh = MultiEraHeader::new(decoded.body().clone());
    assert_eq!(fresh.to_cbor(), canonical.as_slice());
    assert_ne!(fresh.hash(), decoded.hash());
    assert_eq!(fresh, decoded);
}

#[test]
fn protocol_version_selects_the_shelley_family_era() {
    let mary = sample(HeaderKind::Mary).build();
    let decoded = MultiEraHeader::decode(None, None, mary.to_cbor()).unwrap();
    assert_eq!(decoded.era(), Era::Mary);

    // An explicit era tag is trusted over the protocol version
    let tagged = MultiEraHeader::decode(Some(Era::Shelley), None, mary.to_cbor()).unwrap();
    assert_eq!(tagged.era(), Era::Shelley);
}

#[test]
fn wrong_shape_for_tagged_era_names_the_era() {
    let shelley = sample(HeaderKind::Shelley).build();
    let err = MultiEraHeader::decode(Some(Era::Babbage), None, shelley.to_cbor()).unwrap_err();
    assert!(matches!(
        err,
        CodecError::InvalidHeaderEncoding {
            kind: HeaderKind::Babbage,
            ..
        }
    ));

    let boundary = sample(HeaderKind::ByronBoundary).build();
    let err = MultiEraHeader::decode(Some(Era::Byron), Some(1), boundary.to_cbor()).unwrap_err();
    assert!(matches!(
        err,
        CodecError::InvalidHeaderEncoding {
            kind: HeaderKind::Byron,
            ..
        }
    ));
}

#[test]
fn byron_variant_hint_selects_format() {
    let boundary = sample(HeaderKind::ByronBoundary).build();
    let decoded = MultiEraHeader::decode(Some(Era::Byron), Some(0), boundary.to_cbor()).unwrap();
    assert!(decoded.is_boundary());

    let byron = sample(HeaderKind::Byron).build();
    let decoded = MultiEraHeader::decode(Some(Era::Byron), None, byron.to_cbor()).unwrap();
    assert_eq!(decoded.kind(), HeaderKind::Byron);
}

#[test]
fn next_era_version_falls_back_to_first_valid_shape() {
    // Alonzo blocks signalling the Babbage hard fork carry major 7
    let signalling = sample(HeaderKind::Alonzo).protocol_major(7).build();
    let decoded = MultiEraHeader::decode(None, None, signalling.to_cbor()).unwrap();
    assert_eq!(decoded.kind(), HeaderKind::Shelley);
    assert_eq!(decoded.hash(), signalling.hash());
    assert_eq!(decoded.to_cbor(), signalling.to_cbor());

    let tagged = MultiEraHeader::decode(Some(Era::Alonzo), None, signalling.to_cbor()).unwrap();
    assert_eq!(tagged, signalling);

    let wrapped = WrappedHeader::from(&signalling);
    let unwrapped = WrappedHeader::from_envelope(&wrapped.to_envelope()).unwrap();
    assert_eq!(unwrapped.decode().unwrap(), signalling);
}

#[test]
fn garbage_is_unrecognized() {
    let err = MultiEraHeader::decode(None, None, &[0x83, 0x01, 0x02, 0x03]).unwrap_err();
    match err {
        CodecError::UnrecognizedHeader { bytes } => assert_eq!(bytes, "83010203"),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut bytes = sample(HeaderKind::Conway).build().to_cbor().to_vec();
    bytes.push(0x00);
    assert!(MultiEraHeader::decode(Some(Era::Conway), None, &bytes).is_err());
    assert!(MultiEraHeader::decode(None, None, &bytes).is_err());
}

#[test]
fn envelope_carries_era_and_byron_variant() {
    for kind in [HeaderKind::ByronBoundary, HeaderKind::Byron, HeaderKind::Alonzo] {
        let header = sample(kind).build();
        let wrapped = WrappedHeader::from(&header);
        let unwrapped = WrappedHeader::from_envelope(&wrapped.to_envelope()).unwrap();

        assert_eq!(unwrapped, wrapped);
        assert_eq!(unwrapped.era, kind.era());
        assert_eq!(unwrapped.decode().unwrap().hash(), header.hash());
    }
}

#[test]
fn envelope_rejects_unknown_era_and_wrong_tag() {
    // [9, 24(h'00')]
    let unknown = [0x82, 0x09, 0xd8, 0x18, 0x41, 0x00];
    assert!(matches!(
        WrappedHeader::from_envelope(&unknown),
        Err(CodecError::UnknownEra(9))
    ));

    // [6, 25(h'00')]
    let wrong_tag = [0x82, 0x06, 0xd8, 0x19, 0x41, 0x00];
    assert!(matches!(
        WrappedHeader::from_envelope(&wrong_tag),
        Err(CodecError::InvalidEnvelope(_))
    ));
}
