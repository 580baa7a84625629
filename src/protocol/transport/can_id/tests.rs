//! Unit tests for the `CanId` accessors and builder.
use super::*;

//==================================================================================CAN_ID
#[test]
/// Decodes a BAM announcement identifier sent from 0xAA.
fn test_decode_transport_management_id() {
    let can_id = CanId(0x18ECFFAA);
    assert_eq!(can_id.priority(), 6);
    assert_eq!(can_id.pgn(), 0xEC00);
    assert_eq!(can_id.destination(), Some(0xFF));
    assert_eq!(can_id.source_address(), 0xAA);
}

#[test]
/// PDU2 identifiers report the global destination and keep PS inside the PGN.
fn test_decode_pdu2() {
    let can_id = CanId(0x18FECA1C);
    assert_eq!(can_id.pgn(), 0xFECA);
    assert_eq!(can_id.destination(), None);
    assert_eq!(can_id.destination_address(), 0xFF);
    assert!(can_id.is_pdu2());
}

#[test]
/// Data page bits survive decoding.
fn test_pgn_with_data_page() {
    let can_id = CanId::encode(3, 0x1FECA, 0xFF, 0x21);
    assert_eq!(can_id.pgn(), 0x1FECA);
    assert_eq!(can_id.priority(), 3);
}

#[test]
/// Encoding matches the identifiers observed on a real bus.
fn test_encode_known_identifiers() {
    assert_eq!(CanId::encode(6, 0xEE00, 0xFF, 0x22).0, 0x18EEFF22);
    assert_eq!(CanId::encode(7, 0xEB00, 0xFF, 0xAA).0, 0x1CEBFFAA);
    assert_eq!(CanId::encode(6, 0xEA00, 0xAA, 0xAB).0, 0x18EAAAAB);
}

#[test]
/// Identifiers wider than 29 bits are rejected.
fn test_validity() {
    assert!(CanId(0x1FFF_FFFF).is_valid());
    assert!(!CanId(0x2000_0000).is_valid());
}

//==================================================================================CAN_ID_BUILDER
#[test]
/// Validates builder scenarios: broadcast, addressed, and error handling.
fn test_builder() {
    // Broadcast PDU2 PGN.
    let broadcast = CanId::builder(0xFECA, 35).with_priority(3).build();
    assert!(broadcast.is_ok());

    // Addressed PDU1 PGN.
    let request_id = CanId::builder(0xEA00, 35)
        .with_priority(6)
        .to_destination(80)
        .build()
        .expect("PDU1 with destination must build");
    assert_eq!(request_id.destination(), Some(80));

    // PDU2 PGN with a destination.
    let invalid_id = CanId::builder(0xFECA, 35).to_destination(80).build();
    assert_eq!(
        invalid_id,
        Err(CanIdBuildError::InvalidForFocusedMessage { pgn: 0xFE })
    );

    // PDU1 PGN without a destination.
    let invalid_broadcast = CanId::builder(0xEF00, 35).build();
    assert_eq!(invalid_broadcast, Err(CanIdBuildError::InvalidForBroadcast));

    // PDU1 PGN with a non-zero PS byte.
    let invalid_ps = CanId::builder(0xEF12, 35).to_destination(1).build();
    assert_eq!(invalid_ps, Err(CanIdBuildError::PsFocusMessageMustBeNull));
}

#[test]
/// The priority must be capped to 3 bits to avoid touching the reserved field.
fn test_priority_masks_extra_bits() {
    let can_id = CanId::builder(0xFECA, 35)
        .with_priority(0b1111_0000)
        .build()
        .expect("CanId must build");

    assert_eq!(can_id.0 & (1 << 29), 0, "Reserved bit 29 must remain clear");
    assert_eq!(can_id.priority(), 0);
}
