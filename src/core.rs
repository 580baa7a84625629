//! Core constants shared by the codec, the registry and the transport engine:
//! well-known PGNs, reserved addresses and payload ceilings.

//==================================================================================ADDRESSES
/// Address used by a node that could not claim one (ISO 11783-5 "NULL address").
pub const NULL_ADDRESS: u8 = 0xFE;
/// Global (broadcast) destination address. Never valid as a source.
pub const GLOBAL_ADDRESS: u8 = 0xFF;
/// Highest address a control function may hold.
pub const MAX_CLAIMABLE_ADDRESS: u8 = 0xFD;

/// First address of the self-configurable range tried by arbitrary-address-capable nodes.
pub const ARBITRARY_ADDRESS_FIRST: u8 = 128;
/// Last address of the self-configurable range.
pub const ARBITRARY_ADDRESS_LAST: u8 = 247;

//==================================================================================PGNS
/// Address Claimed / Cannot Claim (PGN 60928).
pub const ADDRESS_CLAIM_PGN: u32 = 0xEE00;
/// Request (PGN 59904). Payload is the requested PGN on three bytes.
pub const REQUEST_PGN: u32 = 0xEA00;
/// TP.CM: transport protocol connection management (PGN 60416).
pub const TP_CONNECTION_MANAGEMENT_PGN: u32 = 0xEC00;
/// TP.DT: transport protocol data transfer (PGN 60160).
pub const TP_DATA_TRANSFER_PGN: u32 = 0xEB00;
/// ETP.CM: extended transport connection management (PGN 51200).
pub const ETP_CONNECTION_MANAGEMENT_PGN: u32 = 0xC800;
/// ETP.DT: extended transport data transfer (PGN 50944).
pub const ETP_DATA_TRANSFER_PGN: u32 = 0xC700;

//==================================================================================SIZES
/// Payload bytes carried by a classic CAN frame.
pub const CAN_DATA_LENGTH: usize = 8;
/// Payload bytes carried by one transport data frame (first byte is the sequence number).
pub const BYTES_PER_TRANSPORT_PACKET: usize = 7;
/// Largest payload the standard transport protocol (BAM or connection mode) can carry.
pub const MAX_TP_PAYLOAD: usize = 1785;
/// Largest payload the extended transport protocol can carry (2^24 - 1 packets).
pub const MAX_ETP_PAYLOAD: usize = 117_440_505;

/// Priority used by claims, requests and transport control frames.
pub const DEFAULT_PRIORITY: u8 = 6;
/// Lowest priority a 3-bit priority field can carry.
pub const MAX_PRIORITY: u8 = 7;
/// Priority used by transport data frames.
pub const TRANSPORT_DATA_PRIORITY: u8 = 7;

/// Number of transport packets required to carry `len` bytes.
#[inline]
pub const fn packets_for(len: usize) -> usize {
    len.div_ceil(BYTES_PER_TRANSPORT_PACKET)
}

/// Returns `true` when `pgn` is one of the four transport management/data PGNs.
#[inline]
pub const fn is_transport_pgn(pgn: u32) -> bool {
    matches!(
        pgn,
        TP_CONNECTION_MANAGEMENT_PGN
            | TP_DATA_TRANSFER_PGN
            | ETP_CONNECTION_MANAGEMENT_PGN
            | ETP_DATA_TRANSFER_PGN
    )
}
