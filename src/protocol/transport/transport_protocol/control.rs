//! Connection management payloads (TP.CM PGN 60416, ETP.CM PGN 51200).
//!
//! ```text
//! TP.CM   RTS  0x10 | size u16 | packets | max/CTS | PGN u24
//!         CTS  0x11 | packets  | next    | FF FF   | PGN u24
//!         EOMA 0x13 | size u16 | packets | FF      | PGN u24
//!         BAM  0x20 | size u16 | packets | FF      | PGN u24
//! ETP.CM  RTS  0x14 | size u32                     | PGN u24
//!         CTS  0x15 | packets  | next u24          | PGN u24
//!         DPO  0x16 | packets  | offset u24        | PGN u24
//!         EOMA 0x17 | size u32                     | PGN u24
//! both    ABRT 0xFF | reason   | FF FF FF          | PGN u24
//! ```
//! Every multi-byte field is little endian.
use super::AbortReason;
use crate::core::{packets_for, CAN_DATA_LENGTH};

const TP_REQUEST_TO_SEND: u8 = 0x10;
const TP_CLEAR_TO_SEND: u8 = 0x11;
const TP_END_OF_MESSAGE_ACK: u8 = 0x13;
const TP_BROADCAST_ANNOUNCE: u8 = 0x20;
const ETP_REQUEST_TO_SEND: u8 = 0x14;
const ETP_CLEAR_TO_SEND: u8 = 0x15;
const ETP_DATA_PACKET_OFFSET: u8 = 0x16;
const ETP_END_OF_MESSAGE_ACK: u8 = 0x17;
const CONNECTION_ABORT: u8 = 0xFF;

/// `max_per_cts` value meaning "no limit".
pub const NO_CTS_LIMIT: u8 = 0xFF;

/// Decoded connection management frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    RequestToSend {
        size: u32,
        packets: u32,
        max_per_cts: u8,
        pgn: u32,
    },
    ClearToSend {
        packets: u8,
        next_packet: u32,
        pgn: u32,
    },
    EndOfMessageAck {
        size: u32,
        packets: u32,
        pgn: u32,
    },
    BroadcastAnnounce {
        size: u32,
        packets: u32,
        pgn: u32,
    },
    DataPacketOffset {
        packets: u8,
        offset: u32,
        pgn: u32,
    },
    Abort {
        reason: AbortReason,
        pgn: u32,
    },
}

impl ControlMessage {
    /// PGN of the transferred message.
    pub const fn pgn(&self) -> u32 {
        match *self {
            Self::RequestToSend { pgn, .. }
            | Self::ClearToSend { pgn, .. }
            | Self::EndOfMessageAck { pgn, .. }
            | Self::BroadcastAnnounce { pgn, .. }
            | Self::DataPacketOffset { pgn, .. }
            | Self::Abort { pgn, .. } => pgn,
        }
    }

    /// Parse a management payload. `extended` selects the ETP.CM layouts.
    ///
    /// Returns `None` for short frames and reserved control bytes, including TP control
    /// bytes received on ETP.CM and vice versa.
    pub fn decode(extended: bool, data: &[u8]) -> Option<Self> {
        if data.len() < CAN_DATA_LENGTH {
            return None;
        }
        let pgn = read_u24(&data[5..8]);
        let message = match (extended, data[0]) {
            (false, TP_REQUEST_TO_SEND) => Self::RequestToSend {
                size: u16::from_le_bytes([data[1], data[2]]) as u32,
                packets: data[3] as u32,
                max_per_cts: data[4],
                pgn,
            },
            (false, TP_CLEAR_TO_SEND) => Self::ClearToSend {
                packets: data[1],
                next_packet: data[2] as u32,
                pgn,
            },
            (false, TP_END_OF_MESSAGE_ACK) => Self::EndOfMessageAck {
                size: u16::from_le_bytes([data[1], data[2]]) as u32,
                packets: data[3] as u32,
                pgn,
            },
            (false, TP_BROADCAST_ANNOUNCE) => Self::BroadcastAnnounce {
                size: u16::from_le_bytes([data[1], data[2]]) as u32,
                packets: data[3] as u32,
                pgn,
            },
            (true, ETP_REQUEST_TO_SEND) => {
                let size = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
                Self::RequestToSend {
                    size,
                    packets: packets_for(size as usize) as u32,
                    max_per_cts: NO_CTS_LIMIT,
                    pgn,
                }
            }
            (true, ETP_CLEAR_TO_SEND) => Self::ClearToSend {
                packets: data[1],
                next_packet: read_u24(&data[2..5]),
                pgn,
            },
            (true, ETP_DATA_PACKET_OFFSET) => Self::DataPacketOffset {
                packets: data[1],
                offset: read_u24(&data[2..5]),
                pgn,
            },
            (true, ETP_END_OF_MESSAGE_ACK) => {
                let size = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
                Self::EndOfMessageAck {
                    size,
                    packets: packets_for(size as usize) as u32,
                    pgn,
                }
            }
            (_, CONNECTION_ABORT) => Self::Abort {
                reason: AbortReason::from_code(data[1]),
                pgn,
            },
            _ => return None,
        };
        Some(message)
    }

    /// Serialize into a full 8-byte payload. `extended` selects the ETP.CM layouts for
    /// the messages that exist in both protocols.
    pub fn encode(&self, extended: bool) -> [u8; 8] {
        let mut data = [0xFF; 8];
        match *self {
            Self::RequestToSend {
                size,
                packets,
                max_per_cts,
                ..
            } => {
                if extended {
                    data[0] = ETP_REQUEST_TO_SEND;
                    data[1..5].copy_from_slice(&size.to_le_bytes());
                } else {
                    data[0] = TP_REQUEST_TO_SEND;
                    data[1..3].copy_from_slice(&(size as u16).to_le_bytes());
                    data[3] = packets as u8;
                    data[4] = max_per_cts;
                }
            }
            Self::ClearToSend {
                packets,
                next_packet,
                ..
            } => {
                data[1] = packets;
                if extended {
                    data[0] = ETP_CLEAR_TO_SEND;
                    write_u24(&mut data[2..5], next_packet);
                } else {
                    data[0] = TP_CLEAR_TO_SEND;
                    data[2] = next_packet as u8;
                }
            }
            Self::EndOfMessageAck { size, packets, .. } => {
                if extended {
                    data[0] = ETP_END_OF_MESSAGE_ACK;
                    data[1..5].copy_from_slice(&size.to_le_bytes());
                } else {
                    data[0] = TP_END_OF_MESSAGE_ACK;
                    data[1..3].copy_from_slice(&(size as u16).to_le_bytes());
                    data[3] = packets as u8;
                }
            }
            Self::BroadcastAnnounce { size, packets, .. } => {
                data[0] = TP_BROADCAST_ANNOUNCE;
                data[1..3].copy_from_slice(&(size as u16).to_le_bytes());
                data[3] = packets as u8;
            }
            Self::DataPacketOffset {
                packets, offset, ..
            } => {
                data[0] = ETP_DATA_PACKET_OFFSET;
                data[1] = packets;
                write_u24(&mut data[2..5], offset);
            }
            Self::Abort { reason, .. } => {
                data[0] = CONNECTION_ABORT;
                data[1] = reason.code();
            }
        }
        write_u24(&mut data[5..8], self.pgn());
        data
    }
}

#[inline]
fn read_u24(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0])
}

#[inline]
fn write_u24(bytes: &mut [u8], value: u32) {
    bytes.copy_from_slice(&value.to_le_bytes()[..3]);
}
