//! In-memory representation of an ISO 11783 / SAE J1939 CAN frame, plus the
//! [`embedded_can::Frame`] bridge used by HAL-based adapters.
use crate::core::CAN_DATA_LENGTH;
use crate::protocol::transport::can_id::CanId;
use embassy_time::Instant;
use embedded_can::{ExtendedId, Id};

#[derive(Clone, Debug, PartialEq, Eq)]
/// Raw frame as exchanged with the hardware boundary.
pub struct CanFrame {
    /// Full 29-bit CAN identifier stored inside a `u32`.
    pub id: CanId,
    /// Payload buffer. Unused bytes are padded with `0xFF` on transmit.
    pub data: [u8; 8],
    /// Number of valid payload bytes (Data Length Code, 0 to 8).
    pub len: usize,
    /// Bus channel the frame belongs to.
    pub channel: u8,
    /// Receive or creation timestamp.
    pub timestamp: Instant,
}

impl CanFrame {
    /// Build a frame on channel 0 from up to eight payload bytes (extra bytes are ignored).
    pub fn new(id: CanId, payload: &[u8]) -> Self {
        let len = payload.len().min(CAN_DATA_LENGTH);
        let mut data = [0xFF; 8];
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            id,
            data,
            len,
            channel: 0,
            timestamp: Instant::from_ticks(0),
        }
    }

    /// Move the frame to another bus channel.
    pub fn on_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    /// Stamp the frame.
    pub fn at(mut self, timestamp: Instant) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Valid payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len.min(CAN_DATA_LENGTH)]
    }

    /// `true` when the identifier fits 29 bits and the DLC fits a classic frame.
    #[inline]
    pub fn is_well_formed(&self) -> bool {
        self.id.is_valid() && self.len <= CAN_DATA_LENGTH
    }
}

impl embedded_can::Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > CAN_DATA_LENGTH {
            return None;
        }
        match id.into() {
            Id::Extended(ext) => Some(CanFrame::new(CanId(ext.as_raw()), data)),
            // J1939 only uses 29-bit identifiers.
            Id::Standard(_) => None,
        }
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        true
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        match ExtendedId::new(self.id.0) {
            Some(ext) => Id::Extended(ext),
            None => Id::Extended(ExtendedId::MAX),
        }
    }

    fn dlc(&self) -> usize {
        self.len
    }

    fn data(&self) -> &[u8] {
        self.payload()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_can::{Frame, StandardId};

    #[test]
    fn short_payload_is_padded() {
        let frame = CanFrame::new(CanId(0x18EEFF22), &[1, 2, 3]);
        assert_eq!(frame.len, 3);
        assert_eq!(frame.data, [1, 2, 3, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(frame.payload(), &[1, 2, 3]);
    }

    #[test]
    fn embedded_can_round_trip() {
        let ext = ExtendedId::new(0x18EAFFFE).unwrap();
        let frame = <CanFrame as Frame>::new(ext, &[0x00, 0xEE, 0x00]).unwrap();
        assert_eq!(frame.id.pgn(), 0xEA00);
        assert_eq!(Frame::dlc(&frame), 3);
        assert_eq!(Frame::id(&frame), Id::Extended(ext));
        assert!(Frame::is_extended(&frame));
    }

    #[test]
    fn standard_identifiers_are_refused() {
        let std_id = StandardId::new(0x123).unwrap();
        assert!(<CanFrame as Frame>::new(std_id, &[0; 8]).is_none());
        assert!(<CanFrame as Frame>::new_remote(std_id, 0).is_none());
    }

    #[test]
    fn oversized_identifier_is_not_well_formed() {
        let frame = CanFrame::new(CanId(0xFFFF_FFFF), &[0; 8]);
        assert!(!frame.is_well_formed());
    }
}
