//! State of one in-flight transfer.
use super::{
    Direction, ReceiverState, SenderState, SessionKey, SessionState, TransferCallback,
    TransportVariant,
};
use crate::core::{packets_for, BYTES_PER_TRANSPORT_PACKET, DEFAULT_PRIORITY};
use crate::error::TransferError;
use crate::protocol::managment::control_function::ControlFunctionHandle;
use alloc::vec::Vec;
use embassy_time::Instant;

/// One transfer tracked by the [`TransportProtocolManager`](super::TransportProtocolManager).
///
/// Packet numbers are absolute and 1-based. Extended data frames carry
/// `packet - data_packet_offset` on the wire.
pub struct TransportSession {
    pub(super) variant: TransportVariant,
    pub(super) key: SessionKey,
    pub(super) state: SessionState,
    pub(super) priority: u8,
    pub(super) total_bytes: usize,
    pub(super) total_packets: u32,
    /// Sender: the full payload. Receiver: bytes received so far.
    pub(super) data: Vec<u8>,
    /// Sender: next packet to emit. Receiver: next packet expected.
    pub(super) next_packet: u32,
    /// Packets left in the current burst.
    pub(super) burst_remaining: u32,
    /// Extended transport: packets preceding the current burst.
    pub(super) data_packet_offset: u32,
    /// Extended transport: a DPO must precede the next data frames.
    pub(super) dpo_pending: bool,
    /// Limit of packets per CTS requested by the sender (`0xFF` when none).
    pub(super) max_per_cts: u8,
    pub(super) deadline: Option<Instant>,
    pub(super) last_activity: Instant,
    pub(super) endpoints: Option<Endpoints>,
    pub(super) outcome: Option<Result<(), TransferError>>,
    pub(super) callback: Option<TransferCallback>,
}

/// Control functions a session is bound to, with the addresses they had when it opened:
/// the internal sender or receiver, and the remote destination of a send.
#[derive(Debug, Clone, Copy)]
pub(super) struct Endpoints {
    pub local: (ControlFunctionHandle, u8),
    pub remote: Option<(ControlFunctionHandle, u8)>,
}

impl TransportSession {
    pub(super) fn outgoing(
        variant: TransportVariant,
        key: SessionKey,
        priority: u8,
        data: Vec<u8>,
        endpoints: Endpoints,
        callback: Option<TransferCallback>,
        now: Instant,
    ) -> Self {
        let total_bytes = data.len();
        Self {
            variant,
            key,
            state: SessionState::Send(SenderState::None),
            priority,
            total_bytes,
            total_packets: packets_for(total_bytes) as u32,
            data,
            next_packet: 1,
            burst_remaining: 0,
            data_packet_offset: 0,
            dpo_pending: false,
            max_per_cts: 0xFF,
            deadline: None,
            last_activity: now,
            endpoints: Some(endpoints),
            outcome: None,
            callback,
        }
    }

    pub(super) fn incoming(
        variant: TransportVariant,
        key: SessionKey,
        total_bytes: usize,
        max_per_cts: u8,
        endpoints: Option<Endpoints>,
        now: Instant,
    ) -> Self {
        Self {
            variant,
            key,
            state: SessionState::Receive(ReceiverState::WaitingData),
            priority: DEFAULT_PRIORITY,
            total_bytes,
            total_packets: packets_for(total_bytes) as u32,
            // Grown packet by packet; the announced size is untrusted.
            data: Vec::new(),
            next_packet: 1,
            burst_remaining: 0,
            data_packet_offset: 0,
            dpo_pending: false,
            max_per_cts,
            deadline: None,
            last_activity: now,
            endpoints,
            outcome: None,
            callback: None,
        }
    }

    #[inline]
    pub fn key(&self) -> SessionKey {
        self.key
    }

    #[inline]
    pub fn variant(&self) -> TransportVariant {
        self.variant
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn direction(&self) -> Direction {
        match self.state {
            SessionState::Send(_) => Direction::Send,
            SessionState::Receive(_) => Direction::Receive,
        }
    }

    #[inline]
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    #[inline]
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Packets fully sent or received so far.
    #[inline]
    pub fn packets_done(&self) -> u32 {
        self.next_packet - 1
    }

    #[inline]
    pub(super) fn is_sender(&self) -> bool {
        matches!(self.state, SessionState::Send(_))
    }

    #[inline]
    pub(super) fn is_connection(&self) -> bool {
        !matches!(self.variant, TransportVariant::Broadcast)
    }

    #[inline]
    pub(super) fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    pub(super) fn packets_remaining(&self) -> u32 {
        self.total_packets.saturating_sub(self.next_packet - 1)
    }

    /// Seven-byte slice carried by absolute packet `packet`, padded with `0xFF`.
    pub(super) fn packet_bytes(&self, packet: u32) -> [u8; BYTES_PER_TRANSPORT_PACKET] {
        let mut chunk = [0xFF; BYTES_PER_TRANSPORT_PACKET];
        let start = (packet as usize - 1) * BYTES_PER_TRANSPORT_PACKET;
        if start < self.data.len() {
            let end = (start + BYTES_PER_TRANSPORT_PACKET).min(self.data.len());
            chunk[..end - start].copy_from_slice(&self.data[start..end]);
        }
        chunk
    }

    /// Sequence number a data frame for `packet` carries on the wire.
    #[inline]
    pub(super) fn wire_sequence(&self, packet: u32) -> u8 {
        (packet - self.data_packet_offset) as u8
    }

    /// Append the useful part of a received data frame. Returns `false` when the frame
    /// is shorter than the bytes it is expected to carry.
    pub(super) fn store_packet(&mut self, bytes: &[u8]) -> bool {
        let needed = (self.total_bytes - self.data.len()).min(BYTES_PER_TRANSPORT_PACKET);
        if bytes.len() < needed {
            return false;
        }
        self.data.extend_from_slice(&bytes[..needed]);
        true
    }

    pub(super) fn finish(&mut self, outcome: Result<(), TransferError>) {
        self.state = match (self.state, outcome.is_ok()) {
            (SessionState::Send(_), true) => SessionState::Send(SenderState::Complete),
            (SessionState::Send(_), false) => SessionState::Send(SenderState::Aborted),
            (SessionState::Receive(_), true) => SessionState::Receive(ReceiverState::Complete),
            (SessionState::Receive(_), false) => SessionState::Receive(ReceiverState::Aborted),
        };
        self.deadline = None;
        self.outcome = Some(outcome);
    }
}

impl core::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransportSession")
            .field("variant", &self.variant)
            .field("key", &self.key)
            .field("state", &self.state)
            .field("total_bytes", &self.total_bytes)
            .field("next_packet", &self.next_packet)
            .field("deadline", &self.deadline)
            .finish()
    }
}
