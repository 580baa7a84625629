//! ISO 11783-3 multi-frame transport: BAM (broadcast), connection mode (RTS/CTS, up to
//! 1785 bytes) and extended transport (ETP, data packet offsets, beyond 1785 bytes).
//!
//! The wire layouts of the management frames live in [`control`], the per-transfer
//! state in [`session`] and the engine that drives them in [`manager`].
pub mod control;
pub mod manager;
pub mod session;

pub use manager::{
    OutboundTransfer, ReceivedTransfer, SessionInfo, TransferCallback, TransportProtocolManager,
};

use crate::protocol::managment::control_function::ControlFunctionHandle;

//==================================================================================ABORT_REASON
/// Connection abort reasons (byte 1 of a TP.CM / ETP.CM abort frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AbortReason {
    /// 1: the node is already in a session with this peer and cannot open another one.
    AlreadyInSession,
    /// 2: system resources were needed for another task.
    ResourcesUnavailable,
    /// 3: a protocol timer expired.
    Timeout,
    /// 4: Clear-To-Send received while a data burst was being sent.
    ClearToSendWhileTransmitting,
    /// 5: maximum retransmit request limit reached.
    MaxRetransmitRequestsReached,
    /// 6: unexpected data transfer packet.
    UnexpectedDataTransfer,
    /// 7: bad sequence number.
    BadSequenceNumber,
    /// 8: duplicate sequence number.
    DuplicateSequenceNumber,
    /// 9: total message size is above the accepted ceiling.
    MessageTooLarge,
    /// 10: unexpected Data Packet Offset (extended transport).
    UnexpectedDataPacketOffset,
    /// 11: bad Data Packet Offset.
    BadDataPacketOffset,
    /// 12: Data Packet Offset carried an unexpected PGN.
    UnexpectedDataPacketOffsetPgn,
    /// 250: any other error.
    AnyOtherError,
    /// Reserved or vendor-specific code.
    Reserved(u8),
}

impl AbortReason {
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::AlreadyInSession,
            2 => Self::ResourcesUnavailable,
            3 => Self::Timeout,
            4 => Self::ClearToSendWhileTransmitting,
            5 => Self::MaxRetransmitRequestsReached,
            6 => Self::UnexpectedDataTransfer,
            7 => Self::BadSequenceNumber,
            8 => Self::DuplicateSequenceNumber,
            9 => Self::MessageTooLarge,
            10 => Self::UnexpectedDataPacketOffset,
            11 => Self::BadDataPacketOffset,
            12 => Self::UnexpectedDataPacketOffsetPgn,
            250 => Self::AnyOtherError,
            other => Self::Reserved(other),
        }
    }

    pub const fn code(&self) -> u8 {
        match self {
            Self::AlreadyInSession => 1,
            Self::ResourcesUnavailable => 2,
            Self::Timeout => 3,
            Self::ClearToSendWhileTransmitting => 4,
            Self::MaxRetransmitRequestsReached => 5,
            Self::UnexpectedDataTransfer => 6,
            Self::BadSequenceNumber => 7,
            Self::DuplicateSequenceNumber => 8,
            Self::MessageTooLarge => 9,
            Self::UnexpectedDataPacketOffset => 10,
            Self::BadDataPacketOffset => 11,
            Self::UnexpectedDataPacketOffsetPgn => 12,
            Self::AnyOtherError => 250,
            Self::Reserved(code) => *code,
        }
    }
}

impl From<u8> for AbortReason {
    fn from(code: u8) -> Self {
        Self::from_code(code)
    }
}

impl From<AbortReason> for u8 {
    fn from(reason: AbortReason) -> Self {
        reason.code()
    }
}

//==================================================================================SESSION_TYPES
/// Transport flavour of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportVariant {
    /// Broadcast Announce Message: connectionless, paced, no acknowledgement.
    Broadcast,
    /// Point-to-point RTS/CTS transfer of up to 1785 bytes.
    ConnectionMode,
    /// Point-to-point extended transfer with data packet offsets.
    Extended,
}

impl TransportVariant {
    #[inline]
    pub const fn is_extended(&self) -> bool {
        matches!(self, Self::Extended)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Send,
    Receive,
}

/// Sender side lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SenderState {
    /// Created, announcement not emitted yet.
    None,
    WaitingClearToSend,
    SendingData,
    WaitingEndOfMessageAck,
    Complete,
    Aborted,
}

/// Receiver side lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiverState {
    None,
    WaitingData,
    ReceivingData,
    Complete,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Send(SenderState),
    Receive(ReceiverState),
}

impl SessionState {
    /// `true` once the session reached `Complete` or `Aborted`.
    pub const fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::Send(SenderState::Complete | SenderState::Aborted)
                | Self::Receive(ReceiverState::Complete | ReceiverState::Aborted)
        )
    }
}

/// Identity of a session. `destination` is the global address for BAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionKey {
    pub channel: u8,
    pub source: u8,
    pub destination: u8,
    pub pgn: u32,
}

impl SessionKey {
    /// `true` when both keys use the same data channel (same bus, same ordered pair).
    #[inline]
    pub const fn same_pair(&self, other: &SessionKey) -> bool {
        self.channel == other.channel
            && self.source == other.source
            && self.destination == other.destination
    }
}

/// Seam used to revalidate the control functions bound to sessions on every update.
pub trait AddressResolver {
    /// Address currently claimed by `handle`, or `None` when it holds no valid address.
    fn claimed_address(&self, handle: ControlFunctionHandle) -> Option<u8>;
}
