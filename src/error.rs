//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (CAN ID construction,
//! control function registration, send rejection, transfer failure, bus pumping).
use crate::protocol::transport::transport_protocol::AbortReason;
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors that can occur while building a 29-bit CAN identifier.
pub enum CanIdBuildError {
    /// Provided parameters do not produce a valid identifier.
    #[error("Invalid data")]
    InvalidData,
    /// The destination address violates protocol constraints.
    #[error("Invalid destination")]
    InvalidDestination,
    /// Attempt to build a broadcast message (PDU2) with PF < 240.
    #[error("Invalid for broadcast message: PF is too low")]
    InvalidForBroadcast,
    /// Attempt to send an addressed message (PDU1) with PF ≥ 240.
    #[error("Invalid for addressed message: PF is too high: {pgn}")]
    InvalidForFocusedMessage { pgn: u8 },
    /// In PDU1 the lower 8 bits of the PGN must remain zero.
    #[error("PDU1 PGNs require PS = 0")]
    PsFocusMessageMustBeNull,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors raised while registering a control function with the registry.
pub enum RegistrationError {
    /// The preferred address lies outside 0..=253.
    #[error("Invalid preferred address {address}")]
    InvalidPreferredAddress { address: u8 },
    /// Another internal control function already owns this NAME.
    #[error("NAME {name:#X} is already registered")]
    DuplicateName { name: u64 },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Immediate rejections returned by a send call.
pub enum SendError {
    /// The handle does not designate an internal control function.
    #[error("Source is not an internal control function")]
    SourceNotInternal,
    /// The internal control function does not currently hold a claimed address.
    #[error("Source has no claimed address")]
    SourceNotClaimed,
    /// The destination handle is stale, deactivated or has no valid address.
    #[error("Destination is unavailable")]
    DestinationUnavailable,
    /// Nothing to send.
    #[error("Payload is empty")]
    EmptyPayload,
    /// Priorities are 3-bit values, 0 (highest) to 7.
    #[error("Invalid priority {priority}, expected 0-7")]
    InvalidPriority { priority: u8 },
    /// The payload exceeds the largest transfer the stack will carry.
    #[error("Payload of {len} bytes exceeds the {max} bytes ceiling")]
    PayloadTooLarge { len: usize, max: usize },
    /// A transport session with the same peer pair is already running.
    #[error("A transport session with this peer is already active")]
    AlreadyInSession,
    /// The connection session table is full.
    #[error("Transport session limit reached")]
    SessionLimitReached,
    /// Unable to build the CAN identifier.
    #[error(transparent)]
    Build(#[from] CanIdBuildError),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Asynchronous failure of an accepted multi-frame send, reported to its completion callback.
pub enum TransferError {
    /// The receiving node aborted the session.
    #[error("Aborted by peer: {0:?}")]
    AbortedByPeer(AbortReason),
    /// The local engine aborted the session (timeout, protocol violation).
    #[error("Aborted locally: {0:?}")]
    AbortedLocally(AbortReason),
    /// One of the session endpoints lost its address or was deactivated.
    #[error("Control function lost during transfer")]
    ControlFunctionLost,
}

#[derive(Debug, Error)]
/// Errors surfaced by the async bus runner.
pub enum BusRunnerError<E: core::fmt::Debug> {
    /// The adapter failed to deliver a received frame.
    #[error("CAN bus receive error: {0:?}")]
    Receive(E),
    /// The adapter refused an outbound frame.
    #[error("CAN bus send error: {0:?}")]
    Send(E),
}
