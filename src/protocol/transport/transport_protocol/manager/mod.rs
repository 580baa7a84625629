//! Transport engine: owns every BAM, connection-mode and extended session, turns
//! outbound payloads into announce/data frames and rebuilds inbound payloads.
//!
//! The manager never touches the bus. Frames to transmit are appended to the `out`
//! queue handed to [`process_frame`](TransportProtocolManager::process_frame) and
//! [`update`](TransportProtocolManager::update); completed inbound payloads are returned
//! as [`ReceivedTransfer`]s. Outbound outcomes are reported through the optional
//! [`TransferCallback`] once the session is reaped.
use super::control::{ControlMessage, NO_CTS_LIMIT};
use super::session::{Endpoints, TransportSession};
use super::{
    AbortReason, AddressResolver, Direction, ReceiverState, SenderState, SessionKey,
    SessionState, TransportVariant,
};
use crate::config::TransportConfig;
use crate::core::{
    CAN_DATA_LENGTH, DEFAULT_PRIORITY, ETP_CONNECTION_MANAGEMENT_PGN, ETP_DATA_TRANSFER_PGN,
    GLOBAL_ADDRESS, MAX_TP_PAYLOAD, TP_CONNECTION_MANAGEMENT_PGN, TP_DATA_TRANSFER_PGN,
    TRANSPORT_DATA_PRIORITY, packets_for,
};
use crate::error::{SendError, TransferError};
use crate::protocol::managment::control_function::ControlFunctionHandle;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;
use alloc::{boxed::Box, collections::VecDeque, vec::Vec};
use embassy_time::Instant;

/// Invoked once with the final outcome of an accepted multi-frame send.
pub type TransferCallback = Box<dyn FnOnce(Result<(), TransferError>)>;

//==================================================================================PUBLIC_TYPES
/// Multi-frame payload handed over by the network manager.
pub struct OutboundTransfer {
    pub channel: u8,
    pub pgn: u32,
    pub priority: u8,
    pub source: ControlFunctionHandle,
    pub source_address: u8,
    /// `None` for a broadcast (BAM).
    pub destination: Option<(ControlFunctionHandle, u8)>,
    pub data: Vec<u8>,
    pub callback: Option<TransferCallback>,
}

/// Payload rebuilt from a completed inbound session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedTransfer {
    pub variant: TransportVariant,
    pub key: SessionKey,
    pub data: Vec<u8>,
    pub timestamp: Instant,
}

/// Diagnostic snapshot of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub key: SessionKey,
    pub variant: TransportVariant,
    pub direction: Direction,
    pub state: SessionState,
    pub total_bytes: usize,
    pub packets_done: u32,
    pub last_activity: Instant,
}

impl From<&TransportSession> for SessionInfo {
    fn from(session: &TransportSession) -> Self {
        Self {
            key: session.key(),
            variant: session.variant(),
            direction: session.direction(),
            state: session.state(),
            total_bytes: session.total_bytes(),
            packets_done: session.packets_done(),
            last_activity: session.last_activity(),
        }
    }
}

//==================================================================================MANAGER
/// Session arena plus the state machines driving it.
pub struct TransportProtocolManager {
    config: TransportConfig,
    sessions: Vec<Option<TransportSession>>,
}

impl Default for TransportProtocolManager {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl TransportProtocolManager {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            sessions: Vec::new(),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Snapshot of every live session.
    pub fn sessions(&self) -> impl Iterator<Item = SessionInfo> + '_ {
        self.sessions.iter().flatten().map(SessionInfo::from)
    }

    /// Looks up a live session by key and direction.
    pub fn session(&self, key: &SessionKey, direction: Direction) -> Option<SessionInfo> {
        self.sessions
            .iter()
            .flatten()
            .find(|s| s.key() == *key && s.direction() == direction)
            .map(SessionInfo::from)
    }

    /// Connection-mode and extended sessions currently counted against the limit.
    pub fn connection_sessions(&self) -> usize {
        self.sessions
            .iter()
            .flatten()
            .filter(|s| s.is_connection() && !s.is_finished())
            .count()
    }

    //==================================================================================SEND
    /// Accept an outbound payload. Broadcasts use BAM (up to 1785 bytes); addressed
    /// payloads use connection mode up to 1785 bytes and extended transport beyond, up
    /// to the configured ceiling. The announcement goes out on the next
    /// [`update`](Self::update).
    pub fn send(&mut self, transfer: OutboundTransfer, now: Instant) -> Result<(), SendError> {
        let len = transfer.data.len();
        if len == 0 {
            return Err(SendError::EmptyPayload);
        }

        let (variant, destination) = match transfer.destination {
            None => {
                if len > MAX_TP_PAYLOAD {
                    return Err(SendError::PayloadTooLarge {
                        len,
                        max: MAX_TP_PAYLOAD,
                    });
                }
                (TransportVariant::Broadcast, GLOBAL_ADDRESS)
            }
            Some((_, address)) => {
                let max = self.config.max_extended_payload.max(MAX_TP_PAYLOAD);
                if len > max {
                    return Err(SendError::PayloadTooLarge { len, max });
                }
                let variant = if len <= MAX_TP_PAYLOAD {
                    TransportVariant::ConnectionMode
                } else {
                    TransportVariant::Extended
                };
                (variant, address)
            }
        };

        let key = SessionKey {
            channel: transfer.channel,
            source: transfer.source_address,
            destination,
            pgn: transfer.pgn,
        };

        if self
            .sessions
            .iter()
            .flatten()
            .any(|s| s.is_sender() && !s.is_finished() && s.key().same_pair(&key))
        {
            return Err(SendError::AlreadyInSession);
        }
        if variant != TransportVariant::Broadcast
            && self.connection_sessions() >= self.config.max_sessions
        {
            return Err(SendError::SessionLimitReached);
        }

        #[cfg(feature = "defmt")]
        defmt::debug!("TP send {} bytes, {:?}", len, key);

        let endpoints = Endpoints {
            local: (transfer.source, transfer.source_address),
            remote: transfer.destination,
        };
        self.insert(TransportSession::outgoing(
            variant,
            key,
            transfer.priority,
            transfer.data,
            endpoints,
            transfer.callback,
            now,
        ));
        Ok(())
    }

    //==================================================================================RECEIVE
    /// Feed one received TP.CM, TP.DT, ETP.CM or ETP.DT frame.
    ///
    /// Management frames must carry eight bytes; anything else is dropped without effect,
    /// as are data frames that match no active session.
    pub fn process_frame(
        &mut self,
        frame: &CanFrame,
        now: Instant,
        out: &mut VecDeque<CanFrame>,
    ) -> Option<ReceivedTransfer> {
        self.process_addressed_frame(frame, None, now, out)
    }

    /// Same as [`process_frame`](Self::process_frame) with `local`, the internal control
    /// function holding the frame's destination address. A receive session opened by the
    /// frame is bound to it and dropped without any frame on the next
    /// [`update`](Self::update) where `local` no longer holds that address.
    pub fn process_addressed_frame(
        &mut self,
        frame: &CanFrame,
        local: Option<ControlFunctionHandle>,
        now: Instant,
        out: &mut VecDeque<CanFrame>,
    ) -> Option<ReceivedTransfer> {
        let pgn = frame.id.pgn();
        let received = match pgn {
            TP_CONNECTION_MANAGEMENT_PGN | ETP_CONNECTION_MANAGEMENT_PGN => {
                let extended = pgn == ETP_CONNECTION_MANAGEMENT_PGN;
                if frame.len == CAN_DATA_LENGTH {
                    if let Some(message) = ControlMessage::decode(extended, frame.payload()) {
                        self.on_control(frame, message, extended, local, now, out);
                    }
                }
                None
            }
            TP_DATA_TRANSFER_PGN | ETP_DATA_TRANSFER_PGN => {
                self.on_data(frame, pgn == ETP_DATA_TRANSFER_PGN, now, out)
            }
            _ => None,
        };
        self.reap();
        received
    }

    fn on_control(
        &mut self,
        frame: &CanFrame,
        message: ControlMessage,
        extended: bool,
        local: Option<ControlFunctionHandle>,
        now: Instant,
        out: &mut VecDeque<CanFrame>,
    ) {
        let channel = frame.channel;
        let source = frame.id.source_address();
        let destination = frame.id.destination_address();

        match message {
            ControlMessage::BroadcastAnnounce { size, packets, pgn } => {
                if destination == GLOBAL_ADDRESS {
                    self.on_broadcast_announce(channel, source, size, packets, pgn, now);
                }
            }
            ControlMessage::RequestToSend {
                size,
                packets,
                max_per_cts,
                pgn,
            } => {
                if destination != GLOBAL_ADDRESS {
                    let key = SessionKey {
                        channel,
                        source,
                        destination,
                        pgn,
                    };
                    let endpoints = local.map(|handle| Endpoints {
                        local: (handle, destination),
                        remote: None,
                    });
                    self.on_request_to_send(
                        key,
                        size,
                        packets,
                        max_per_cts,
                        extended,
                        endpoints,
                        now,
                        out,
                    );
                }
            }
            ControlMessage::ClearToSend {
                packets,
                next_packet,
                pgn,
            } => {
                let config = self.config;
                let Some(session) = self.sessions.iter_mut().flatten().find(|s| {
                    s.is_sender()
                        && !s.is_finished()
                        && s.variant().is_extended() == extended
                        && s.is_connection()
                        && s.key().channel == channel
                        && s.key().source == destination
                        && s.key().destination == source
                        && s.key().pgn == pgn
                }) else {
                    return;
                };
                on_clear_to_send(&config, session, packets, next_packet, now, out);
            }
            ControlMessage::DataPacketOffset {
                packets,
                offset,
                pgn,
            } => {
                let config = self.config;
                let Some(session) = self.sessions.iter_mut().flatten().find(|s| {
                    !s.is_sender()
                        && !s.is_finished()
                        && s.variant().is_extended()
                        && s.key().channel == channel
                        && s.key().source == source
                        && s.key().destination == destination
                }) else {
                    return;
                };
                on_data_packet_offset(&config, session, packets, offset, pgn, now, out);
            }
            ControlMessage::EndOfMessageAck { pgn, .. } => {
                if let Some(session) = self.sessions.iter_mut().flatten().find(|s| {
                    s.state() == SessionState::Send(SenderState::WaitingEndOfMessageAck)
                        && s.variant().is_extended() == extended
                        && s.key().channel == channel
                        && s.key().source == destination
                        && s.key().destination == source
                        && s.key().pgn == pgn
                }) {
                    #[cfg(feature = "defmt")]
                    defmt::debug!("TP send complete {:?}", session.key());
                    session.finish(Ok(()));
                }
            }
            ControlMessage::Abort { reason, pgn } => {
                for session in self.sessions.iter_mut().flatten() {
                    let key = session.key();
                    let peer_matches = if session.is_sender() {
                        key.source == destination && key.destination == source
                    } else {
                        key.source == source && key.destination == destination
                    };
                    if session.is_connection()
                        && !session.is_finished()
                        && key.channel == channel
                        && key.pgn == pgn
                        && peer_matches
                    {
                        #[cfg(feature = "defmt")]
                        defmt::warn!("TP session aborted by peer: {:?}", reason);
                        session.finish(Err(TransferError::AbortedByPeer(reason)));
                    }
                }
            }
        }
    }

    fn on_broadcast_announce(
        &mut self,
        channel: u8,
        source: u8,
        size: u32,
        packets: u32,
        pgn: u32,
        now: Instant,
    ) {
        let size = size as usize;
        if size == 0 || size > MAX_TP_PAYLOAD || packets as usize != packets_for(size) {
            #[cfg(feature = "defmt")]
            defmt::debug!("Ignoring inconsistent BAM from {}", source);
            return;
        }
        let key = SessionKey {
            channel,
            source,
            destination: GLOBAL_ADDRESS,
            pgn,
        };

        // A new announcement from the same source replaces the running one.
        for slot in self.sessions.iter_mut() {
            if slot
                .as_ref()
                .is_some_and(|s| !s.is_sender() && s.key().same_pair(&key))
            {
                *slot = None;
            }
        }

        let mut session = TransportSession::incoming(
            TransportVariant::Broadcast,
            key,
            size,
            NO_CTS_LIMIT,
            None,
            now,
        );
        session.deadline = Some(now + self.config.t1);
        self.insert(session);
    }

    #[allow(clippy::too_many_arguments)]
    fn on_request_to_send(
        &mut self,
        key: SessionKey,
        size: u32,
        packets: u32,
        max_per_cts: u8,
        extended: bool,
        endpoints: Option<Endpoints>,
        now: Instant,
        out: &mut VecDeque<CanFrame>,
    ) {
        let size = size as usize;
        let reject = |reason: AbortReason, out: &mut VecDeque<CanFrame>| {
            #[cfg(feature = "defmt")]
            defmt::warn!("Rejecting RTS from {}: {:?}", key.source, reason);
            out.push_back(control_frame(
                DEFAULT_PRIORITY,
                key.channel,
                key.destination,
                key.source,
                ControlMessage::Abort {
                    reason,
                    pgn: key.pgn,
                },
                extended,
                now,
            ));
        };

        if self
            .sessions
            .iter()
            .flatten()
            .any(|s| !s.is_sender() && !s.is_finished() && s.key().same_pair(&key))
        {
            return reject(AbortReason::AlreadyInSession, out);
        }
        let ceiling = if extended {
            self.config.max_extended_payload
        } else {
            MAX_TP_PAYLOAD
        };
        if size > ceiling {
            return reject(AbortReason::MessageTooLarge, out);
        }
        if size == 0 || packets as usize != packets_for(size) {
            return reject(AbortReason::AnyOtherError, out);
        }
        if self.connection_sessions() >= self.config.max_sessions {
            return reject(AbortReason::ResourcesUnavailable, out);
        }

        let variant = if extended {
            TransportVariant::Extended
        } else {
            TransportVariant::ConnectionMode
        };
        let mut session =
            TransportSession::incoming(variant, key, size, max_per_cts, endpoints, now);
        grant_next_burst(&self.config, &mut session, now, out);

        #[cfg(feature = "defmt")]
        defmt::debug!("Accepted RTS {:?}, {} bytes", key, size);

        self.insert(session);
    }

    fn on_data(
        &mut self,
        frame: &CanFrame,
        extended: bool,
        now: Instant,
        out: &mut VecDeque<CanFrame>,
    ) -> Option<ReceivedTransfer> {
        let channel = frame.channel;
        let source = frame.id.source_address();
        let destination = frame.id.destination_address();
        let payload = frame.payload();
        if payload.is_empty() {
            return None;
        }

        let config = self.config;
        let session = self.sessions.iter_mut().flatten().find(|s| {
            !s.is_sender()
                && !s.is_finished()
                && s.variant().is_extended() == extended
                && s.key().channel == channel
                && s.key().source == source
                && s.key().destination == destination
        })?;

        if session.is_connection() && (session.burst_remaining == 0 || session.dpo_pending) {
            abort_session(session, AbortReason::UnexpectedDataTransfer, now, out);
            return None;
        }

        if payload[0] != session.wire_sequence(session.next_packet) {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "Bad sequence {} from {}, expected packet {}",
                payload[0],
                source,
                session.next_packet
            );
            abort_session(session, AbortReason::BadSequenceNumber, now, out);
            return None;
        }
        if !session.store_packet(&payload[1..]) {
            return None;
        }

        session.next_packet += 1;
        session.last_activity = now;
        session.state = SessionState::Receive(ReceiverState::ReceivingData);
        if session.is_connection() {
            session.burst_remaining -= 1;
        }

        if session.packets_remaining() == 0 {
            let key = session.key();
            if session.is_connection() {
                out.push_back(control_frame(
                    session.priority,
                    key.channel,
                    key.destination,
                    key.source,
                    ControlMessage::EndOfMessageAck {
                        size: session.total_bytes as u32,
                        packets: session.total_packets,
                        pgn: key.pgn,
                    },
                    extended,
                    now,
                ));
            }
            session.finish(Ok(()));

            #[cfg(feature = "defmt")]
            defmt::info!("TP receive complete {:?}, {} bytes", key, session.total_bytes);

            return Some(ReceivedTransfer {
                variant: session.variant(),
                key,
                data: core::mem::take(&mut session.data),
                timestamp: now,
            });
        }

        if session.is_connection() && session.burst_remaining == 0 {
            grant_next_burst(&config, session, now, out);
        } else {
            session.deadline = Some(now + config.t1);
        }
        None
    }

    //==================================================================================UPDATE
    /// Emit due announcements and data frames, expire timers, revalidate the control
    /// functions bound to each session and reap finished sessions.
    ///
    /// A session whose bound control function lost its address finishes without a frame:
    /// that address may already belong to another node.
    pub fn update<R: AddressResolver + ?Sized>(
        &mut self,
        now: Instant,
        resolver: &R,
        out: &mut VecDeque<CanFrame>,
    ) {
        let config = self.config;
        for session in self.sessions.iter_mut().flatten() {
            if session.is_finished() {
                continue;
            }
            if let Some(endpoints) = session.endpoints {
                if !endpoints_claimed(resolver, &endpoints) {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("TP endpoint lost, dropping {:?}", session.key());
                    session.finish(Err(TransferError::ControlFunctionLost));
                    continue;
                }
            }

            let expired = session.deadline.is_some_and(|deadline| now >= deadline);
            match session.state() {
                SessionState::Send(SenderState::None) => announce(&config, session, now, out),
                SessionState::Send(SenderState::SendingData) => {
                    if session.is_connection() {
                        send_burst(&config, session, now, out);
                    } else if expired {
                        send_broadcast_packet(&config, session, now, out);
                    }
                }
                _ if expired => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("TP session timed out {:?}", session.key());
                    abort_session(session, AbortReason::Timeout, now, out);
                }
                _ => {}
            }
        }
        self.reap();
    }

    //==================================================================================ARENA
    fn insert(&mut self, session: TransportSession) {
        match self.sessions.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => *slot = Some(session),
            None => self.sessions.push(Some(session)),
        }
    }

    /// Free finished sessions and hand their outcome to the send callbacks.
    fn reap(&mut self) {
        for slot in self.sessions.iter_mut() {
            if !slot.as_ref().is_some_and(TransportSession::is_finished) {
                continue;
            }
            if let Some(mut session) = slot.take() {
                let outcome = session.outcome.take().unwrap_or(Ok(()));
                if let Some(callback) = session.callback.take() {
                    callback(outcome);
                }
            }
        }
    }
}

//==================================================================================STATE_MACHINE
fn announce(
    config: &TransportConfig,
    session: &mut TransportSession,
    now: Instant,
    out: &mut VecDeque<CanFrame>,
) {
    let key = session.key();
    let extended = session.variant().is_extended();
    let message = if session.is_connection() {
        ControlMessage::RequestToSend {
            size: session.total_bytes as u32,
            packets: session.total_packets,
            max_per_cts: config.packets_per_cts.max(1),
            pgn: key.pgn,
        }
    } else {
        ControlMessage::BroadcastAnnounce {
            size: session.total_bytes as u32,
            packets: session.total_packets,
            pgn: key.pgn,
        }
    };
    out.push_back(control_frame(
        session.priority,
        key.channel,
        key.source,
        key.destination,
        message,
        extended,
        now,
    ));

    if session.is_connection() {
        session.state = SessionState::Send(SenderState::WaitingClearToSend);
        session.deadline = Some(now + config.t3);
    } else {
        session.state = SessionState::Send(SenderState::SendingData);
        session.deadline = Some(now + config.bam_interval);
    }
}

fn send_broadcast_packet(
    config: &TransportConfig,
    session: &mut TransportSession,
    now: Instant,
    out: &mut VecDeque<CanFrame>,
) {
    out.push_back(data_frame(session, session.next_packet, now));
    session.next_packet += 1;
    session.last_activity = now;
    if session.packets_remaining() == 0 {
        session.finish(Ok(()));
    } else {
        session.deadline = Some(now + config.bam_interval);
    }
}

fn send_burst(
    config: &TransportConfig,
    session: &mut TransportSession,
    now: Instant,
    out: &mut VecDeque<CanFrame>,
) {
    let key = session.key();
    if session.dpo_pending {
        let offset = session.next_packet - 1;
        out.push_back(control_frame(
            session.priority,
            key.channel,
            key.source,
            key.destination,
            ControlMessage::DataPacketOffset {
                packets: session.burst_remaining as u8,
                offset,
                pgn: key.pgn,
            },
            true,
            now,
        ));
        session.data_packet_offset = offset;
        session.dpo_pending = false;
    }

    while session.burst_remaining > 0 && session.packets_remaining() > 0 {
        out.push_back(data_frame(session, session.next_packet, now));
        session.next_packet += 1;
        session.burst_remaining -= 1;
    }
    session.burst_remaining = 0;
    session.last_activity = now;
    session.state = if session.packets_remaining() == 0 {
        SessionState::Send(SenderState::WaitingEndOfMessageAck)
    } else {
        SessionState::Send(SenderState::WaitingClearToSend)
    };
    session.deadline = Some(now + config.t3);
}

fn on_clear_to_send(
    config: &TransportConfig,
    session: &mut TransportSession,
    packets: u8,
    next_packet: u32,
    now: Instant,
    out: &mut VecDeque<CanFrame>,
) {
    match session.state() {
        SessionState::Send(SenderState::SendingData) => {
            abort_session(session, AbortReason::ClearToSendWhileTransmitting, now, out);
        }
        SessionState::Send(
            SenderState::WaitingClearToSend | SenderState::WaitingEndOfMessageAck,
        ) => {
            if packets == 0 {
                // Hold: every repeated hold restarts T4.
                session.state = SessionState::Send(SenderState::WaitingClearToSend);
                session.deadline = Some(now + config.t4);
                return;
            }
            if next_packet == 0 || next_packet > session.total_packets {
                abort_session(session, AbortReason::AnyOtherError, now, out);
                return;
            }
            session.next_packet = next_packet;
            session.burst_remaining = (packets as u32).min(session.packets_remaining());
            session.dpo_pending = session.variant().is_extended();
            session.state = SessionState::Send(SenderState::SendingData);
            session.deadline = None;
        }
        _ => {}
    }
}

fn on_data_packet_offset(
    config: &TransportConfig,
    session: &mut TransportSession,
    packets: u8,
    offset: u32,
    pgn: u32,
    now: Instant,
    out: &mut VecDeque<CanFrame>,
) {
    if !session.dpo_pending {
        abort_session(session, AbortReason::UnexpectedDataPacketOffset, now, out);
    } else if pgn != session.key().pgn {
        abort_session(session, AbortReason::UnexpectedDataPacketOffsetPgn, now, out);
    } else if offset != session.next_packet - 1
        || packets == 0
        || packets as u32 > session.burst_remaining
    {
        abort_session(session, AbortReason::BadDataPacketOffset, now, out);
    } else {
        session.data_packet_offset = offset;
        session.burst_remaining = packets as u32;
        session.dpo_pending = false;
        session.deadline = Some(now + config.t1);
    }
}

/// Receiver side: send the next CTS and arm T2. Extended sessions then wait for a DPO.
fn grant_next_burst(
    config: &TransportConfig,
    session: &mut TransportSession,
    now: Instant,
    out: &mut VecDeque<CanFrame>,
) {
    let mut packets = (config.packets_per_cts.max(1) as u32).min(session.packets_remaining());
    if session.max_per_cts != NO_CTS_LIMIT {
        packets = packets.min(session.max_per_cts.max(1) as u32);
    }
    let key = session.key();
    let extended = session.variant().is_extended();
    out.push_back(control_frame(
        session.priority,
        key.channel,
        key.destination,
        key.source,
        ControlMessage::ClearToSend {
            packets: packets as u8,
            next_packet: session.next_packet,
            pgn: key.pgn,
        },
        extended,
        now,
    ));
    session.burst_remaining = packets;
    session.dpo_pending = extended;
    session.state = SessionState::Receive(ReceiverState::WaitingData);
    session.deadline = Some(now + config.t2);
}

/// Finish `session` as locally aborted. Connection sessions notify the peer with exactly
/// one abort frame; broadcast sessions are dropped silently.
fn abort_session(
    session: &mut TransportSession,
    reason: AbortReason,
    now: Instant,
    out: &mut VecDeque<CanFrame>,
) {
    if session.is_connection() {
        let key = session.key();
        let (from, to) = if session.is_sender() {
            (key.source, key.destination)
        } else {
            (key.destination, key.source)
        };
        out.push_back(control_frame(
            session.priority,
            key.channel,
            from,
            to,
            ControlMessage::Abort {
                reason,
                pgn: key.pgn,
            },
            session.variant().is_extended(),
            now,
        ));
    }
    session.finish(Err(TransferError::AbortedLocally(reason)));
}

fn endpoints_claimed<R: AddressResolver + ?Sized>(resolver: &R, endpoints: &Endpoints) -> bool {
    let (local, local_address) = endpoints.local;
    if resolver.claimed_address(local) != Some(local_address) {
        return false;
    }
    match endpoints.remote {
        Some((destination, address)) => resolver.claimed_address(destination) == Some(address),
        None => true,
    }
}

//==================================================================================FRAMES
fn control_frame(
    priority: u8,
    channel: u8,
    source: u8,
    destination: u8,
    message: ControlMessage,
    extended: bool,
    now: Instant,
) -> CanFrame {
    let pgn = if extended {
        ETP_CONNECTION_MANAGEMENT_PGN
    } else {
        TP_CONNECTION_MANAGEMENT_PGN
    };
    CanFrame::new(
        CanId::encode(priority, pgn, destination, source),
        &message.encode(extended),
    )
    .on_channel(channel)
    .at(now)
}

fn data_frame(session: &TransportSession, packet: u32, now: Instant) -> CanFrame {
    let key = session.key();
    let pgn = if session.variant().is_extended() {
        ETP_DATA_TRANSFER_PGN
    } else {
        TP_DATA_TRANSFER_PGN
    };
    let mut payload = [0xFF; CAN_DATA_LENGTH];
    payload[0] = session.wire_sequence(packet);
    payload[1..].copy_from_slice(&session.packet_bytes(packet));
    CanFrame::new(
        CanId::encode(TRANSPORT_DATA_PRIORITY, pgn, key.destination, key.source),
        &payload,
    )
    .on_channel(key.channel)
    .at(now)
}
