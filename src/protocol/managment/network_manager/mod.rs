//! Single dispatch point of the stack.
//!
//! The [`NetworkManager`] owns the control function registry and the transport engine,
//! routes every received frame to the address-claim machinery, the transport engine or
//! the listeners, and routes outbound messages to a single frame or a transport session.
//! Frames to transmit accumulate in an internal queue drained by
//! [`pop_transmit_frame`](NetworkManager::pop_transmit_frame) or
//! [`service`](NetworkManager::service).
//!
//! Nothing here reads a clock: every entry point takes the current `Instant`, and all
//! callbacks run synchronously inside those calls.
use crate::config::NetworkConfig;
use crate::core::{
    is_transport_pgn, ADDRESS_CLAIM_PGN, CAN_DATA_LENGTH, DEFAULT_PRIORITY, GLOBAL_ADDRESS,
    MAX_PRIORITY, REQUEST_PGN,
};
use crate::error::{RegistrationError, SendError};
use crate::protocol::managment::address_claiming::{extract_name_from_claim, requested_pgn};
use crate::protocol::managment::bus_supervisor::BusQueues;
use crate::protocol::managment::control_function::{
    ControlFunction, ControlFunctionHandle, ControlFunctionKind, ControlFunctionRegistry,
};
use crate::protocol::managment::iso_name::{IsoName, NameFilter};
use crate::protocol::messages::{
    ControlFunctionEventCallback, Destination, ListenerId, Message, MessageCallback,
    MessageFilter, OutgoingMessage,
};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanId;
use crate::protocol::transport::transport_protocol::{
    AddressResolver, OutboundTransfer, ReceivedTransfer, TransferCallback,
    TransportProtocolManager,
};
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;

struct Listener {
    id: ListenerId,
    pgn: u32,
    filter: MessageFilter,
    callback: MessageCallback,
}

/// Explicit context object holding the whole protocol state of one stack.
pub struct NetworkManager {
    config: NetworkConfig,
    registry: ControlFunctionRegistry,
    transport: TransportProtocolManager,
    listeners: Vec<Listener>,
    next_listener: usize,
    event_listeners: Vec<ControlFunctionEventCallback>,
    outbox: VecDeque<CanFrame>,
    now: Instant,
}

impl Default for NetworkManager {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl NetworkManager {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            registry: ControlFunctionRegistry::new(config.claim_contention),
            transport: TransportProtocolManager::new(config.transport),
            listeners: Vec::new(),
            next_listener: 0,
            event_listeners: Vec::new(),
            outbox: VecDeque::new(),
            now: Instant::from_ticks(0),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Read access to the transport engine (session diagnostics).
    pub fn transport(&self) -> &TransportProtocolManager {
        &self.transport
    }

    //==================================================================================CONTROL_FUNCTIONS
    /// Register an internal control function on `channel`. The claim starts at the next
    /// [`update`](Self::update), after the NAME-derived settling delay.
    pub fn register_internal_control_function(
        &mut self,
        name: IsoName,
        preferred_address: u8,
        channel: u8,
    ) -> Result<ControlFunctionHandle, RegistrationError> {
        self.registry
            .register_internal(name, preferred_address, channel, self.now)
    }

    /// Register a remote node we want to talk to, identified by NAME filters.
    pub fn register_partnered_control_function(
        &mut self,
        channel: u8,
        filters: &[NameFilter],
    ) -> ControlFunctionHandle {
        self.registry.register_partner(channel, filters, self.now)
    }

    /// Drop a control function. Its handle stays valid but resolves to a deactivated
    /// record.
    pub fn deactivate_control_function(&mut self, handle: ControlFunctionHandle) -> bool {
        let removed = self.registry.deactivate(handle);
        self.dispatch_events();
        removed
    }

    pub fn control_function(&self, handle: ControlFunctionHandle) -> Option<&ControlFunction> {
        self.registry.get(handle)
    }

    /// Control function holding `address` on `channel`.
    pub fn control_function_at(&self, channel: u8, address: u8) -> Option<ControlFunctionHandle> {
        self.registry.lookup(channel, address)
    }

    /// Address of `handle` if it is currently claimed.
    pub fn claimed_address(&self, handle: ControlFunctionHandle) -> Option<u8> {
        self.registry.claimed_address(handle)
    }

    /// Re-broadcast the claims of every internal control function.
    pub fn request_address_claim(&mut self) {
        self.registry.request_address_claim(self.now, &mut self.outbox);
    }

    //==================================================================================LISTENERS
    /// Call `callback` for every complete message of `pgn` accepted by `filter`.
    /// Listeners of the same PGN run in registration order.
    pub fn register_listener(
        &mut self,
        pgn: u32,
        filter: MessageFilter,
        callback: MessageCallback,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push(Listener {
            id,
            pgn,
            filter,
            callback,
        });
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|listener| listener.id != id);
        self.listeners.len() != before
    }

    /// Call `callback` on claimed, cannot-claim and deactivated events.
    pub fn add_control_function_listener(&mut self, callback: ControlFunctionEventCallback) {
        self.event_listeners.push(callback);
    }

    //==================================================================================RECEIVE
    /// Route one received frame.
    pub fn process_receive_frame(&mut self, frame: &CanFrame, now: Instant) {
        self.advance(now);
        if !frame.is_well_formed() || frame.len == 0 {
            #[cfg(feature = "defmt")]
            defmt::trace!("Dropping malformed frame {:X}", frame.id.0);
            return;
        }

        let channel = frame.channel;
        let source = frame.id.source_address();
        let destination = frame.id.destination_address();
        let pgn = frame.id.pgn();

        if pgn == ADDRESS_CLAIM_PGN {
            if let Some(name) = extract_name_from_claim(frame) {
                self.registry
                    .observe_claim(channel, name, source, now, &mut self.outbox);
                self.dispatch_events();
            }
            return;
        }

        self.registry.note_activity(channel, source, now);

        if pgn == REQUEST_PGN && requested_pgn(frame) == Some(ADDRESS_CLAIM_PGN) {
            self.registry
                .respond_to_request(channel, destination, now, &mut self.outbox);
            return;
        }

        if is_transport_pgn(pgn) {
            if !self.accepts(channel, destination) {
                return;
            }
            let local = self.registry.internal_at(channel, destination);
            if let Some(transfer) =
                self.transport
                    .process_addressed_frame(frame, local, now, &mut self.outbox)
            {
                self.deliver_transfer(transfer);
            }
            return;
        }

        let Some(message) = self.message(
            channel,
            pgn,
            frame.id.priority(),
            source,
            destination,
            frame.payload().to_vec(),
            now,
        ) else {
            return;
        };
        self.dispatch(&message);
    }

    fn deliver_transfer(&mut self, transfer: ReceivedTransfer) {
        #[cfg(feature = "defmt")]
        defmt::debug!("Transfer complete: {:?}", transfer.key);
        let key = transfer.key;
        if let Some(message) = self.message(
            key.channel,
            key.pgn,
            DEFAULT_PRIORITY,
            key.source,
            key.destination,
            transfer.data,
            transfer.timestamp,
        ) {
            self.dispatch(&message);
        }
    }

    /// `true` for global traffic and traffic to one of our claimed addresses.
    fn accepts(&self, channel: u8, destination: u8) -> bool {
        destination == GLOBAL_ADDRESS || self.registry.internal_at(channel, destination).is_some()
    }

    /// Build the listener view of a payload, or `None` when the source is not claimed or
    /// the destination is not ours.
    #[allow(clippy::too_many_arguments)]
    fn message(
        &self,
        channel: u8,
        pgn: u32,
        priority: u8,
        source_address: u8,
        destination: u8,
        data: Vec<u8>,
        timestamp: Instant,
    ) -> Option<Message> {
        let source = self.registry.lookup(channel, source_address)?;
        if !self.registry.get(source).is_some_and(ControlFunction::is_claimed) {
            return None;
        }
        let destination = if destination == GLOBAL_ADDRESS {
            Destination::Global
        } else {
            Destination::ControlFunction {
                handle: self.registry.internal_at(channel, destination)?,
                address: destination,
            }
        };
        Some(Message {
            pgn,
            priority,
            source,
            source_address,
            destination,
            data,
            timestamp,
            channel,
        })
    }

    fn dispatch(&mut self, message: &Message) {
        for listener in self.listeners.iter_mut() {
            if listener.pgn == message.pgn && listener.filter.matches(message) {
                (listener.callback)(message);
            }
        }
    }

    fn dispatch_events(&mut self) {
        for event in self.registry.take_events() {
            for callback in self.event_listeners.iter_mut() {
                callback(&event);
            }
        }
    }

    //==================================================================================SEND
    /// Send `data` from internal control function `source`, broadcast when `destination`
    /// is `None`. `priority` ranges from 0 (highest) to 7; anything above is rejected.
    pub fn send_message(
        &mut self,
        source: ControlFunctionHandle,
        destination: Option<ControlFunctionHandle>,
        pgn: u32,
        priority: u8,
        data: &[u8],
    ) -> Result<(), SendError> {
        self.send_can_message(OutgoingMessage {
            source,
            destination,
            pgn,
            priority,
            data: data.to_vec(),
            callback: None,
        })
    }

    /// Same as [`send_message`](Self::send_message), with `callback` receiving the final
    /// outcome.
    pub fn send_message_with_callback(
        &mut self,
        source: ControlFunctionHandle,
        destination: Option<ControlFunctionHandle>,
        pgn: u32,
        priority: u8,
        data: &[u8],
        callback: TransferCallback,
    ) -> Result<(), SendError> {
        self.send_can_message(OutgoingMessage {
            source,
            destination,
            pgn,
            priority,
            data: data.to_vec(),
            callback: Some(callback),
        })
    }

    /// Validate a send request and queue it: up to eight bytes go out as one frame, larger
    /// payloads open a transport session.
    pub fn send_can_message(&mut self, request: OutgoingMessage) -> Result<(), SendError> {
        let source = self
            .registry
            .get(request.source)
            .filter(|cf| cf.kind() == ControlFunctionKind::Internal)
            .ok_or(SendError::SourceNotInternal)?;
        let channel = source.channel();
        let source_address = self.claimed_address(request.source).ok_or(SendError::SourceNotClaimed)?;

        let destination = match request.destination {
            None => None,
            Some(handle) => {
                let address = self
                    .registry
                    .get(handle)
                    .filter(|cf| cf.channel() == channel)
                    .and_then(|_| self.claimed_address(handle))
                    .ok_or(SendError::DestinationUnavailable)?;
                Some((handle, address))
            }
        };

        if request.data.is_empty() {
            return Err(SendError::EmptyPayload);
        }
        if request.priority > MAX_PRIORITY {
            return Err(SendError::InvalidPriority {
                priority: request.priority,
            });
        }

        if request.data.len() <= CAN_DATA_LENGTH {
            let mut builder = CanId::builder(request.pgn, source_address)
                .with_priority(request.priority);
            builder = match destination {
                Some((_, address)) => builder.to_destination(address),
                None if ((request.pgn >> 8) & 0xFF) < 240 => builder.to_destination(GLOBAL_ADDRESS),
                None => builder,
            };
            let id = builder.build()?;
            self.outbox.push_back(
                CanFrame::new(id, &request.data)
                    .on_channel(channel)
                    .at(self.now),
            );
            if let Some(callback) = request.callback {
                callback(Ok(()));
            }
            return Ok(());
        }

        self.transport.send(
            OutboundTransfer {
                channel,
                pgn: request.pgn,
                priority: request.priority,
                source: request.source,
                source_address,
                destination,
                data: request.data,
                callback: request.callback,
            },
            self.now,
        )
    }

    //==================================================================================UPDATE
    /// Drive claim timers, silence timeouts and transport sessions.
    pub fn update(&mut self, now: Instant) {
        self.advance(now);
        self.registry
            .update(now, self.config.control_function_timeout, &mut self.outbox);
        self.dispatch_events();
        self.transport.update(now, &self.registry, &mut self.outbox);
    }

    /// Next frame to put on the bus.
    pub fn pop_transmit_frame(&mut self) -> Option<CanFrame> {
        self.outbox.pop_front()
    }

    /// One cooperative step against the queues of a bus channel: drain received frames,
    /// run [`update`](Self::update), then move the frames of that channel to the transmit
    /// queue. Frames that do not fit stay queued for the next call.
    pub fn service<M: RawMutex, const RX: usize, const TX: usize>(
        &mut self,
        queues: &BusQueues<M, RX, TX>,
        now: Instant,
    ) {
        while let Some(frame) = queues.pop_received() {
            self.process_receive_frame(&frame, now);
        }
        self.update(now);

        let mut kept = VecDeque::new();
        while let Some(frame) = self.outbox.pop_front() {
            if frame.channel != queues.channel() {
                kept.push_back(frame);
                continue;
            }
            if let Err(frame) = queues.queue_transmit(frame) {
                #[cfg(feature = "defmt")]
                defmt::debug!("Transmit queue full");
                kept.push_back(frame);
                kept.extend(self.outbox.drain(..));
            }
        }
        self.outbox = kept;
    }

    fn advance(&mut self, now: Instant) {
        if now > self.now {
            self.now = now;
        }
    }
}
