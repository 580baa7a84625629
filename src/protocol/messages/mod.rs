//! Application-level view of the traffic: complete messages delivered to listeners and
//! the send requests accepted by the
//! [`NetworkManager`](crate::protocol::managment::network_manager::NetworkManager).
//!
//! Payload semantics stay with the upper-layer protocols; a [`Message`] only carries the
//! PGN, addressing and the raw bytes, whether they arrived in one frame or through a
//! transport session.
use crate::core::DEFAULT_PRIORITY;
use crate::protocol::managment::control_function::{ControlFunctionEvent, ControlFunctionHandle};
use crate::protocol::transport::transport_protocol::TransferCallback;
use alloc::boxed::Box;
use alloc::vec::Vec;
use embassy_time::Instant;

//==================================================================================MESSAGE
/// Target of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Destination {
    Global,
    ControlFunction {
        handle: ControlFunctionHandle,
        address: u8,
    },
}

impl Destination {
    /// Wire address: 255 for global traffic.
    pub fn address(&self) -> u8 {
        match self {
            Destination::Global => crate::core::GLOBAL_ADDRESS,
            Destination::ControlFunction { address, .. } => *address,
        }
    }
}

/// Complete payload received from a claimed control function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub pgn: u32,
    pub priority: u8,
    pub source: ControlFunctionHandle,
    pub source_address: u8,
    pub destination: Destination,
    pub data: Vec<u8>,
    pub timestamp: Instant,
    pub channel: u8,
}

impl Message {
    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.destination == Destination::Global
    }
}

//==================================================================================LISTENERS
/// Selects which messages of a PGN reach a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageFilter {
    Any,
    /// Only messages sent to the global address.
    Broadcast,
    /// Only messages from this control function.
    From(ControlFunctionHandle),
    /// Only messages addressed to this internal control function.
    To(ControlFunctionHandle),
}

impl MessageFilter {
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            MessageFilter::Any => true,
            MessageFilter::Broadcast => message.is_broadcast(),
            MessageFilter::From(handle) => message.source == *handle,
            MessageFilter::To(handle) => matches!(
                message.destination,
                Destination::ControlFunction { handle: target, .. } if target == *handle
            ),
        }
    }
}

/// Token returned by `register_listener`, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ListenerId(pub(crate) usize);

pub type MessageCallback = Box<dyn FnMut(&Message)>;

pub type ControlFunctionEventCallback = Box<dyn FnMut(&ControlFunctionEvent)>;

//==================================================================================OUTGOING
/// Send request handed to `send_can_message`.
pub struct OutgoingMessage {
    /// Internal control function sending the message.
    pub source: ControlFunctionHandle,
    /// `None` for a broadcast.
    pub destination: Option<ControlFunctionHandle>,
    pub pgn: u32,
    pub priority: u8,
    pub data: Vec<u8>,
    /// Called with the outcome once the frame or the transport session is done.
    pub callback: Option<TransferCallback>,
}

impl OutgoingMessage {
    /// Broadcast at the default priority.
    pub fn broadcast(source: ControlFunctionHandle, pgn: u32, data: &[u8]) -> Self {
        Self {
            source,
            destination: None,
            pgn,
            priority: DEFAULT_PRIORITY,
            data: data.to_vec(),
            callback: None,
        }
    }

    /// Point-to-point message at the default priority.
    pub fn to(
        source: ControlFunctionHandle,
        destination: ControlFunctionHandle,
        pgn: u32,
        data: &[u8],
    ) -> Self {
        Self {
            destination: Some(destination),
            ..Self::broadcast(source, pgn, data)
        }
    }

    /// 0 (highest) to 7. Larger values make the send fail with
    /// [`SendError::InvalidPriority`](crate::error::SendError::InvalidPriority).
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_callback(mut self, callback: TransferCallback) -> Self {
        self.callback = Some(callback);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn message(destination: Destination) -> Message {
        Message {
            pgn: 0xEF00,
            priority: 6,
            source: ControlFunctionHandle(3),
            source_address: 0x80,
            destination,
            data: vec![1, 2, 3],
            timestamp: Instant::from_millis(0),
            channel: 0,
        }
    }

    #[test]
    fn test_filters() {
        let broadcast = message(Destination::Global);
        let addressed = message(Destination::ControlFunction {
            handle: ControlFunctionHandle(1),
            address: 0x25,
        });

        assert!(MessageFilter::Any.matches(&broadcast));
        assert!(MessageFilter::Broadcast.matches(&broadcast));
        assert!(!MessageFilter::Broadcast.matches(&addressed));
        assert!(MessageFilter::From(ControlFunctionHandle(3)).matches(&addressed));
        assert!(!MessageFilter::From(ControlFunctionHandle(1)).matches(&addressed));
        assert!(MessageFilter::To(ControlFunctionHandle(1)).matches(&addressed));
        assert!(!MessageFilter::To(ControlFunctionHandle(1)).matches(&broadcast));
        assert_eq!(addressed.destination.address(), 0x25);
        assert_eq!(broadcast.destination.address(), 0xFF);
    }

    #[test]
    fn test_outgoing_builders() {
        let request = OutgoingMessage::to(ControlFunctionHandle(0), ControlFunctionHandle(2), 0xEF00, &[9])
            .with_priority(3);
        assert_eq!(request.destination, Some(ControlFunctionHandle(2)));
        assert_eq!(request.priority, 3);
        assert_eq!(request.data, [9]);
        assert!(request.callback.is_none());
    }
}
