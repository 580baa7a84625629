//! Abstraction traits used by the transport layer (hardware CAN bus).
pub mod can_bus;
