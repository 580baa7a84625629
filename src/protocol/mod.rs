//! High-level components of the ISO 11783 stack: network management, application
//! messages, and the CAN / transport protocol layer.
pub mod managment;
pub mod messages;
pub mod transport;
