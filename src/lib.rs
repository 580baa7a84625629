//! `korri-isobus` library: ISO 11783 (ISOBUS) / SAE J1939 network management and
//! multi-frame transport for `no_std` targets with an allocator.
//!
//! The crate exposes the frame codec, the address-claim procedure and control function
//! registry, the [`NetworkManager`](protocol::managment::network_manager::NetworkManager)
//! dispatching traffic to listeners, and the BAM / connection-mode / extended transport
//! engine. The core is synchronous and clock-free: callers feed received frames, call
//! `update(now)` periodically (about every 50 ms) and drain the frames to transmit.
//! [`BusQueues`](protocol::managment::bus_supervisor::BusQueues) and
//! [`BusRunner`](protocol::managment::bus_supervisor::BusRunner) bridge an async
//! [`CanBus`](protocol::transport::traits::can_bus::CanBus) adapter to that loop.
#![no_std]
extern crate alloc;
//==================================================================================
/// Protocol constants (addresses, PGNs, payload limits) shared by every layer.
pub mod core;
/// Runtime parameters of the network manager and the transport engine.
pub mod config;
/// Domain errors (CAN identifier construction, registration, sends, transfers, bus
/// runner).
pub mod error;
/// ISO 11783 protocol implementation: CAN transport, multi-frame sessions,
/// network management and messages.
pub mod protocol;
//==================================================================================
