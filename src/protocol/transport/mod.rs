//! ISO 11783-3 / SAE J1939-21 transport layer: CAN frame representations, 29-bit
//! identifier management, BAM / connection-mode / extended transport sessions, and bus
//! abstraction traits.
//!
//! ## Timing Constants
//!
//! These constants define the protocol-mandated timeouts and the pacing used by the
//! transport engine and the address-claim procedure. They are the defaults of
//! [`TransportConfig`](crate::config::TransportConfig) and
//! [`NetworkConfig`](crate::config::NetworkConfig).

pub mod can_frame;
pub mod can_id;
pub mod traits;
pub mod transport_protocol;

/// T1: maximum gap between two data frames at the receiver (ms).
///
/// Also bounds the gap between a BAM announcement and its first data frame.
pub const T1_TIMEOUT_MS: u64 = 750;

/// T2: maximum time the receiver waits for data after sending a Clear-To-Send (ms).
pub const T2_TIMEOUT_MS: u64 = 1250;

/// T3: maximum time the sender waits for a Clear-To-Send or End-of-Message-Ack after
/// its request or its last data frame (ms).
pub const T3_TIMEOUT_MS: u64 = 1250;

/// T4: maximum time the sender stays on hold after a Clear-To-Send granting zero
/// packets without hearing another Clear-To-Send (ms).
pub const T4_TIMEOUT_MS: u64 = 1050;

/// Delay between two BAM frames of the same message (ms).
///
/// # Recommended Values
///
/// - **50 ms**: lower bound mandated by J1939-21 and ISO 11783-3.
/// - **200 ms**: upper bound; receivers time out after T1 (750 ms).
pub const BAM_INTER_FRAME_DELAY_MS: u64 = 50;

/// Packets granted per Clear-To-Send by default.
pub const DEFAULT_PACKETS_PER_CTS: u8 = 16;

/// Largest extended-transport payload accepted by default (bytes).
///
/// The protocol allows 117 440 505 bytes; receive buffers grow with the data actually
/// received, but an embedded heap rarely holds more than a few tens of KiB. Raise it
/// with [`TransportConfig::with_max_extended_payload`](crate::config::TransportConfig::with_max_extended_payload)
/// for file transfers.
pub const DEFAULT_MAX_EXTENDED_PAYLOAD: usize = 64 * 1024;

/// Connection-mode and extended sessions tracked concurrently by default.
pub const DEFAULT_MAX_TRANSPORT_SESSIONS: usize = 4;

/// Address-claim contention window (ms).
pub const ADDRESS_CLAIM_CONTENTION_MS: u64 = 250;
