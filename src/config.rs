//! Runtime parameters of the network manager and the transport engine.
//!
//! Defaults come from the protocol timing constants declared in
//! [`crate::protocol::transport`]. Every field can be overridden through the `with_*`
//! setters:
//!
//! ```
//! use embassy_time::Duration;
//! use korri_isobus::config::{NetworkConfig, TransportConfig};
//!
//! let config = NetworkConfig::default()
//!     .with_transport(TransportConfig::default().with_packets_per_cts(8))
//!     .with_control_function_timeout(Some(Duration::from_secs(3)));
//! assert_eq!(config.transport.packets_per_cts, 8);
//! ```
use crate::core::MAX_ETP_PAYLOAD;
use crate::protocol::transport::{
    ADDRESS_CLAIM_CONTENTION_MS, BAM_INTER_FRAME_DELAY_MS, DEFAULT_MAX_EXTENDED_PAYLOAD,
    DEFAULT_MAX_TRANSPORT_SESSIONS, DEFAULT_PACKETS_PER_CTS, T1_TIMEOUT_MS, T2_TIMEOUT_MS, T3_TIMEOUT_MS, T4_TIMEOUT_MS,
};
use embassy_time::Duration;

//==================================================================================TRANSPORT
/// Limits and timers of the transport engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Concurrent connection-mode and extended sessions (BAM is not counted).
    pub max_sessions: usize,
    /// Packets granted by each Clear-To-Send we send, and the per-CTS limit advertised
    /// in our own requests. `0` is treated as `1`.
    pub packets_per_cts: u8,
    /// Pacing between two BAM data frames.
    pub bam_interval: Duration,
    /// Largest payload accepted for extended transport, in either direction. Defaults to
    /// 64 KiB; larger announcements are refused with "message too large".
    pub max_extended_payload: usize,
    pub t1: Duration,
    pub t2: Duration,
    pub t3: Duration,
    pub t4: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_TRANSPORT_SESSIONS,
            packets_per_cts: DEFAULT_PACKETS_PER_CTS,
            bam_interval: Duration::from_millis(BAM_INTER_FRAME_DELAY_MS),
            max_extended_payload: DEFAULT_MAX_EXTENDED_PAYLOAD,
            t1: Duration::from_millis(T1_TIMEOUT_MS),
            t2: Duration::from_millis(T2_TIMEOUT_MS),
            t3: Duration::from_millis(T3_TIMEOUT_MS),
            t4: Duration::from_millis(T4_TIMEOUT_MS),
        }
    }
}

impl TransportConfig {
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn with_packets_per_cts(mut self, packets: u8) -> Self {
        self.packets_per_cts = packets.max(1);
        self
    }

    pub fn with_bam_interval(mut self, interval: Duration) -> Self {
        self.bam_interval = interval;
        self
    }

    /// Clamped to the protocol ceiling of 117 440 505 bytes.
    pub fn with_max_extended_payload(mut self, bytes: usize) -> Self {
        self.max_extended_payload = bytes.min(MAX_ETP_PAYLOAD);
        self
    }

    pub fn with_timeouts(mut self, t1: Duration, t2: Duration, t3: Duration, t4: Duration) -> Self {
        self.t1 = t1;
        self.t2 = t2;
        self.t3 = t3;
        self.t4 = t4;
        self
    }
}

//==================================================================================NETWORK
/// Parameters of a [`NetworkManager`](crate::protocol::managment::network_manager::NetworkManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    pub transport: TransportConfig,
    /// Window during which a claim may be contested before it is considered won.
    pub claim_contention: Duration,
    /// External control functions silent for longer than this are deactivated.
    /// `None` keeps them forever.
    pub control_function_timeout: Option<Duration>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            claim_contention: Duration::from_millis(ADDRESS_CLAIM_CONTENTION_MS),
            control_function_timeout: None,
        }
    }
}

impl NetworkConfig {
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_claim_contention(mut self, window: Duration) -> Self {
        self.claim_contention = window;
        self
    }

    pub fn with_control_function_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.control_function_timeout = timeout;
        self
    }
}
