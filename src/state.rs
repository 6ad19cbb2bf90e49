//! Shared data types handed between the tracker components.
//!
//! All types are `Clone` and small enough to move through the event bus
//! mailboxes by value.
use heapless::Vec;

// ── Location ──────────────────────────────────────────────────────────────────

/// A normalized GNSS reading, recomputed every acquisition cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub struct LocationFix {
    pub latitude: i32,  // degrees × 10^5
    pub longitude: i32, // degrees × 10^5
    pub altitude: i32,  // metres
    pub accuracy: u16,  // HDOP × 100
    pub valid: bool,
}

impl LocationFix {
    pub const NONE: Self = Self {
        latitude: 0,
        longitude: 0,
        altitude: 0,
        accuracy: 0,
        valid: false,
    };
}

// ── Radio ────────────────────────────────────────────────────────────────────

/// Largest downlink payload kept by the receive mailbox.
pub const RX_PAYLOAD_MAX: usize = 64;

/// A downlink frame with its reception metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RxFrame {
    pub rssi: i16,
    pub snr: i8,
    pub port: u8,
    pub payload: Vec<u8, RX_PAYLOAD_MAX>,
}

impl RxFrame {
    /// Builds a frame, truncating payloads longer than [`RX_PAYLOAD_MAX`].
    pub fn new(rssi: i16, snr: i8, port: u8, data: &[u8]) -> Self {
        let keep = data.len().min(RX_PAYLOAD_MAX);
        let mut payload = Vec::new();
        let _ = payload.extend_from_slice(&data[..keep]);
        Self {
            rssi,
            snr,
            port,
            payload,
        }
    }
}

/// How the radio stack finished the last transmit cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum TxOutcome {
    /// Unconfirmed uplink left the radio.
    Sent,
    /// Confirmed uplink was acknowledged by the network.
    Confirmed,
    /// Confirmed uplink got no acknowledgement before the confirm timeout.
    Unconfirmed,
    /// The stack gave up on the uplink.
    Failed,
}

impl TxOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, TxOutcome::Sent | TxOutcome::Confirmed)
    }
}

/// Immediate answer of the radio send interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum SendResult {
    Enqueued,
    Busy,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum RejectReason {
    /// Payload does not fit the data rate currently in use.
    Oversized,
}
