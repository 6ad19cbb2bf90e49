//! Interfaces to the collaborators the tracker core drives but does not own.

use embassy_time::{Duration, Instant};

use crate::config::{Settings, SettingsError};
use crate::state::SendResult;

/// Monotonic time source.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Board services used by the event handlers.
pub trait Board: Clock {
    fn battery_millivolts(&mut self) -> u16;

    /// Re-arms the accelerometer interrupt after a wake-up.
    fn clear_motion_latch(&mut self);

    /// Stops any running deferred-send timer, then starts it for `after`.
    /// Expiry posts [`crate::events::EventKind::Status`].
    fn start_deferred_timer(&mut self, after: Duration);

    fn stop_deferred_timer(&mut self);

    /// Restarts the periodic report timer from now. `None` disables it.
    fn restart_report_timer(&mut self, period: Option<Duration>);
}

/// Transmit side of the radio stack. Completion arrives later through
/// [`crate::events::EventBus::complete_tx`].
pub trait RadioLink {
    fn send(&mut self, port: u8, payload: &[u8]) -> SendResult;
}

/// Persistence of [`Settings`].
pub trait SettingsStore {
    fn load(&mut self) -> Result<Settings, SettingsError>;
    fn save(&mut self, settings: &Settings) -> Result<(), SettingsError>;
}
