//! GNSS acquisition over one of two receiver backends.
//!
//! The u-blox module on I2C is preferred. When it does not answer the probe
//! at startup, an NMEA receiver on a UART takes over for the lifetime of the
//! process.

use embassy_time::Duration;

use crate::drivers::nmea::NmeaParser;
use crate::drivers::ubx::{UbxError, UbxPort, Ublox};
use crate::ports::Clock;
use crate::state::LocationFix;

/// NMEA byte stream of the secondary receiver.
pub trait NmeaSource {
    /// Reads what arrived, returning within
    /// [`crate::config::GNSS_POLL_GRANULARITY`]. Returns 0 when nothing came.
    async fn read(&mut self, buf: &mut [u8]) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum ActiveBackend {
    /// u-blox, UBX protocol over I2C
    Primary,
    /// NMEA sentences over UART
    Secondary,
}

// ── Secondary backend ────────────────────────────────────────────────────────

pub struct NmeaReceiver<S> {
    source: S,
}

impl<S: NmeaSource> NmeaReceiver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Streams sentences until position and altitude were both seen or the
    /// deadline passed. A clock going backwards counts as the deadline.
    pub async fn acquire<C: Clock>(&mut self, clock: &C, deadline: Duration) -> LocationFix {
        let start = clock.now();
        let mut parser = NmeaParser::new();
        let mut buf = [0u8; 128];
        let mut elapsed = Duration::from_ticks(0);

        loop {
            match clock.now().checked_duration_since(start) {
                Some(e) if e < deadline => elapsed = e,
                _ => break,
            }
            let n = self.source.read(&mut buf).await;
            parser.push_data(&buf[..n]);
            if parser.is_complete() {
                break;
            }
        }
        log_debug!("GNSS poll took {} s", elapsed.as_secs());

        if !parser.is_complete() {
            return LocationFix::NONE;
        }
        let d = &parser.data;
        LocationFix {
            latitude: d.lat,
            longitude: d.lon,
            altitude: d.alt,
            accuracy: d.hdop,
            valid: true,
        }
    }
}

// ── Primary backend ──────────────────────────────────────────────────────────

impl<P: UbxPort> Ublox<P> {
    /// One NAV-PVT query, plus NAV-DOP when the fix is good.
    pub async fn acquire(&mut self) -> LocationFix {
        match self.read_fix().await {
            Ok(fix) => fix,
            Err(e) => {
                log_warn!("u-blox query failed: {:?}", e);
                LocationFix::NONE
            }
        }
    }

    async fn read_fix(&mut self) -> Result<LocationFix, UbxError> {
        let pvt = self.nav_pvt().await?;
        if !pvt.fix_ok {
            return Ok(LocationFix::NONE);
        }
        let accuracy = self.hdop().await?;
        Ok(LocationFix {
            latitude: pvt.lat_e7 / 100,
            longitude: pvt.lon_e7 / 100,
            altitude: pvt.height_mm / 1000,
            accuracy,
            valid: true,
        })
    }

    /// Probe, then UBX-only output on the I2C port. Saving the port
    /// configuration is best effort.
    async fn bring_up(&mut self) -> Result<(), UbxError> {
        let prt = self.probe().await?;
        if let Err(e) = self.set_ubx_only_output(prt).await {
            log_warn!("u-blox output config failed: {:?}", e);
            return Ok(());
        }
        if let Err(e) = self.save_io_config().await {
            log_warn!("u-blox config save failed: {:?}", e);
        }
        Ok(())
    }
}

// ── Front end ────────────────────────────────────────────────────────────────

enum Backend<P, S> {
    Primary(Ublox<P>),
    Secondary(NmeaReceiver<S>),
}

pub struct Gnss<P, S> {
    backend: Backend<P, S>,
}

impl<P: UbxPort, S: NmeaSource> Gnss<P, S> {
    /// Probes the u-blox module on `primary`. If it is absent the transport
    /// is handed to `fallback`, which tears it down and brings up the NMEA
    /// receiver.
    pub async fn initialize<F>(primary: P, fallback: F) -> Self
    where
        F: FnOnce(P) -> S,
    {
        let mut ublox = Ublox::new(primary);
        let backend = match ublox.bring_up().await {
            Ok(()) => {
                log_info!("GNSS: u-blox (UBX over I2C)");
                Backend::Primary(ublox)
            }
            Err(e) => {
                log_warn!("u-blox not found ({:?}), using NMEA receiver", e);
                Backend::Secondary(NmeaReceiver::new(fallback(ublox.release())))
            }
        };
        Self { backend }
    }

    pub fn kind(&self) -> ActiveBackend {
        match self.backend {
            Backend::Primary(_) => ActiveBackend::Primary,
            Backend::Secondary(_) => ActiveBackend::Secondary,
        }
    }

    /// Runs one acquisition cycle. Never fails: any fault is `valid = false`.
    /// `deadline` bounds the NMEA stream; the u-blox query is a single poll.
    pub async fn acquire_fix<C: Clock>(&mut self, clock: &C, deadline: Duration) -> LocationFix {
        match &mut self.backend {
            Backend::Primary(ublox) => ublox.acquire().await,
            Backend::Secondary(rx) => rx.acquire(clock, deadline).await,
        }
    }
}
