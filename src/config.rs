//! Compile-time constants and persisted runtime settings.

use embassy_time::Duration;

use crate::ports::SettingsStore;

// ── Radio ports ───────────────────────────────────────────────────────────────

/// Application port of the location uplink.
pub const UPLINK_PORT: u8 = 2;
/// Reserved downlink port carrying control messages.
pub const CONTROL_PORT: u8 = 3;
/// Control message: magic prefix followed by a 4-byte big-endian interval (s).
pub const CONTROL_MAGIC: [u8; 2] = [0xAA, 0x55];
pub const CONTROL_LEN: usize = 6;

// ── Timing ────────────────────────────────────────────────────────────────────

/// Hard deadline of one GNSS acquisition cycle.
pub const GNSS_DEADLINE: Duration = Duration::from_secs(10);
/// Upper bound for a single NMEA source read, i.e. the deadline overshoot.
pub const GNSS_POLL_GRANULARITY: Duration = Duration::from_millis(100);
/// Floor of the motion-triggered send spacing.
pub const MIN_SEND_INTERVAL_FLOOR: Duration = Duration::from_secs(15);
/// Spacing used when periodic reports are disabled.
pub const MIN_SEND_INTERVAL_NO_REPORTS: Duration = Duration::from_secs(30);

pub const DEFAULT_REPORT_INTERVAL_MS: u32 = 120_000;

// ── Regions ───────────────────────────────────────────────────────────────────

/// LoRaWAN regions, numbered as the LoRaMac region table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum Region {
    As923,
    Au915,
    Cn470,
    Cn779,
    Eu433,
    Eu868,
    Kr920,
    In865,
    Us915,
    Ru864,
    As923_2,
    As923_3,
    As923_4,
}

impl Region {
    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => Region::As923,
            1 => Region::Au915,
            2 => Region::Cn470,
            3 => Region::Cn779,
            4 => Region::Eu433,
            5 => Region::Eu868,
            6 => Region::Kr920,
            7 => Region::In865,
            8 => Region::Us915,
            9 => Region::Ru864,
            10 => Region::As923_2,
            11 => Region::As923_3,
            12 => Region::As923_4,
            _ => return None,
        })
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Highest selectable sub-band (channel group of 8).
    pub fn max_subband(self) -> u8 {
        match self {
            Region::As923 | Region::As923_2 | Region::As923_3 | Region::As923_4 => 1,
            Region::Ru864 => 1,
            Region::Au915 | Region::Us915 => 9,
            Region::Cn470 => 12,
            Region::Cn779 | Region::Eu433 | Region::In865 | Region::Eu868 | Region::Kr920 => 2,
        }
    }

    /// Maximum application payload (bytes) at a data rate, no FOpts.
    pub fn max_payload(self, data_rate: u8) -> usize {
        match self {
            Region::Us915 => match data_rate {
                0 => 11,
                1 => 53,
                2 => 125,
                3 | 4 => 242,
                _ => 0,
            },
            Region::Au915 => match data_rate {
                0..=1 => 51,
                2 => 11,
                3 => 53,
                4 => 125,
                5 | 6 => 242,
                _ => 0,
            },
            _ => match data_rate {
                0..=2 => 51,
                3 => 115,
                4..=7 => 242,
                _ => 0,
            },
        }
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

pub const SETTINGS_LEN: usize = 16;
const SETTINGS_MAGIC: [u8; 2] = *b"TR";
const SETTINGS_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum SettingsError {
    /// No record, or not one of ours.
    BadMagic,
    UnsupportedVersion(u8),
    UnknownRegion(u8),
    Checksum,
    /// Storage backend failed.
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub struct Settings {
    /// Periodic report interval; 0 disables periodic reports.
    pub report_interval_ms: u32,
    pub region: Region,
    pub subband: u8,
    pub data_rate: u8,
    pub confirmed: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            report_interval_ms: DEFAULT_REPORT_INTERVAL_MS,
            region: Region::Eu868,
            subband: 1,
            data_rate: 3,
            confirmed: false,
        }
    }
}

impl Settings {
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms as u64)
    }

    /// Clamps the sub-band to what the region supports. Returns true if it changed.
    pub fn sanitize(&mut self) -> bool {
        if self.subband > self.region.max_subband() {
            self.subband = 1;
            return true;
        }
        false
    }

    pub fn to_bytes(&self) -> [u8; SETTINGS_LEN] {
        let mut b = [0u8; SETTINGS_LEN];
        b[0..2].copy_from_slice(&SETTINGS_MAGIC);
        b[2] = SETTINGS_VERSION;
        b[3] = self.region.id();
        b[4] = self.subband;
        b[5] = self.data_rate;
        b[6] = self.confirmed as u8;
        b[8..12].copy_from_slice(&self.report_interval_ms.to_le_bytes());
        b[12] = crc8(&b[2..12]);
        b
    }

    pub fn from_bytes(b: &[u8; SETTINGS_LEN]) -> Result<Self, SettingsError> {
        if b[0..2] != SETTINGS_MAGIC {
            return Err(SettingsError::BadMagic);
        }
        if b[2] != SETTINGS_VERSION {
            return Err(SettingsError::UnsupportedVersion(b[2]));
        }
        if crc8(&b[2..12]) != b[12] {
            return Err(SettingsError::Checksum);
        }
        let region = Region::from_id(b[3]).ok_or(SettingsError::UnknownRegion(b[3]))?;
        Ok(Self {
            report_interval_ms: u32::from_le_bytes([b[8], b[9], b[10], b[11]]),
            region,
            subband: b[4],
            data_rate: b[5],
            confirmed: b[6] != 0,
        })
    }
}

/// Loads settings at startup, falling back to defaults, and writes back a
/// sanitized sub-band.
pub fn load_settings<K: SettingsStore>(store: &mut K) -> Settings {
    let mut settings = match store.load() {
        Ok(s) => s,
        Err(e) => {
            log_warn!("Settings unreadable ({:?}), using defaults", e);
            Settings::default()
        }
    };
    if settings.sanitize() {
        log_info!("Sub-band out of range for region, reset to 1");
        if let Err(e) = store.save(&settings) {
            log_error!("Saving sanitized settings failed: {:?}", e);
        }
    }
    settings
}

/// CRC-8, polynomial 0xD5.
pub(crate) fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &b in data {
        crc ^= b;
        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ 0xD5;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;

    #[test]
    fn settings_record_survives_storage() {
        let s = Settings {
            report_interval_ms: 60_000,
            region: Region::Us915,
            subband: 2,
            data_rate: 1,
            confirmed: true,
        };
        let bytes = s.to_bytes();
        assert_eq!(&bytes[0..3], b"TR\x01");
        assert_eq!(&bytes[8..12], &[0x60, 0xEA, 0x00, 0x00]);
        assert_eq!(Settings::from_bytes(&bytes), Ok(s));
    }

    #[test]
    fn corrupted_record_is_rejected() {
        let mut bytes = Settings::default().to_bytes();
        bytes[9] ^= 0x01;
        assert_eq!(Settings::from_bytes(&bytes), Err(SettingsError::Checksum));

        let erased = [0xFFu8; SETTINGS_LEN];
        assert_eq!(Settings::from_bytes(&erased), Err(SettingsError::BadMagic));
    }

    #[test]
    fn subband_limits_follow_region() {
        let mut s = Settings {
            region: Region::As923_3,
            subband: 2,
            ..Settings::default()
        };
        assert!(s.sanitize());
        assert_eq!(s.subband, 1);

        let mut s = Settings {
            region: Region::Us915,
            subband: 9,
            ..Settings::default()
        };
        assert!(!s.sanitize());
        assert_eq!(s.subband, 9);

        let mut s = Settings {
            region: Region::Cn470,
            subband: 13,
            ..Settings::default()
        };
        assert!(s.sanitize());
    }

    #[test]
    fn load_writes_back_sanitized_settings() {
        let mut store = MemoryStore::with(Settings {
            region: Region::Eu868,
            subband: 5,
            ..Settings::default()
        });
        let s = load_settings(&mut store);
        assert_eq!(s.subband, 1);
        assert_eq!(store.saves, 1);
        assert_eq!(store.saved.map(|s| s.subband), Some(1));
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let mut store = MemoryStore::empty();
        assert_eq!(load_settings(&mut store), Settings::default());
        assert_eq!(store.saves, 0);
    }

    #[test]
    fn fourteen_bytes_do_not_fit_us915_dr0() {
        assert!(Region::Us915.max_payload(0) < crate::codec::FRAME_LEN);
        assert!(Region::Eu868.max_payload(0) >= crate::codec::FRAME_LEN);
    }
}
