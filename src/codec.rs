//! Uplink payload codec.
//!
//! Wire contract shared with the network/application server decoder:
//!
//! | offset | width | field                      | type |
//! |--------|-------|----------------------------|------|
//! | 0      | 4     | latitude, degrees × 10^5   | i32  |
//! | 4      | 4     | longitude, degrees × 10^5  | i32  |
//! | 8      | 2     | altitude, metres           | i16  |
//! | 10     | 2     | horizontal DOP × 100       | u16  |
//! | 12     | 2     | battery, millivolts        | u16  |
//!
//! Every field is stored low byte first.

use crate::state::LocationFix;

pub const FRAME_LEN: usize = 14;

/// Encoded uplink payload. Copied into the radio on handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UplinkFrame([u8; FRAME_LEN]);

impl UplinkFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; FRAME_LEN] {
        self.0
    }

    pub fn from_bytes(bytes: [u8; FRAME_LEN]) -> Self {
        Self(bytes)
    }
}

/// Fields recovered from an [`UplinkFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFrame {
    pub latitude: i32,
    pub longitude: i32,
    pub altitude: i16,
    pub accuracy: u16,
    pub battery_mv: u16,
}

/// Packs a fix into the uplink layout. Altitude keeps its low 16 bits.
pub fn encode(fix: &LocationFix, accuracy: u16, battery_mv: u16) -> UplinkFrame {
    let mut buf = [0u8; FRAME_LEN];
    put_u32(&mut buf[0..4], fix.latitude as u32);
    put_u32(&mut buf[4..8], fix.longitude as u32);
    put_u16(&mut buf[8..10], fix.altitude as u16);
    put_u16(&mut buf[10..12], accuracy);
    put_u16(&mut buf[12..14], battery_mv);
    UplinkFrame(buf)
}

pub fn decode(frame: &UplinkFrame) -> DecodedFrame {
    let b = &frame.0;
    DecodedFrame {
        latitude: get_u32(&b[0..4]) as i32,
        longitude: get_u32(&b[4..8]) as i32,
        altitude: get_u16(&b[8..10]) as i16,
        accuracy: get_u16(&b[10..12]),
        battery_mv: get_u16(&b[12..14]),
    }
}

fn put_u32(out: &mut [u8], v: u32) {
    out[0] = v as u8;
    out[1] = (v >> 8) as u8;
    out[2] = (v >> 16) as u8;
    out[3] = (v >> 24) as u8;
}

fn put_u16(out: &mut [u8], v: u16) {
    out[0] = v as u8;
    out[1] = (v >> 8) as u8;
}

fn get_u32(b: &[u8]) -> u32 {
    (b[0] as u32) | ((b[1] as u32) << 8) | ((b[2] as u32) << 16) | ((b[3] as u32) << 24)
}

fn get_u16(b: &[u8]) -> u16 {
    (b[0] as u16) | ((b[1] as u16) << 8)
}
