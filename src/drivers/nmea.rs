use core::str::FromStr;

// ─── NMEA sentence stream parser (fixed point, no floats) ───

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmeaFrame {
    None,
    Gga,
    Rmc,
    Gsa,
}

impl Default for NmeaFrame {
    fn default() -> Self {
        NmeaFrame::None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NmeaData {
    // ── Position ──
    pub lat: i32,          // degrees × 10^5
    pub lon: i32,          // degrees × 10^5
    pub alt: i32,          // metres (MSL), truncated
    pub hdop: u16,         // × 100

    // ── Validity since last reset ──
    pub has_position: bool,
    pub has_altitude: bool,
    pub has_hdop: bool,
    pub sats: u8,

    // ── Diagnostics ──
    pub sentences_rx: u16,       // total valid sentences parsed
    pub checksum_errors: u16,    // checksum mismatches
    pub frame_errors: u16,       // buffer overflows
    pub unknown_count: u16,      // unrecognised sentence IDs
    pub last_frame: NmeaFrame,
}

pub struct NmeaParser {
    buffer: heapless::String<96>,
    pub data: NmeaData,
}

impl Default for NmeaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl NmeaParser {
    pub fn new() -> Self {
        Self {
            buffer: heapless::String::new(),
            data: NmeaData::default(),
        }
    }

    /// Position and altitude both seen since construction.
    pub fn is_complete(&self) -> bool {
        self.data.has_position && self.data.has_altitude
    }

    /// Process incoming bytes from the UART
    pub fn push_data(&mut self, data: &[u8]) {
        for &b in data {
            if b == b'$' {
                self.buffer.clear();
            }

            if !b.is_ascii() || self.buffer.push(b as char).is_err() {
                self.data.frame_errors = self.data.frame_errors.wrapping_add(1);
                self.buffer.clear();
                continue;
            }

            if b == b'\n' {
                self.parse_sentence();
                self.buffer.clear();
            }
        }
    }

    fn parse_sentence(&mut self) {
        // Copy the buffer to avoid borrow conflict (self.buffer vs &mut self)
        let mut local: heapless::String<96> = heapless::String::new();
        let _ = local.push_str(self.buffer.as_str().trim());
        let s = local.as_str();

        if s.len() < 6 || !s.starts_with('$') {
            return;
        }

        if !verify_checksum(s) {
            self.data.checksum_errors = self.data.checksum_errors.wrapping_add(1);
            return;
        }

        // Talker id is two chars ($GP, $GN, $GL …), sentence id the next three
        let frame = match &s[3..6] {
            "GGA" => NmeaFrame::Gga,
            "RMC" => NmeaFrame::Rmc,
            "GSA" => NmeaFrame::Gsa,
            _ => NmeaFrame::None,
        };

        self.data.sentences_rx = self.data.sentences_rx.wrapping_add(1);
        self.data.last_frame = frame;

        // Drop the checksum so the last field parses cleanly
        let body = s.split('*').next().unwrap_or(s);
        match frame {
            NmeaFrame::Gga => self.parse_gga(body),
            NmeaFrame::Rmc => self.parse_rmc(body),
            NmeaFrame::Gsa => self.parse_gsa(body),
            NmeaFrame::None => {
                self.data.unknown_count = self.data.unknown_count.wrapping_add(1);
            }
        }
    }

    // ────── GGA ──────
    fn parse_gga(&mut self, s: &str) {
        // $xxGGA,time,lat,NS,lon,EW,qual,sats,hdop,alt,M,geoid,M,…
        let mut parts = s.split(',');
        parts.next(); // ID
        parts.next(); // time

        let lat_raw = parts.next().unwrap_or("");
        let ns = parts.next().unwrap_or("");
        let lon_raw = parts.next().unwrap_or("");
        let ew = parts.next().unwrap_or("");
        let qual_str = parts.next().unwrap_or("");
        let sats_str = parts.next().unwrap_or("");
        let hdop_str = parts.next().unwrap_or("");
        let alt_str = parts.next().unwrap_or("");

        let has_fix = u8::from_str(qual_str).map(|q| q > 0).unwrap_or(false);
        if let Ok(n) = u8::from_str(sats_str) {
            self.data.sats = n;
        }

        if let Some(h) = parse_scaled(hdop_str, 2) {
            self.data.hdop = h.clamp(0, u16::MAX as i64) as u16;
            self.data.has_hdop = true;
        }

        if !has_fix {
            return;
        }

        if let (Some(lat), Some(lon)) = (parse_coord(lat_raw, ns), parse_coord(lon_raw, ew)) {
            self.data.lat = lat;
            self.data.lon = lon;
            self.data.has_position = true;
        }

        if let Some(a) = parse_scaled(alt_str, 0) {
            self.data.alt = a as i32;
            self.data.has_altitude = true;
        }
    }

    // ────── RMC ──────
    fn parse_rmc(&mut self, s: &str) {
        // $xxRMC,time,status,lat,NS,lon,EW,speed,course,date,…
        let mut parts = s.split(',');
        parts.next(); // ID
        parts.next(); // time

        // Status (field 2): A=active, V=void
        if parts.next() != Some("A") {
            return;
        }

        let lat_raw = parts.next().unwrap_or("");
        let ns = parts.next().unwrap_or("");
        let lon_raw = parts.next().unwrap_or("");
        let ew = parts.next().unwrap_or("");

        if let (Some(lat), Some(lon)) = (parse_coord(lat_raw, ns), parse_coord(lon_raw, ew)) {
            self.data.lat = lat;
            self.data.lon = lon;
            self.data.has_position = true;
        }
    }

    // ────── GSA ──────
    fn parse_gsa(&mut self, s: &str) {
        // $xxGSA,mode1,mode2,id1…id12,pdop,hdop,vdop
        let mut parts = s.split(',');
        // ID, mode1, mode2 and twelve PRN slots, then PDOP
        let hdop_str = parts.nth(16).unwrap_or("");
        if let Some(h) = parse_scaled(hdop_str, 2) {
            self.data.hdop = h.clamp(0, u16::MAX as i64) as u16;
            self.data.has_hdop = true;
        }
    }
}

/// `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere into degrees × 10^5, truncating.
pub fn parse_coord(raw: &str, hemisphere: &str) -> Option<i32> {
    let (int_part, frac_part) = raw.split_once('.').unwrap_or((raw, ""));
    if int_part.len() < 3 {
        return None;
    }
    let whole = u32::from_str(int_part).ok()?;
    let degrees = whole / 100;
    let minutes = (whole % 100) as i64;

    // Minutes × 10^5, keeping five fractional digits
    let mut minutes_e5 = minutes * 100_000;
    let mut scale = 10_000i64;
    for c in frac_part.chars().take(5) {
        let d = c.to_digit(10)? as i64;
        minutes_e5 += d * scale;
        scale /= 10;
    }

    let value = degrees as i64 * 100_000 + minutes_e5 / 60;
    let value = match hemisphere {
        "N" | "E" => value,
        "S" | "W" => -value,
        _ => return None,
    };
    i32::try_from(value).ok()
}

/// Decimal string into an integer × 10^digits, truncated toward zero.
pub fn parse_scaled(raw: &str, digits: u32) -> Option<i64> {
    let (neg, unsigned) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let mut value: i64 = if int_part.is_empty() {
        0
    } else {
        i64::from_str(int_part).ok()?
    };
    let mut frac = frac_part.chars();
    for _ in 0..digits {
        let d = match frac.next() {
            Some(c) => c.to_digit(10)? as i64,
            None => 0,
        };
        value = value.checked_mul(10)?.checked_add(d)?;
    }
    Some(if neg { -value } else { value })
}

fn verify_checksum(s: &str) -> bool {
    if let Some((content, check_str)) = s.split_once('*') {
        let content = content.strip_prefix('$').unwrap_or(content);
        let mut calc = 0u8;
        for b in content.bytes() {
            calc ^= b;
        }
        // Only take first 2 hex chars (ignore trailing \r\n or garbage)
        let hex = if check_str.len() >= 2 { &check_str[..2] } else { check_str };
        if let Ok(val) = u8::from_str_radix(hex.trim(), 16) {
            return calc == val;
        }
    }
    false
}
