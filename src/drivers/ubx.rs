//! u-blox UBX protocol over a byte port (DDC/I2C on the tracker board).

use heapless::Vec;

pub const SYNC_1: u8 = 0xB5;
pub const SYNC_2: u8 = 0x62;

pub const CLASS_NAV: u8 = 0x01;
pub const CLASS_ACK: u8 = 0x05;
pub const CLASS_CFG: u8 = 0x06;

pub const ID_NAV_DOP: u8 = 0x04;
pub const ID_NAV_PVT: u8 = 0x07;
pub const ID_ACK_NAK: u8 = 0x00;
pub const ID_ACK_ACK: u8 = 0x01;
pub const ID_CFG_PRT: u8 = 0x00;
pub const ID_CFG_CFG: u8 = 0x09;

/// Port id of the DDC (I2C) interface in CFG-PRT.
const PORT_DDC: u8 = 0;
const CFG_PRT_LEN: usize = 20;
const PROTO_UBX: u16 = 0x0001;
/// CFG-CFG save mask bit for the port configuration section.
const CFG_SECTION_IO_PORT: u32 = 0x0000_0001;
/// CFG-CFG device mask: battery-backed RAM and flash.
const CFG_DEVICE_BBR_FLASH: u8 = 0x01 | 0x02;

const NAV_PVT_LEN: usize = 92;
const NAV_DOP_LEN: usize = 18;

pub const MAX_PAYLOAD: usize = 100;
pub const MAX_FRAME: usize = MAX_PAYLOAD + 8;

/// Reads tried while waiting for one response.
const RESPONSE_ATTEMPTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum UbxError {
    /// Bus error or no device at the address
    Transport,
    /// No matching response within the attempt budget
    NoResponse,
    /// Module rejected the message
    Nak,
    /// Response with an unexpected length
    Malformed,
}

/// Byte transport towards the module.
pub trait UbxPort {
    type Error;

    async fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Reads what the module has buffered. Returns 0 when nothing is pending.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

// ─── Framing ───

/// 8-bit Fletcher over class, id, length and payload.
pub fn checksum(bytes: &[u8]) -> (u8, u8) {
    let mut a: u8 = 0;
    let mut b: u8 = 0;
    for &x in bytes {
        a = a.wrapping_add(x);
        b = b.wrapping_add(a);
    }
    (a, b)
}

pub fn build_frame(class: u8, id: u8, payload: &[u8]) -> Vec<u8, MAX_FRAME> {
    let mut f: Vec<u8, MAX_FRAME> = Vec::new();
    let len = payload.len().min(MAX_PAYLOAD);
    let _ = f.extend_from_slice(&[SYNC_1, SYNC_2, class, id, len as u8, (len >> 8) as u8]);
    let _ = f.extend_from_slice(&payload[..len]);
    let (a, b) = checksum(&f[2..]);
    let _ = f.push(a);
    let _ = f.push(b);
    f
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UbxFrame {
    pub class: u8,
    pub id: u8,
    pub payload: Vec<u8, MAX_PAYLOAD>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Sync1,
    Sync2,
    Class,
    Id,
    Len1,
    Len2,
    Payload,
    CkA,
    CkB,
}

pub struct UbxParser {
    state: ParseState,
    class: u8,
    id: u8,
    len: usize,
    payload: Vec<u8, MAX_PAYLOAD>,
    ck_a: u8,
    ck_b: u8,
    rx_ck_a: u8,
    /// Frames dropped for checksum or oversize.
    pub errors: u16,
}

impl Default for UbxParser {
    fn default() -> Self {
        Self::new()
    }
}

impl UbxParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::Sync1,
            class: 0,
            id: 0,
            len: 0,
            payload: Vec::new(),
            ck_a: 0,
            ck_b: 0,
            rx_ck_a: 0,
            errors: 0,
        }
    }

    fn sum(&mut self, b: u8) {
        self.ck_a = self.ck_a.wrapping_add(b);
        self.ck_b = self.ck_b.wrapping_add(self.ck_a);
    }

    pub fn push_byte(&mut self, b: u8) -> Option<UbxFrame> {
        match self.state {
            ParseState::Sync1 => {
                if b == SYNC_1 {
                    self.state = ParseState::Sync2;
                }
            }
            ParseState::Sync2 => {
                self.state = match b {
                    SYNC_2 => {
                        self.ck_a = 0;
                        self.ck_b = 0;
                        self.payload.clear();
                        ParseState::Class
                    }
                    SYNC_1 => ParseState::Sync2,
                    _ => ParseState::Sync1,
                };
            }
            ParseState::Class => {
                self.class = b;
                self.sum(b);
                self.state = ParseState::Id;
            }
            ParseState::Id => {
                self.id = b;
                self.sum(b);
                self.state = ParseState::Len1;
            }
            ParseState::Len1 => {
                self.len = b as usize;
                self.sum(b);
                self.state = ParseState::Len2;
            }
            ParseState::Len2 => {
                self.len |= (b as usize) << 8;
                self.sum(b);
                self.state = if self.len > MAX_PAYLOAD {
                    self.errors = self.errors.wrapping_add(1);
                    ParseState::Sync1
                } else if self.len == 0 {
                    ParseState::CkA
                } else {
                    ParseState::Payload
                };
            }
            ParseState::Payload => {
                let _ = self.payload.push(b);
                self.sum(b);
                if self.payload.len() == self.len {
                    self.state = ParseState::CkA;
                }
            }
            ParseState::CkA => {
                self.rx_ck_a = b;
                self.state = ParseState::CkB;
            }
            ParseState::CkB => {
                self.state = ParseState::Sync1;
                if self.rx_ck_a == self.ck_a && b == self.ck_b {
                    return Some(UbxFrame {
                        class: self.class,
                        id: self.id,
                        payload: self.payload.clone(),
                    });
                }
                self.errors = self.errors.wrapping_add(1);
            }
        }
        None
    }
}

// ─── Messages ───

/// Subset of NAV-PVT used by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavPvt {
    pub fix_ok: bool,
    pub lon_e7: i32,
    pub lat_e7: i32,
    /// Height above the ellipsoid
    pub height_mm: i32,
}

impl NavPvt {
    pub fn parse(p: &[u8]) -> Option<Self> {
        if p.len() != NAV_PVT_LEN {
            return None;
        }
        Some(Self {
            fix_ok: p[21] & 0x01 != 0,
            lon_e7: read_i32(p, 24),
            lat_e7: read_i32(p, 28),
            height_mm: read_i32(p, 32),
        })
    }
}

fn read_i32(p: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([p[at], p[at + 1], p[at + 2], p[at + 3]])
}

fn read_u16(p: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([p[at], p[at + 1]])
}

// ─── Driver ───

pub struct Ublox<P> {
    port: P,
    parser: UbxParser,
}

impl<P: UbxPort> Ublox<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            parser: UbxParser::new(),
        }
    }

    /// Gives the transport back, e.g. to power it down.
    pub fn release(self) -> P {
        self.port
    }

    async fn write(&mut self, class: u8, id: u8, payload: &[u8]) -> Result<(), UbxError> {
        let frame = build_frame(class, id, payload);
        self.port.write(&frame).await.map_err(|_| UbxError::Transport)
    }

    /// Reads until a frame of `class`/`id` shows up. An ACK-NAK naming
    /// `request` ends the wait with [`UbxError::Nak`].
    async fn await_frame(
        &mut self,
        class: u8,
        id: u8,
        request: [u8; 2],
    ) -> Result<UbxFrame, UbxError> {
        let mut buf = [0u8; 64];
        for _ in 0..RESPONSE_ATTEMPTS {
            let n = self
                .port
                .read(&mut buf)
                .await
                .map_err(|_| UbxError::Transport)?;
            for &b in &buf[..n] {
                let Some(frame) = self.parser.push_byte(b) else {
                    continue;
                };
                if frame.class == class && frame.id == id {
                    return Ok(frame);
                }
                if frame.class == CLASS_ACK
                    && frame.id == ID_ACK_NAK
                    && frame.payload.as_slice() == request
                {
                    return Err(UbxError::Nak);
                }
            }
        }
        Err(UbxError::NoResponse)
    }

    pub async fn poll(&mut self, class: u8, id: u8, request: &[u8]) -> Result<UbxFrame, UbxError> {
        self.write(class, id, request).await?;
        self.await_frame(class, id, [class, id]).await
    }

    /// Sends a CFG message and waits for its ACK-ACK.
    pub async fn configure(&mut self, class: u8, id: u8, payload: &[u8]) -> Result<(), UbxError> {
        self.write(class, id, payload).await?;
        loop {
            let ack = self.await_frame(CLASS_ACK, ID_ACK_ACK, [class, id]).await?;
            if ack.payload.as_slice() == [class, id] {
                return Ok(());
            }
        }
    }

    /// Presence check: polls the DDC port configuration.
    pub async fn probe(&mut self) -> Result<[u8; CFG_PRT_LEN], UbxError> {
        let frame = self.poll(CLASS_CFG, ID_CFG_PRT, &[PORT_DDC]).await?;
        frame
            .payload
            .as_slice()
            .try_into()
            .map_err(|_| UbxError::Malformed)
    }

    /// Turns off NMEA on the DDC port, leaving UBX output only.
    pub async fn set_ubx_only_output(&mut self, mut prt: [u8; CFG_PRT_LEN]) -> Result<(), UbxError> {
        prt[14..16].copy_from_slice(&PROTO_UBX.to_le_bytes());
        self.configure(CLASS_CFG, ID_CFG_PRT, &prt).await
    }

    /// Persists the port configuration section to BBR and flash.
    pub async fn save_io_config(&mut self) -> Result<(), UbxError> {
        let mut p = [0u8; 13];
        p[4..8].copy_from_slice(&CFG_SECTION_IO_PORT.to_le_bytes());
        p[12] = CFG_DEVICE_BBR_FLASH;
        self.configure(CLASS_CFG, ID_CFG_CFG, &p).await
    }

    pub async fn nav_pvt(&mut self) -> Result<NavPvt, UbxError> {
        let frame = self.poll(CLASS_NAV, ID_NAV_PVT, &[]).await?;
        NavPvt::parse(&frame.payload).ok_or(UbxError::Malformed)
    }

    /// Horizontal DOP × 100.
    pub async fn hdop(&mut self) -> Result<u16, UbxError> {
        let frame = self.poll(CLASS_NAV, ID_NAV_DOP, &[]).await?;
        if frame.payload.len() != NAV_DOP_LEN {
            return Err(UbxError::Malformed);
        }
        Ok(read_u16(&frame.payload, 12))
    }
}
