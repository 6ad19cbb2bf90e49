//! Host-side doubles for the collaborator traits.

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use embassy_time::{Duration, Instant};

use crate::config::{Settings, SettingsError, GNSS_POLL_GRANULARITY};
use crate::drivers::ubx::{self, UbxParser, UbxPort};
use crate::gnss::NmeaSource;
use crate::ports::{Board, Clock, RadioLink, SettingsStore};
use crate::state::SendResult;
use crate::status::Console;

/// `$<body>*HH\r\n` with the checksum filled in.
pub fn nmea(body: &str) -> String {
    let cs = body.bytes().fold(0u8, |acc, b| acc ^ b);
    format!("${}*{:02X}\r\n", body, cs)
}

// ── Time ──────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockClock {
    ticks: Rc<Cell<u64>>,
    rewind: Rc<Cell<bool>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, at: Instant) {
        self.ticks.set(at.as_ticks());
    }

    pub fn set_ms(&self, ms: u64) {
        self.set(Instant::from_millis(ms));
    }

    pub fn advance(&self, by: Duration) {
        self.ticks.set(self.ticks.get() + by.as_ticks());
    }

    /// The next [`ScriptedNmea`] read moves the clock back to zero.
    pub fn rewind_on_next_read(&self) {
        self.rewind.set(true);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(self.ticks.get())
    }
}

// ── Board ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOp {
    Start(Duration),
    Stop,
}

pub struct MockBoard {
    pub clock: MockClock,
    pub battery_mv: u16,
    pub latch_clears: usize,
    pub deferred: Vec<TimerOp>,
    pub report: Vec<Option<Duration>>,
}

impl MockBoard {
    pub fn new(clock: MockClock) -> Self {
        Self {
            clock,
            battery_mv: 3712,
            latch_clears: 0,
            deferred: Vec::new(),
            report: Vec::new(),
        }
    }

    pub fn starts(&self) -> usize {
        self.deferred
            .iter()
            .filter(|op| matches!(op, TimerOp::Start(_)))
            .count()
    }
}

impl Clock for MockBoard {
    fn now(&self) -> Instant {
        self.clock.now()
    }
}

impl Board for MockBoard {
    fn battery_millivolts(&mut self) -> u16 {
        self.battery_mv
    }

    fn clear_motion_latch(&mut self) {
        self.latch_clears += 1;
    }

    fn start_deferred_timer(&mut self, after: Duration) {
        self.deferred.push(TimerOp::Start(after));
    }

    fn stop_deferred_timer(&mut self) {
        self.deferred.push(TimerOp::Stop);
    }

    fn restart_report_timer(&mut self, period: Option<Duration>) {
        self.report.push(period);
    }
}

// ── Radio ─────────────────────────────────────────────────────────────────────

/// Answers `Enqueued` unless a scripted answer is queued.
#[derive(Default)]
pub struct MockRadio {
    pub answers: VecDeque<SendResult>,
    pub sent: Vec<(u8, Vec<u8>)>,
}

impl MockRadio {
    pub fn answering(result: SendResult) -> Self {
        Self {
            answers: VecDeque::from([result]),
            sent: Vec::new(),
        }
    }
}

impl RadioLink for MockRadio {
    fn send(&mut self, port: u8, payload: &[u8]) -> SendResult {
        self.sent.push((port, payload.to_vec()));
        self.answers.pop_front().unwrap_or(SendResult::Enqueued)
    }
}

// ── Console ───────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingConsole {
    pub lines: Vec<String>,
    pub forwarded: Vec<u8>,
}

impl RecordingConsole {
    pub fn has(&self, line: &str) -> bool {
        self.lines.iter().any(|l| l == line)
    }

    pub fn position(&self, line: &str) -> Option<usize> {
        self.lines.iter().position(|l| l == line)
    }
}

impl Console for RecordingConsole {
    fn write_line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn forward_command(&mut self, byte: u8) {
        self.forwarded.push(byte);
    }
}

// ── Settings store ────────────────────────────────────────────────────────────

pub struct MemoryStore {
    stored: Option<Settings>,
    pub saves: usize,
    pub saved: Option<Settings>,
}

impl MemoryStore {
    pub fn with(settings: Settings) -> Self {
        Self {
            stored: Some(settings),
            saves: 0,
            saved: None,
        }
    }

    /// Nothing was ever written.
    pub fn empty() -> Self {
        Self {
            stored: None,
            saves: 0,
            saved: None,
        }
    }
}

impl SettingsStore for MemoryStore {
    fn load(&mut self) -> Result<Settings, SettingsError> {
        self.stored.ok_or(SettingsError::BadMagic)
    }

    fn save(&mut self, settings: &Settings) -> Result<(), SettingsError> {
        self.saves += 1;
        self.saved = Some(*settings);
        self.stored = Some(*settings);
        Ok(())
    }
}

// ── NMEA stream ───────────────────────────────────────────────────────────────

/// Plays back chunks, one per read, advancing the clock by one poll period
/// per read. Silent once the script is exhausted.
pub struct ScriptedNmea {
    clock: MockClock,
    chunks: VecDeque<Vec<u8>>,
}

impl ScriptedNmea {
    pub fn new(clock: MockClock, chunks: Vec<String>) -> Self {
        Self {
            clock,
            chunks: chunks.into_iter().map(String::into_bytes).collect(),
        }
    }
}

impl NmeaSource for ScriptedNmea {
    async fn read(&mut self, buf: &mut [u8]) -> usize {
        if self.clock.rewind.replace(false) {
            self.clock.set_ms(0);
        } else {
            self.clock.advance(GNSS_POLL_GRANULARITY);
        }
        let Some(mut chunk) = self.chunks.pop_front() else {
            return 0;
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        n
    }
}

// ── u-blox module ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct UbxFixture {
    /// (lat 1e-7 deg, lon 1e-7 deg, ellipsoid height mm, hDOP ×100);
    /// `None` is no fix.
    pub fix: Option<(i32, i32, i32, u16)>,
    pub nak_save: bool,
    /// Accepts writes, never answers.
    pub silent: bool,
}

/// Answers UBX polls and configuration like a module on the DDC port.
pub struct MockUblox {
    fixture: UbxFixture,
    present: bool,
    parser: UbxParser,
    outbox: VecDeque<u8>,
    configured_prt: Option<Vec<u8>>,
    pub saved: bool,
}

impl MockUblox {
    pub fn new(fixture: UbxFixture) -> Self {
        Self {
            fixture,
            present: true,
            parser: UbxParser::new(),
            outbox: VecDeque::new(),
            configured_prt: None,
            saved: false,
        }
    }

    /// No device on the bus: every transfer fails.
    pub fn absent() -> Self {
        Self {
            present: false,
            ..Self::new(UbxFixture::default())
        }
    }

    pub fn out_proto_mask(&self) -> Option<u16> {
        self.configured_prt
            .as_ref()
            .map(|p| u16::from_le_bytes([p[14], p[15]]))
    }

    fn reply(&mut self, class: u8, id: u8, payload: &[u8]) {
        self.outbox.extend(ubx::build_frame(class, id, payload).iter());
    }

    fn ack(&mut self, class: u8, id: u8, ok: bool) {
        let ack_id = if ok { ubx::ID_ACK_ACK } else { ubx::ID_ACK_NAK };
        self.reply(ubx::CLASS_ACK, ack_id, &[class, id]);
    }

    fn respond(&mut self, class: u8, id: u8, payload: &[u8]) {
        if self.fixture.silent {
            return;
        }
        match (class, id, payload.len()) {
            (ubx::CLASS_CFG, ubx::ID_CFG_PRT, 1) => {
                let mut prt = [0u8; 20];
                prt[4] = 0x42 << 1;
                prt[12..14].copy_from_slice(&0x0007u16.to_le_bytes());
                prt[14..16].copy_from_slice(&0x0003u16.to_le_bytes());
                self.reply(class, id, &prt);
            }
            (ubx::CLASS_CFG, ubx::ID_CFG_PRT, 20) => {
                self.configured_prt = Some(payload.to_vec());
                self.ack(class, id, true);
            }
            (ubx::CLASS_CFG, ubx::ID_CFG_CFG, 13) => {
                let ok = !self.fixture.nak_save;
                self.saved = ok;
                self.ack(class, id, ok);
            }
            (ubx::CLASS_NAV, ubx::ID_NAV_PVT, 0) => {
                let mut pvt = [0u8; 92];
                if let Some((lat, lon, height, _)) = self.fixture.fix {
                    pvt[20] = 3;
                    pvt[21] = 0x01;
                    pvt[24..28].copy_from_slice(&lon.to_le_bytes());
                    pvt[28..32].copy_from_slice(&lat.to_le_bytes());
                    pvt[32..36].copy_from_slice(&height.to_le_bytes());
                    // hMSL, 46.9 m of geoid separation below
                    pvt[36..40].copy_from_slice(&(height - 46_900).to_le_bytes());
                }
                self.reply(class, id, &pvt);
            }
            (ubx::CLASS_NAV, ubx::ID_NAV_DOP, 0) => {
                let mut dop = [0u8; 18];
                let hdop = self.fixture.fix.map_or(9999, |f| f.3);
                dop[12..14].copy_from_slice(&hdop.to_le_bytes());
                self.reply(class, id, &dop);
            }
            _ => {}
        }
    }
}

impl UbxPort for MockUblox {
    type Error = ();

    async fn write(&mut self, bytes: &[u8]) -> Result<(), ()> {
        if !self.present {
            return Err(());
        }
        for &b in bytes {
            if let Some(frame) = self.parser.push_byte(b) {
                self.respond(frame.class, frame.id, &frame.payload);
            }
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        if !self.present {
            return Err(());
        }
        let n = buf.len().min(self.outbox.len());
        for (slot, b) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}
