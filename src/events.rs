//! Cross-context event plumbing.
//!
//! [`EventBus`] is the only state shared between the dispatch worker and the
//! producers (timers, the motion interrupt, the radio stack, the console).
//! Producers set bits and signal; the worker drains.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::pipe::Pipe;
use embassy_sync::signal::Signal;

use crate::state::{RxFrame, TxOutcome};

pub const RX_QUEUE_DEPTH: usize = 4;
pub const CONSOLE_RX_SIZE: usize = 128;

// ── Event kinds ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum EventKind {
    /// Periodic or deferred wake-up: acquire and send a position.
    Status,
    MotionTrigger,
    JoinResult,
    RadioRxData,
    RadioTxDone,
    ConsoleData,
}

impl EventKind {
    /// Drain order of one dispatch cycle.
    pub const PRIORITY: [EventKind; 6] = [
        EventKind::Status,
        EventKind::MotionTrigger,
        EventKind::JoinResult,
        EventKind::RadioRxData,
        EventKind::RadioTxDone,
        EventKind::ConsoleData,
    ];

    pub const fn bit(self) -> u8 {
        match self {
            EventKind::Status => 1 << 0,
            EventKind::MotionTrigger => 1 << 1,
            EventKind::JoinResult => 1 << 2,
            EventKind::RadioRxData => 1 << 3,
            EventKind::RadioTxDone => 1 << 4,
            EventKind::ConsoleData => 1 << 5,
        }
    }
}

const KNOWN_EVENTS: u8 = 0b0011_1111;

/// A snapshot of drained event bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventSet(u8);

impl EventSet {
    pub const EMPTY: Self = Self(0);

    pub fn contains(self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Present kinds in dispatch order.
    pub fn iter(self) -> impl Iterator<Item = EventKind> {
        EventKind::PRIORITY.into_iter().filter(move |k| self.contains(*k))
    }
}

impl From<EventKind> for EventSet {
    fn from(k: EventKind) -> Self {
        Self(k.bit())
    }
}

// ── Radio gate ────────────────────────────────────────────────────────────────

/// "Transmit in flight" flag. Set by the worker on a successful enqueue,
/// cleared by the radio completion callback.
pub struct RadioGate(AtomicBool);

impl RadioGate {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn mark_in_flight(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn release(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for RadioGate {
    fn default() -> Self {
        Self::new()
    }
}

// ── Bus ───────────────────────────────────────────────────────────────────────

pub struct EventBus {
    pending: AtomicU8,
    wake: Signal<CriticalSectionRawMutex, ()>,
    radio_gate: RadioGate,
    rx_frames: Channel<CriticalSectionRawMutex, RxFrame, RX_QUEUE_DEPTH>,
    tx_outcome: Mutex<Cell<Option<TxOutcome>>>,
    join_result: Mutex<Cell<Option<bool>>>,
    console_rx: Pipe<CriticalSectionRawMutex, CONSOLE_RX_SIZE>,
}

impl EventBus {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU8::new(0),
            wake: Signal::new(),
            radio_gate: RadioGate::new(),
            rx_frames: Channel::new(),
            tx_outcome: Mutex::new(Cell::new(None)),
            join_result: Mutex::new(Cell::new(None)),
            console_rx: Pipe::new(),
        }
    }

    /// Sets one event bit and wakes the worker. Safe from any context.
    pub fn post(&self, kind: EventKind) {
        self.post_bits(kind.bit());
    }

    fn post_bits(&self, bits: u8) {
        self.pending.fetch_or(bits, Ordering::AcqRel);
        self.wake.signal(());
    }

    /// Atomically takes every recognized pending bit. Bits posted after the
    /// read stay pending; unknown bits are left alone.
    pub fn take_pending(&self) -> EventSet {
        let prev = self.pending.fetch_and(!KNOWN_EVENTS, Ordering::AcqRel);
        EventSet(prev & KNOWN_EVENTS)
    }

    pub fn is_pending(&self, kind: EventKind) -> bool {
        self.pending.load(Ordering::Acquire) & kind.bit() != 0
    }

    /// Waits until something was posted since the last wake.
    pub async fn wait(&self) {
        self.wake.wait().await;
    }

    pub fn radio_gate(&self) -> &RadioGate {
        &self.radio_gate
    }

    // ── Producer side ─────────────────────────────────────────────

    /// Queues a downlink. A full queue drops the frame and returns false.
    pub fn deliver_rx(&self, frame: RxFrame) -> bool {
        let queued = self.rx_frames.try_send(frame).is_ok();
        self.post(EventKind::RadioRxData);
        queued
    }

    /// Radio completion callback: records the outcome and releases the gate.
    pub fn complete_tx(&self, outcome: TxOutcome) {
        critical_section::with(|cs| self.tx_outcome.borrow(cs).set(Some(outcome)));
        self.radio_gate.release();
        self.post(EventKind::RadioTxDone);
    }

    pub fn report_join(&self, joined: bool) {
        critical_section::with(|cs| self.join_result.borrow(cs).set(Some(joined)));
        self.post(EventKind::JoinResult);
    }

    /// Buffers console input. Returns how many bytes fit.
    pub fn push_console(&self, bytes: &[u8]) -> usize {
        let n = self.console_rx.try_write(bytes).unwrap_or(0);
        if n > 0 {
            self.post(EventKind::ConsoleData);
        }
        n
    }

    // ── Worker side ───────────────────────────────────────────────

    pub fn take_rx(&self) -> Option<RxFrame> {
        self.rx_frames.try_receive().ok()
    }

    pub fn take_tx_outcome(&self) -> Option<TxOutcome> {
        critical_section::with(|cs| self.tx_outcome.borrow(cs).take())
    }

    pub fn take_join_result(&self) -> Option<bool> {
        critical_section::with(|cs| self.join_result.borrow(cs).take())
    }

    /// Reads buffered console bytes, returns 0 when empty.
    pub fn read_console(&self, buf: &mut [u8]) -> usize {
        self.console_rx.try_read(buf).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
