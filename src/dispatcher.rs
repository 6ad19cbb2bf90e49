//! The dispatch worker: drains the event bus and runs one handler per
//! pending event kind, in priority order.

use embassy_time::Duration;

use crate::codec::encode;
use crate::config::{Settings, CONTROL_LEN, CONTROL_MAGIC, CONTROL_PORT, GNSS_DEADLINE, UPLINK_PORT};
use crate::drivers::ubx::UbxPort;
use crate::duty_cycle::{DutyCycle, MotionDecision};
use crate::events::{EventBus, EventKind};
use crate::gnss::{Gnss, NmeaSource};
use crate::ports::{Board, Clock, RadioLink, SettingsStore};
use crate::state::{RejectReason, RxFrame, SendResult, TxOutcome};
use crate::status::{say, tag, Console, Degrees, EventTag, Hex, Hundredths, Volts};

/// Report interval (s) carried by a control downlink: `AA 55` + u32 BE.
pub fn control_interval(payload: &[u8]) -> Option<u32> {
    if payload.len() != CONTROL_LEN || payload[..2] != CONTROL_MAGIC {
        return None;
    }
    Some(u32::from_be_bytes([payload[2], payload[3], payload[4], payload[5]]))
}

pub struct Dispatcher<'a, B, R, P, S, O, K> {
    bus: &'a EventBus,
    board: B,
    radio: R,
    gnss: Gnss<P, S>,
    console: O,
    store: K,
    settings: Settings,
    duty: DutyCycle,
    joined: bool,
    /// Motion seen before the join, replayed once joined
    motion_pending: bool,
}

impl<'a, B, R, P, S, O, K> Dispatcher<'a, B, R, P, S, O, K>
where
    B: Board,
    R: RadioLink,
    P: UbxPort,
    S: NmeaSource,
    O: Console,
    K: SettingsStore,
{
    /// The send spacing is fixed here from the report interval in `settings`.
    pub fn new(
        bus: &'a EventBus,
        board: B,
        radio: R,
        gnss: Gnss<P, S>,
        console: O,
        store: K,
        settings: Settings,
    ) -> Self {
        let min_interval = DutyCycle::min_interval_for(settings.report_interval());
        let duty = DutyCycle::new(min_interval, board.now());
        log_info!("Minimum send interval {} ms", min_interval.as_millis());
        Self {
            bus,
            board,
            radio,
            gnss,
            console,
            store,
            settings,
            duty,
            joined: false,
            motion_pending: false,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn duty_cycle(&self) -> &DutyCycle {
        &self.duty
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    fn report_period(&self) -> Option<Duration> {
        (self.settings.report_interval_ms != 0).then(|| self.settings.report_interval())
    }

    /// Startup banner, readiness tags and the first periodic timer start.
    pub fn start(&mut self, accel_ok: bool) {
        say(&mut self.console, format_args!("LoRaWAN location tracker"));
        say(&mut self.console, format_args!("========================"));
        say(
            &mut self.console,
            format_args!("GNSS backend: {:?}", self.gnss.kind()),
        );
        tag(&mut self.console, EventTag::GnssOk);
        if accel_ok {
            tag(&mut self.console, EventTag::AccOk);
        }
        let period = self.report_period();
        self.board.restart_report_timer(period);
    }

    /// Worker loop. Never returns.
    pub async fn run(&mut self) -> ! {
        loop {
            self.bus.wait().await;
            self.drain_and_dispatch().await;
        }
    }

    /// One dispatch cycle. Events posted by the handlers wait for the next one.
    pub async fn drain_and_dispatch(&mut self) {
        for kind in self.bus.take_pending().iter() {
            match kind {
                EventKind::Status => self.on_status().await,
                EventKind::MotionTrigger => self.on_motion(),
                EventKind::JoinResult => self.on_join_result(),
                EventKind::RadioRxData => self.on_rx_data(),
                EventKind::RadioTxDone => self.on_tx_done(),
                EventKind::ConsoleData => self.on_console_data(),
            }
        }
    }

    // ── Status ────────────────────────────────────────────────────────────

    async fn on_status(&mut self) {
        say(&mut self.console, format_args!("Timer wakeup"));
        self.board.clear_motion_latch();

        if self.bus.radio_gate().is_busy() {
            say(
                &mut self.console,
                format_args!("LoRaWAN TX cycle not finished, skip this event"),
            );
            tag(&mut self.console, EventTag::TxPendingSkip);
        } else {
            self.acquire_and_send().await;
        }

        // Sent, failed or skipped: the spacing restarts and a pending
        // deferred send is void.
        if self.duty.is_armed() {
            self.board.stop_deferred_timer();
        }
        let now = self.board.now();
        self.duty.on_status_handled(now);
    }

    async fn acquire_and_send(&mut self) {
        let battery_mv = self.board.battery_millivolts();
        say(&mut self.console, format_args!("Battery: {} V", Volts(battery_mv)));
        say(&mut self.console, format_args!("Trying to poll GNSS position"));

        let fix = self.gnss.acquire_fix(&self.board, GNSS_DEADLINE).await;
        if !fix.valid {
            tag(&mut self.console, EventTag::LocationFail);
            say(&mut self.console, format_args!("No valid GNSS position"));
            return;
        }

        tag(&mut self.console, EventTag::LocationOk);
        say(&mut self.console, format_args!("Valid GNSS position acquired"));
        say(
            &mut self.console,
            format_args!(
                "Lat {} Lon {} Alt {} m HDOP {}",
                Degrees(fix.latitude),
                Degrees(fix.longitude),
                fix.altitude,
                Hundredths(fix.accuracy)
            ),
        );

        let frame = encode(&fix, fix.accuracy, battery_mv);
        say(&mut self.console, format_args!("Payload {}", Hex(frame.as_bytes())));

        // Gate set before the radio sees the frame
        let gate = self.bus.radio_gate();
        gate.mark_in_flight();
        match self.radio.send(UPLINK_PORT, frame.as_bytes()) {
            SendResult::Enqueued => {
                say(&mut self.console, format_args!("Packet enqueued"));
            }
            SendResult::Busy => {
                gate.release();
                say(&mut self.console, format_args!("LoRa transceiver is busy"));
                tag(&mut self.console, EventTag::SendBusy);
            }
            SendResult::Rejected(RejectReason::Oversized) => {
                gate.release();
                say(
                    &mut self.console,
                    format_args!("Packet error, too big to send with current DR"),
                );
                tag(&mut self.console, EventTag::SendTooBig);
            }
        }
    }

    // ── Motion ────────────────────────────────────────────────────────────

    fn on_motion(&mut self) {
        if !self.joined {
            say(
                &mut self.console,
                format_args!("ACC triggered, held until network joined"),
            );
            tag(&mut self.console, EventTag::NotJoined);
            self.motion_pending = true;
            return;
        }
        say(&mut self.console, format_args!("ACC triggered"));

        let now = self.board.now();
        let Some(period) = self.report_period() else {
            // No periodic reports: every trigger sends
            self.duty.on_unthrottled_send(now);
            self.bus.post(EventKind::Status);
            return;
        };
        let since_last = now.checked_duration_since(self.duty.last_send());
        match self.duty.on_motion(now) {
            MotionDecision::SendNow => self.bus.post(EventKind::Status),
            MotionDecision::Defer(wait) => {
                say(
                    &mut self.console,
                    format_args!(
                        "Only {}s since last pos msg, delay by {}s",
                        since_last.map_or(0, |d| d.as_secs()),
                        wait.as_secs()
                    ),
                );
                self.board.stop_deferred_timer();
                self.board.start_deferred_timer(wait);
            }
            MotionDecision::Absorbed => log_debug!("Delayed send already pending"),
        }

        self.board.restart_report_timer(Some(period));
    }

    // ── Join ──────────────────────────────────────────────────────────────

    fn on_join_result(&mut self) {
        match self.bus.take_join_result() {
            Some(true) => {
                tag(&mut self.console, EventTag::Joined);
                self.joined = true;
                let now = self.board.now();
                self.duty.on_joined(now);
                if core::mem::take(&mut self.motion_pending) {
                    self.bus.post(EventKind::MotionTrigger);
                }
            }
            Some(false) => {
                say(&mut self.console, format_args!("Join network failed"));
                tag(&mut self.console, EventTag::JoinFailed);
            }
            None => log_warn!("Join event without a result"),
        }
    }

    // ── Downlinks ─────────────────────────────────────────────────────────

    fn on_rx_data(&mut self) {
        while let Some(frame) = self.bus.take_rx() {
            if frame.port == CONTROL_PORT {
                self.apply_control(&frame);
            }
            tag(
                &mut self.console,
                EventTag::Rx {
                    rssi: frame.rssi,
                    snr: frame.snr,
                    port: frame.port,
                    payload: &frame.payload,
                },
            );
        }
    }

    fn apply_control(&mut self, frame: &RxFrame) {
        let Some(secs) = control_interval(&frame.payload) else {
            say(
                &mut self.console,
                format_args!("Control message of {} bytes ignored", frame.payload.len()),
            );
            tag(&mut self.console, EventTag::ControlIgnored);
            return;
        };

        tag(&mut self.console, EventTag::IntervalChanged(secs));
        self.settings.report_interval_ms = secs.saturating_mul(1000);
        let period = self.report_period();
        self.board.restart_report_timer(period);
        if let Err(e) = self.store.save(&self.settings) {
            log_error!("Saving settings failed: {:?}", e);
        }
    }

    // ── Transmit completion ───────────────────────────────────────────────

    /// The gate was already released by [`EventBus::complete_tx`].
    fn on_tx_done(&mut self) {
        let outcome = self.bus.take_tx_outcome();
        if self.settings.confirmed {
            let acked = outcome.is_some_and(TxOutcome::is_success);
            tag(&mut self.console, EventTag::SendConfirmed(acked));
        } else {
            tag(&mut self.console, EventTag::SendOk);
        }
    }

    // ── Console ───────────────────────────────────────────────────────────

    fn on_console_data(&mut self) {
        let mut buf = [0u8; 32];
        loop {
            let n = self.bus.read_console(&mut buf);
            if n == 0 {
                break;
            }
            for &b in &buf[..n] {
                self.console.forward_command(b);
            }
        }
        self.console.forward_command(b'\n');
    }
}
