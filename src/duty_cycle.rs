//! Minimum-spacing scheduler for motion-triggered sends.
//!
//! Motion can fire far more often than the radio's airtime budget allows.
//! Excess triggers inside the minimum interval are coalesced into exactly one
//! deferred send.

use embassy_time::{Duration, Instant};

use crate::config::{MIN_SEND_INTERVAL_FLOOR, MIN_SEND_INTERVAL_NO_REPORTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum DutyState {
    Idle,
    /// A deferred-send timer is counting down.
    Armed,
}

/// What the dispatcher must do with a motion trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionDecision {
    /// Post Status now.
    SendNow,
    /// (Re)start the deferred-send timer for this long.
    Defer(Duration),
    /// A deferred send is already pending.
    Absorbed,
}

pub struct DutyCycle {
    last_send: Instant,
    min_interval: Duration,
    state: DutyState,
}

impl DutyCycle {
    pub fn new(min_interval: Duration, now: Instant) -> Self {
        Self {
            last_send: now,
            min_interval,
            state: DutyState::Idle,
        }
    }

    /// Half the report period, not below the floor. A disabled period (0)
    /// gets a fixed spacing.
    pub fn min_interval_for(report_period: Duration) -> Duration {
        if report_period == Duration::from_ticks(0) {
            return MIN_SEND_INTERVAL_NO_REPORTS;
        }
        let half = Duration::from_ticks(report_period.as_ticks() / 2);
        if half < MIN_SEND_INTERVAL_FLOOR {
            MIN_SEND_INTERVAL_FLOOR
        } else {
            half
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn state(&self) -> DutyState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state == DutyState::Armed
    }

    pub fn last_send(&self) -> Instant {
        self.last_send
    }

    pub fn on_motion(&mut self, now: Instant) -> MotionDecision {
        if self.state == DutyState::Armed {
            return MotionDecision::Absorbed;
        }

        let elapsed = now.checked_duration_since(self.last_send);
        if let Some(e) = elapsed {
            if e >= self.min_interval {
                self.last_send = now;
                return MotionDecision::SendNow;
            }
        }

        // A clock anomaly (last send in the future) waits the full interval.
        let wait = match elapsed.and_then(|e| self.min_interval.checked_sub(e)) {
            Some(r) if r > Duration::from_ticks(0) => r,
            _ => self.min_interval,
        };
        self.state = DutyState::Armed;
        MotionDecision::Defer(wait)
    }

    /// Records a handled Status cycle, sent or skipped, and returns to Idle.
    ///
    /// A skip because the radio was busy also counts as a send here, so the
    /// next motion send may come sooner than `min_interval` after the last
    /// real transmission.
    pub fn on_status_handled(&mut self, now: Instant) {
        self.last_send = now;
        self.state = DutyState::Idle;
    }

    /// Motion sent without spacing (periodic reports disabled).
    pub fn on_unthrottled_send(&mut self, now: Instant) {
        self.last_send = now;
    }

    /// Network join completed; spacing restarts from now.
    pub fn on_joined(&mut self, now: Instant) {
        self.last_send = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn min_interval_is_half_the_report_period() {
        assert_eq!(DutyCycle::min_interval_for(ms(120_000)), ms(60_000));
        assert_eq!(DutyCycle::min_interval_for(ms(20_000)), ms(15_000));
        assert_eq!(DutyCycle::min_interval_for(ms(0)), ms(30_000));
    }

    #[test]
    fn motion_after_interval_sends_now() {
        for elapsed in [15_000, 15_001, 60_000, 3_600_000] {
            let mut d = DutyCycle::new(ms(15_000), at(1_000));
            assert_eq!(d.on_motion(at(1_000 + elapsed)), MotionDecision::SendNow);
            assert_eq!(d.state(), DutyState::Idle);
            assert_eq!(d.last_send(), at(1_000 + elapsed));
        }
    }

    #[test]
    fn motion_inside_interval_defers_for_the_remainder() {
        for elapsed in [0, 1, 5_000, 14_999] {
            let mut d = DutyCycle::new(ms(15_000), at(0));
            assert_eq!(
                d.on_motion(at(elapsed)),
                MotionDecision::Defer(ms(15_000 - elapsed))
            );
            assert!(d.is_armed());
        }
    }

    #[test]
    fn second_motion_while_armed_is_absorbed() {
        let mut d = DutyCycle::new(ms(15_000), at(0));
        assert_eq!(d.on_motion(at(5_000)), MotionDecision::Defer(ms(10_000)));
        assert_eq!(d.on_motion(at(8_000)), MotionDecision::Absorbed);
        // Even past the interval the armed timer stays the only sender.
        assert_eq!(d.on_motion(at(40_000)), MotionDecision::Absorbed);
    }

    #[test]
    fn clock_going_backwards_waits_full_interval() {
        let mut d = DutyCycle::new(ms(15_000), at(50_000));
        assert_eq!(d.on_motion(at(10_000)), MotionDecision::Defer(ms(15_000)));
    }

    #[test]
    fn status_returns_to_idle_and_restarts_spacing() {
        let mut d = DutyCycle::new(ms(15_000), at(0));
        d.on_motion(at(5_000));
        d.on_status_handled(at(15_000));
        assert_eq!(d.state(), DutyState::Idle);
        assert_eq!(d.on_motion(at(20_000)), MotionDecision::Defer(ms(10_000)));
    }
}
