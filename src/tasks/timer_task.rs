use embassy_executor::task;
use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Timer};

use lora_tracker::events::{EventBus, EventKind};

use crate::platform::{TimerCommand, TimerControl};

/// Posts Status on expiry. `periodic` re-arms with the same period,
/// otherwise the timer is one-shot. A new Start replaces a running countdown.
#[task(pool_size = 2)]
pub async fn timer_task(bus: &'static EventBus, control: &'static TimerControl, periodic: bool) {
    let mut running: Option<Duration> = None;
    loop {
        let Some(period) = running else {
            if let TimerCommand::Start(p) = control.wait().await {
                running = Some(p);
            }
            continue;
        };
        match select(control.wait(), Timer::after(period)).await {
            Either::First(TimerCommand::Start(p)) => running = Some(p),
            Either::First(TimerCommand::Stop) => running = None,
            Either::Second(()) => {
                bus.post(EventKind::Status);
                if !periodic {
                    running = None;
                }
            }
        }
    }
}
