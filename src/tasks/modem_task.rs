use embassy_executor::task;
use embassy_futures::select::{select, Either};
use embassy_stm32::peripherals::{DMA1_CH2, DMA1_CH4, UART4};
use embassy_stm32::usart::Uart;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Receiver;
use embassy_time::{Duration, Timer};

use lora_tracker::config::Settings;
use lora_tracker::drivers::modem::{self, CommandLine, LineReader, ModemAction, ReplyTracker};
use lora_tracker::events::EventBus;
use lora_tracker::{log_debug, log_error, log_info, log_warn};

use crate::platform::MODEM_QUEUE;

/// Gap between the configuration commands at startup.
const SETUP_GAP: Duration = Duration::from_millis(100);

/// Owns the modem UART: writes queued commands, turns event lines into bus
/// posts.
#[task]
pub async fn modem_task(
    bus: &'static EventBus,
    uart: Uart<'static, UART4, DMA1_CH4, DMA1_CH2>,
    commands: Receiver<'static, CriticalSectionRawMutex, CommandLine, MODEM_QUEUE>,
    settings: Settings,
) {
    let (mut tx, mut rx) = uart.split();
    let mut replies = ReplyTracker::new(settings.confirmed);

    for cmd in [
        modem::band_command(settings.region),
        modem::mask_command(settings.subband),
        modem::data_rate_command(settings.data_rate),
        modem::confirm_command(settings.confirmed),
        modem::join_command(),
    ] {
        if tx.write(cmd.as_bytes()).await.is_err() {
            log_error!("modem setup write failed");
        } else {
            replies.on_written(&cmd);
        }
        Timer::after(SETUP_GAP).await;
    }
    log_info!("Join requested");

    let mut reader = LineReader::new();
    let mut buf = [0u8; 64];

    loop {
        match select(rx.read_until_idle(&mut buf), commands.receive()).await {
            Either::First(Ok(n)) => {
                for &b in &buf[..n] {
                    if let Some(evt) = reader.push_byte(b) {
                        apply(bus, replies.on_event(evt));
                    }
                }
            }
            Either::First(Err(_)) => log_warn!("modem uart error"),
            Either::Second(cmd) => {
                if tx.write(cmd.as_bytes()).await.is_err() {
                    log_error!("modem write failed");
                    apply(bus, replies.on_write_failed(&cmd));
                } else {
                    replies.on_written(&cmd);
                }
            }
        }
    }
}

fn apply(bus: &EventBus, action: ModemAction) {
    match action {
        ModemAction::Complete(outcome) => {
            if !outcome.is_success() {
                log_warn!("uplink failed: {:?}", outcome);
            }
            bus.complete_tx(outcome);
        }
        ModemAction::Join(joined) => bus.report_join(joined),
        ModemAction::Deliver(frame) => {
            if !bus.deliver_rx(frame) {
                log_warn!("downlink queue full, frame dropped");
            }
        }
        ModemAction::Nothing => log_debug!("modem line handled"),
    }
}
