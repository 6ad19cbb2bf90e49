use embassy_executor::task;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Receiver;

use lora_tracker::events::EventBus;
use lora_tracker::log_warn;
use lora_tracker::status::StatusLine;

use crate::platform::CONSOLE_QUEUE;
use crate::usb::{ConsoleRx, ConsoleTx, PACKET_SIZE};

/// Status lines out to the host, dropped while no terminal holds DTR.
#[task]
pub async fn console_tx_task(
    mut tx: ConsoleTx,
    lines: Receiver<'static, CriticalSectionRawMutex, StatusLine, CONSOLE_QUEUE>,
) {
    loop {
        let line = lines.receive().await;
        if !tx.dtr() {
            continue;
        }
        for chunk in line.as_bytes().chunks(PACKET_SIZE as usize) {
            if tx.write_packet(chunk).await.is_err() {
                break;
            }
        }
        let _ = tx.write_packet(b"\r\n").await;
    }
}

/// Host input into the event bus.
#[task]
pub async fn console_rx_task(bus: &'static EventBus, mut rx: ConsoleRx) {
    let mut buf = [0u8; PACKET_SIZE as usize];
    loop {
        rx.wait_connection().await;
        while let Ok(n) = rx.read_packet(&mut buf).await {
            if bus.push_console(&buf[..n]) < n {
                log_warn!("console input overflow");
            }
        }
    }
}
