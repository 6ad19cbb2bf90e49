use embassy_executor::task;

use lora_tracker::dispatcher::Dispatcher;
use lora_tracker::drivers::flash::InternalFlash;
use lora_tracker::storage::FlashSettingsStore;

use crate::platform::{I2cUblox, ModemLink, TrackerBoard, UartNmea, UsbConsole};

pub type TrackerDispatcher = Dispatcher<
    'static,
    TrackerBoard,
    ModemLink,
    I2cUblox,
    UartNmea,
    UsbConsole,
    FlashSettingsStore<InternalFlash<'static>>,
>;

/// The single worker: every handler runs here, one drain at a time.
#[task]
pub async fn dispatch_task(mut dispatcher: TrackerDispatcher) {
    dispatcher.run().await
}
