use embassy_executor::task;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::peripherals::PB2;

use lora_tracker::events::{EventBus, EventKind};

/// LIS3DH INT1. The line stays latched high until the Status handler reads
/// INT1_SRC, so one edge is one trigger.
#[task]
pub async fn motion_task(bus: &'static EventBus, mut int1: ExtiInput<'static, PB2>) {
    loop {
        int1.wait_for_rising_edge().await;
        bus.post(EventKind::MotionTrigger);
    }
}
