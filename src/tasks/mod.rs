pub mod console_task;
pub mod dispatch_task;
pub mod modem_task;
pub mod motion_task;
pub mod timer_task;
