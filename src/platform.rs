//! STM32 implementations of the tracker's collaborator traits.

use embassy_futures::select::{select, Either};
use embassy_stm32::adc::Adc;
use embassy_stm32::dma::NoDma;
use embassy_stm32::i2c::{Error as I2cError, I2c};
use embassy_stm32::peripherals::{ADC1, DMA1_CH0, DMA1_CH5, DMA1_CH7, I2C1, I2C2, PC0, USART2};
use embassy_stm32::usart::UartRx;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};

use lora_tracker::config::GNSS_POLL_GRANULARITY;
use lora_tracker::drivers::lis3dh::Lis3dh;
use lora_tracker::drivers::modem::{self, CommandLine};
use lora_tracker::drivers::ubx::UbxPort;
use lora_tracker::gnss::NmeaSource;
use lora_tracker::ports::{Board, Clock, RadioLink};
use lora_tracker::state::{RejectReason, SendResult};
use lora_tracker::status::{Console, StatusLine};
use lora_tracker::{log_error, log_warn};

pub const MODEM_QUEUE: usize = 2;
pub const CONSOLE_QUEUE: usize = 8;

pub type TimerControl = Signal<CriticalSectionRawMutex, TimerCommand>;
pub type ModemCommands = Sender<'static, CriticalSectionRawMutex, CommandLine, MODEM_QUEUE>;
pub type ConsoleLines = Sender<'static, CriticalSectionRawMutex, StatusLine, CONSOLE_QUEUE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum TimerCommand {
    Start(Duration),
    Stop,
}

// ── Board services ────────────────────────────────────────────────────────────

/// ADC reference and the 1:2 battery divider
const VREF_MV: u32 = 3300;
const VBAT_DIVIDER: u32 = 2;
const ADC_FULL_SCALE: u32 = 4095;

pub struct TrackerBoard {
    adc: Adc<'static, ADC1>,
    vbat: PC0,
    i2c: I2c<'static, I2C1, DMA1_CH7, DMA1_CH0>,
    accel: Option<Lis3dh>,
    deferred: &'static TimerControl,
    report: &'static TimerControl,
}

impl TrackerBoard {
    pub fn new(
        adc: Adc<'static, ADC1>,
        vbat: PC0,
        i2c: I2c<'static, I2C1, DMA1_CH7, DMA1_CH0>,
        accel: Option<Lis3dh>,
        deferred: &'static TimerControl,
        report: &'static TimerControl,
    ) -> Self {
        Self {
            adc,
            vbat,
            i2c,
            accel,
            deferred,
            report,
        }
    }
}

impl Clock for TrackerBoard {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl Board for TrackerBoard {
    fn battery_millivolts(&mut self) -> u16 {
        let raw = self.adc.read(&mut self.vbat) as u32;
        (raw * VREF_MV * VBAT_DIVIDER / ADC_FULL_SCALE) as u16
    }

    fn clear_motion_latch(&mut self) {
        if let Some(accel) = &self.accel {
            if let Err(e) = accel.clear_latch(&mut self.i2c) {
                log_warn!("LIS3DH latch clear failed: {:?}", e);
            }
        }
    }

    fn start_deferred_timer(&mut self, after: Duration) {
        self.deferred.signal(TimerCommand::Start(after));
    }

    fn stop_deferred_timer(&mut self) {
        self.deferred.signal(TimerCommand::Stop);
    }

    fn restart_report_timer(&mut self, period: Option<Duration>) {
        self.report.signal(match period {
            Some(p) => TimerCommand::Start(p),
            None => TimerCommand::Stop,
        });
    }
}

// ── Radio ─────────────────────────────────────────────────────────────────────

/// Hands uplinks to the modem task as `AT+SEND` lines.
pub struct ModemLink {
    commands: ModemCommands,
    max_payload: usize,
}

impl ModemLink {
    /// `max_payload` is the region limit at the configured data rate.
    pub fn new(commands: ModemCommands, max_payload: usize) -> Self {
        Self {
            commands,
            max_payload,
        }
    }
}

impl RadioLink for ModemLink {
    fn send(&mut self, port: u8, payload: &[u8]) -> SendResult {
        if payload.len() > self.max_payload {
            return SendResult::Rejected(RejectReason::Oversized);
        }
        let Ok(line) = modem::send_command(port, payload) else {
            return SendResult::Rejected(RejectReason::Oversized);
        };
        match self.commands.try_send(line) {
            Ok(()) => SendResult::Enqueued,
            Err(_) => SendResult::Busy,
        }
    }
}

// ── GNSS transports ───────────────────────────────────────────────────────────

const UBLOX_ADDR: u8 = 0x42;
const REG_BYTES_AVAILABLE: u8 = 0xFD;
/// Wait before reporting an empty DDC buffer.
const DDC_IDLE: Duration = Duration::from_millis(20);

/// u-blox DDC (I2C) port.
pub struct I2cUblox {
    i2c: I2c<'static, I2C2, NoDma, NoDma>,
}

impl I2cUblox {
    pub fn new(i2c: I2c<'static, I2C2, NoDma, NoDma>) -> Self {
        Self { i2c }
    }
}

impl UbxPort for I2cUblox {
    type Error = I2cError;

    async fn write(&mut self, bytes: &[u8]) -> Result<(), I2cError> {
        self.i2c.blocking_write(UBLOX_ADDR, bytes)
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, I2cError> {
        let mut avail = [0u8; 2];
        self.i2c
            .blocking_write_read(UBLOX_ADDR, &[REG_BYTES_AVAILABLE], &mut avail)?;
        let n = (u16::from_be_bytes(avail) as usize).min(buf.len());
        if n == 0 {
            Timer::after(DDC_IDLE).await;
            return Ok(0);
        }
        // The register pointer now sits on the 0xFF data stream
        self.i2c.blocking_read(UBLOX_ADDR, &mut buf[..n])?;
        Ok(n)
    }
}

/// NMEA receiver on USART2, RX only.
pub struct UartNmea {
    rx: UartRx<'static, USART2, DMA1_CH5>,
}

impl UartNmea {
    pub fn new(rx: UartRx<'static, USART2, DMA1_CH5>) -> Self {
        Self { rx }
    }
}

impl NmeaSource for UartNmea {
    async fn read(&mut self, buf: &mut [u8]) -> usize {
        match select(self.rx.read_until_idle(buf), Timer::after(GNSS_POLL_GRANULARITY)).await {
            Either::First(Ok(n)) => n,
            Either::First(Err(_)) => {
                log_warn!("NMEA uart error");
                0
            }
            Either::Second(()) => 0,
        }
    }
}

// ── Console ───────────────────────────────────────────────────────────────────

/// USB console. Command lines typed by the user go to the modem verbatim.
pub struct UsbConsole {
    lines: ConsoleLines,
    modem: ModemCommands,
    command: CommandLine,
}

impl UsbConsole {
    pub fn new(lines: ConsoleLines, modem: ModemCommands) -> Self {
        Self {
            lines,
            modem,
            command: CommandLine::new(),
        }
    }
}

impl Console for UsbConsole {
    fn write_line(&mut self, line: &str) {
        let mut l = StatusLine::new();
        let _ = l.push_str(line);
        // Nobody listening: drop
        let _ = self.lines.try_send(l);
    }

    fn forward_command(&mut self, byte: u8) {
        match byte {
            b'\r' => {}
            b'\n' => {
                if self.command.is_empty() {
                    return;
                }
                let _ = self.command.push_str("\r\n");
                let line = core::mem::take(&mut self.command);
                if self.modem.try_send(line).is_err() {
                    log_error!("modem busy, console command dropped");
                }
            }
            b => {
                // Keep room for the terminator
                if self.command.len() + 2 >= self.command.capacity()
                    || self.command.push(b as char).is_err()
                {
                    self.command.clear();
                }
            }
        }
    }
}
