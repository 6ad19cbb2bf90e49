#![no_std]
#![no_main]

mod board;
mod platform;
mod tasks;
mod usb;

use embassy_executor::Spawner;
use embassy_stm32::adc::Adc;
use embassy_stm32::dma::NoDma;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::flash::Flash;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::i2c::I2c;
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::usart::{Config as UsartConfig, Uart};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Delay, Duration, Timer};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use lora_tracker::config::load_settings;
use lora_tracker::dispatcher::Dispatcher;
use lora_tracker::drivers::flash::InternalFlash;
use lora_tracker::drivers::lis3dh::Lis3dh;
use lora_tracker::drivers::modem::CommandLine;
use lora_tracker::events::EventBus;
use lora_tracker::gnss::Gnss;
use lora_tracker::status::StatusLine;
use lora_tracker::{log_error, log_info};

use crate::board::Board;
use crate::platform::{
    I2cUblox, ModemLink, TimerControl, TrackerBoard, UartNmea, UsbConsole, CONSOLE_QUEUE,
    MODEM_QUEUE,
};

// ── Shared state ──────────────────────────────────────────────────────────────
static BUS: StaticCell<EventBus> = StaticCell::new();

static DEFERRED_TIMER: TimerControl = TimerControl::new();
static REPORT_TIMER: TimerControl = TimerControl::new();

static MODEM_CMDS: Channel<CriticalSectionRawMutex, CommandLine, MODEM_QUEUE> = Channel::new();
static CONSOLE_LINES: Channel<CriticalSectionRawMutex, StatusLine, CONSOLE_QUEUE> =
    Channel::new();

// ── Interrupt bindings ────────────────────────────────────────────────────────
bind_interrupts!(struct Irqs {
    I2C1_EV => embassy_stm32::i2c::EventInterruptHandler<peripherals::I2C1>;
    I2C1_ER => embassy_stm32::i2c::ErrorInterruptHandler<peripherals::I2C1>;
    I2C2_EV => embassy_stm32::i2c::EventInterruptHandler<peripherals::I2C2>;
    I2C2_ER => embassy_stm32::i2c::ErrorInterruptHandler<peripherals::I2C2>;
    USART2  => embassy_stm32::usart::InterruptHandler<peripherals::USART2>;
    UART4   => embassy_stm32::usart::InterruptHandler<peripherals::UART4>;
});

// ── Main ──────────────────────────────────────────────────────────────────────
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // 1. Board init (84 MHz PLL)
    let board = Board::init();
    let p = board.p;
    let bus: &'static EventBus = BUS.init(EventBus::new());

    // 2. USB console (CDC-ACM)
    let (usb_dev, console_tx, console_rx) = usb::init(p.USB_OTG_FS, p.PA12, p.PA11);
    spawner.spawn(usb::usb_task(usb_dev)).unwrap();
    spawner
        .spawn(tasks::console_task::console_tx_task(console_tx, CONSOLE_LINES.receiver()))
        .unwrap();
    spawner
        .spawn(tasks::console_task::console_rx_task(bus, console_rx))
        .unwrap();

    // 3. GNSS module power (PB5), then give it time to boot
    let _gnss_power = Output::new(p.PB5, Level::High, Speed::Low);
    Timer::after(Duration::from_millis(500)).await;

    // 4. Persisted settings (flash sector 11)
    let mut store = InternalFlash::new(Flash::new_blocking(p.FLASH)).settings_store();
    let settings = load_settings(&mut store);
    log_info!("Settings: {:?}", settings);

    // 5. I2C1 @ 400 kHz, LIS3DH (SCL=PB8, SDA=PB9), INT1 on PB2
    let mut i2c1 = I2c::new(
        p.I2C1,
        p.PB8, p.PB9,
        Irqs,
        p.DMA1_CH7,
        p.DMA1_CH0,
        TimeHertz(400_000),
        Default::default(),
    );
    let accel = match Lis3dh::init(&mut i2c1) {
        Ok(a) => Some(a),
        Err(e) => {
            log_error!("LIS3DH init failed: {:?}", e);
            None
        }
    };
    let int1 = ExtiInput::new(Input::new(p.PB2, Pull::Down), p.EXTI2);
    spawner
        .spawn(tasks::motion_task::motion_task(bus, int1))
        .unwrap();

    // 6. GNSS: u-blox on I2C2 @ 100 kHz (SCL=PB10, SDA=PB11), NMEA fallback
    //    on USART2 @ 9600 (RX=PA3)
    let i2c2 = I2c::new(
        p.I2C2,
        p.PB10, p.PB11,
        Irqs,
        NoDma,
        NoDma,
        TimeHertz(100_000),
        Default::default(),
    );
    let mut nmea_config = UsartConfig::default();
    nmea_config.baudrate = 9_600;
    let nmea_uart = Uart::new(
        p.USART2, p.PA3, p.PA2,
        Irqs,
        p.DMA1_CH6, p.DMA1_CH5,
        nmea_config,
    ).unwrap();
    let (_nmea_tx, nmea_rx) = nmea_uart.split();
    let gnss = Gnss::initialize(I2cUblox::new(i2c2), move |ublox| {
        drop(ublox);
        UartNmea::new(nmea_rx)
    })
    .await;

    // 7. LoRaWAN modem UART4 @ 115200 (TX=PA0, RX=PA1)
    let mut modem_config = UsartConfig::default();
    modem_config.baudrate = 115_200;
    let modem_uart = Uart::new(
        p.UART4, p.PA1, p.PA0,
        Irqs,
        p.DMA1_CH4, p.DMA1_CH2,
        modem_config,
    ).unwrap();
    spawner
        .spawn(tasks::modem_task::modem_task(
            bus,
            modem_uart,
            MODEM_CMDS.receiver(),
            settings,
        ))
        .unwrap();

    // 8. Timers
    spawner
        .spawn(tasks::timer_task::timer_task(bus, &DEFERRED_TIMER, false))
        .unwrap();
    spawner
        .spawn(tasks::timer_task::timer_task(bus, &REPORT_TIMER, true))
        .unwrap();

    // 9. Battery sense on PC0 (ADC1_IN10)
    let adc = Adc::new(p.ADC1, &mut Delay);

    // 10. Dispatcher
    let accel_ok = accel.is_some();
    let tracker_board = TrackerBoard::new(adc, p.PC0, i2c1, accel, &DEFERRED_TIMER, &REPORT_TIMER);
    let radio = ModemLink::new(
        MODEM_CMDS.sender(),
        settings.region.max_payload(settings.data_rate),
    );
    let console = UsbConsole::new(CONSOLE_LINES.sender(), MODEM_CMDS.sender());
    let mut dispatcher = Dispatcher::new(bus, tracker_board, radio, gnss, console, store, settings);
    dispatcher.start(accel_ok);
    spawner
        .spawn(tasks::dispatch_task::dispatch_task(dispatcher))
        .unwrap();

    // 11. Heartbeat LED (PC13)
    let mut led = Output::new(p.PC13, Level::High, Speed::Low);
    loop {
        led.toggle();
        Timer::after(Duration::from_millis(1000)).await;
    }
}
