use embassy_stm32::usb_otg::{self, Driver};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_usb::class::cdc_acm::{CdcAcmClass, Receiver, Sender, State};
use embassy_usb::{Builder, Config, UsbDevice};
use static_cell::StaticCell;

bind_interrupts!(pub struct Irqs {
    OTG_FS => usb_otg::InterruptHandler<peripherals::USB_OTG_FS>;
});

pub type UsbDriver = Driver<'static, peripherals::USB_OTG_FS>;
pub type ConsoleTx = Sender<'static, UsbDriver>;
pub type ConsoleRx = Receiver<'static, UsbDriver>;

pub const PACKET_SIZE: u16 = 64;

struct UsbBuffers {
    ep_out: [u8; 256],
    config_desc: [u8; 256],
    bos_desc: [u8; 256],
    control: [u8; 64],
}

static BUFFERS: StaticCell<UsbBuffers> = StaticCell::new();
static CDC_STATE: StaticCell<State<'static>> = StaticCell::new();

#[embassy_executor::task]
pub async fn usb_task(mut device: UsbDevice<'static, UsbDriver>) -> ! {
    device.run().await
}

/// CDC-ACM console, split into its write and read halves.
pub fn init(
    usb_periph: peripherals::USB_OTG_FS,
    pa12: peripherals::PA12,
    pa11: peripherals::PA11,
) -> (UsbDevice<'static, UsbDriver>, ConsoleTx, ConsoleRx) {
    let bufs = BUFFERS.init(UsbBuffers {
        ep_out: [0; 256],
        config_desc: [0; 256],
        bos_desc: [0; 256],
        control: [0; 64],
    });

    let mut usb_config = usb_otg::Config::default();
    usb_config.vbus_detection = false;
    let driver = Driver::new_fs(usb_periph, Irqs, pa12, pa11, &mut bufs.ep_out, usb_config);

    let mut config = Config::new(0xc0de, 0xcafe);
    config.manufacturer = Some("lora-tracker");
    config.product = Some("LoRaWAN location tracker");
    config.serial_number = Some("00000001");

    let mut builder = Builder::new(
        driver,
        config,
        &mut bufs.config_desc,
        &mut bufs.bos_desc,
        &mut [], // msos_descs
        &mut bufs.control,
    );

    let class = CdcAcmClass::new(&mut builder, CDC_STATE.init(State::new()), PACKET_SIZE);
    let usb = builder.build();
    let (tx, rx) = class.split();

    (usb, tx, rx)
}
