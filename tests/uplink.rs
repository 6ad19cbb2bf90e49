use embassy_time::{Duration, Instant};

use lora_tracker::codec::{decode, encode, FRAME_LEN};
use lora_tracker::config::{CONTROL_PORT, UPLINK_PORT};
use lora_tracker::dispatcher::control_interval;
use lora_tracker::drivers::modem::{parse_line, send_command, ModemEvent};
use lora_tracker::duty_cycle::{DutyCycle, MotionDecision};
use lora_tracker::events::{EventBus, EventKind};
use lora_tracker::state::LocationFix;

#[test]
fn encoded_fix_matches_server_layout() {
    let fix = LocationFix {
        latitude: 1_234_567,
        longitude: -3_386_005,
        altitude: 70_000,
        accuracy: 130,
        valid: true,
    };
    let frame = encode(&fix, fix.accuracy, 3_712);
    let bytes = frame.into_bytes();
    assert_eq!(bytes.len(), FRAME_LEN);
    assert_eq!(&bytes[0..4], &[0x87, 0xD6, 0x12, 0x00]);

    let back = decode(&lora_tracker::codec::UplinkFrame::from_bytes(bytes));
    assert_eq!(back.latitude, 1_234_567);
    assert_eq!(back.longitude, -3_386_005);
    // 70000 keeps its low 16 bits
    assert_eq!(back.altitude, (70_000u32 & 0xFFFF) as u16 as i16);
    assert_eq!(back.battery_mv, 3_712);
}

#[test]
fn uplink_goes_out_as_one_send_command() {
    let fix = LocationFix {
        latitude: 1_234_567,
        ..LocationFix::NONE
    };
    let cmd = send_command(UPLINK_PORT, encode(&fix, 0, 0).as_bytes()).expect("fits");
    assert_eq!(cmd.as_str(), "AT+SEND=2:87D6120000000000000000000000\r\n");
}

#[test]
fn reference_motion_scenario() {
    let min = DutyCycle::min_interval_for(Duration::from_millis(30_000));
    assert_eq!(min, Duration::from_millis(15_000));

    let mut d = DutyCycle::new(min, Instant::from_millis(0));
    assert_eq!(
        d.on_motion(Instant::from_millis(5_000)),
        MotionDecision::Defer(Duration::from_millis(10_000))
    );
    assert_eq!(d.on_motion(Instant::from_millis(8_000)), MotionDecision::Absorbed);
    d.on_status_handled(Instant::from_millis(15_000));
    assert!(!d.is_armed());
}

#[test]
fn modem_downlink_reaches_the_bus_as_control_message() {
    let bus = EventBus::new();
    let ModemEvent::Rx(frame) = parse_line("+EVT:RX_1:-71:8:UNICAST:3:AA550000003C") else {
        panic!("not a downlink");
    };
    assert!(bus.deliver_rx(frame));
    assert!(bus.take_pending().contains(EventKind::RadioRxData));

    let frame = bus.take_rx().expect("queued");
    assert_eq!(frame.port, CONTROL_PORT);
    assert_eq!(control_interval(&frame.payload), Some(60));
}
