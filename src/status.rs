//! Console status output: human-readable lines and `+EVT:` machine tags.

use core::fmt::{self, Write};

use heapless::String;

pub const STATUS_LINE_LEN: usize = 192;
pub type StatusLine = String<STATUS_LINE_LEN>;

/// Debug/console transport.
pub trait Console {
    /// Writes one line. The sink adds the line terminator.
    fn write_line(&mut self, line: &str);

    /// Hands an inbound command byte to the external command parser.
    fn forward_command(&mut self, byte: u8);
}

/// Machine-parsable event markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTag<'a> {
    GnssOk,
    AccOk,
    LocationOk,
    LocationFail,
    Joined,
    JoinFailed,
    NotJoined,
    TxPendingSkip,
    SendOk,
    SendConfirmed(bool),
    SendBusy,
    SendTooBig,
    IntervalChanged(u32),
    ControlIgnored,
    Rx {
        rssi: i16,
        snr: i8,
        port: u8,
        payload: &'a [u8],
    },
}

impl fmt::Display for EventTag<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("+EVT:")?;
        match *self {
            EventTag::GnssOk => f.write_str("GNSS OK"),
            EventTag::AccOk => f.write_str("ACC OK"),
            EventTag::LocationOk => f.write_str("LOCATION OK"),
            EventTag::LocationFail => f.write_str("LOCATION FAIL"),
            EventTag::Joined => f.write_str("JOINED"),
            EventTag::JoinFailed => f.write_str("JOIN FAILED"),
            EventTag::NotJoined => f.write_str("NOT JOINED"),
            EventTag::TxPendingSkip => f.write_str("TX PENDING SKIP"),
            EventTag::SendOk => f.write_str("SEND OK"),
            EventTag::SendConfirmed(true) => f.write_str("SEND CONFIRMED SUCCESS"),
            EventTag::SendConfirmed(false) => f.write_str("SEND CONFIRMED FAIL"),
            EventTag::SendBusy => f.write_str("SEND BUSY"),
            EventTag::SendTooBig => f.write_str("SEND TOO BIG"),
            EventTag::IntervalChanged(secs) => write!(f, "SEND_INT_CHANGE {}", secs),
            EventTag::ControlIgnored => f.write_str("CTRL IGNORED"),
            EventTag::Rx {
                rssi,
                snr,
                port,
                payload,
            } => {
                write!(f, "RX_1:{}:{}:UNICAST:{}:{}", rssi, snr, port, Hex(payload))
            }
        }
    }
}

/// Formats and writes one status line, mirroring it to the log.
pub fn say<O: Console>(console: &mut O, args: fmt::Arguments<'_>) {
    let mut line = StatusLine::new();
    let _ = Truncate(&mut line).write_fmt(args);
    log_info!("{}", line.as_str());
    console.write_line(&line);
}

pub fn tag<O: Console>(console: &mut O, tag: EventTag<'_>) {
    let mut line = StatusLine::new();
    let _ = write!(Truncate(&mut line), "{}", tag);
    console.write_line(&line);
}

/// Keeps whatever fits of an overlong line.
struct Truncate<'a>(&'a mut StatusLine);

impl Write for Truncate<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                return Err(fmt::Error);
            }
        }
        Ok(())
    }
}

/// Lower-case hex dump without separators.
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Writes `mv` as volts with two decimals, e.g. `3.71`.
pub struct Volts(pub u16);

impl fmt::Display for Volts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 1000, (self.0 % 1000) / 10)
    }
}

/// Writes a ×10^5 fixed-point degree value as `-33.86000`.
pub struct Degrees(pub i32);

impl fmt::Display for Degrees {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:05}", sign, abs / 100_000, abs % 100_000)
    }
}

/// Writes a ×100 value as `1.30`.
pub struct Hundredths(pub u16);

impl fmt::Display for Hundredths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}
