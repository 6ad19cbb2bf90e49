//! AT-command protocol of the UART LoRaWAN modem (RUI3 command set).

use core::fmt::Write;

use heapless::String;

use crate::config::Region;
use crate::state::{RxFrame, TxOutcome, RX_PAYLOAD_MAX};

pub const LINE_MAX: usize = 160;
pub type CommandLine = String<LINE_MAX>;

/// Largest payload `send_command` formats.
pub const SEND_PAYLOAD_MAX: usize = 64;

const EVT_PREFIX: &str = "+EVT:";
const JOIN_ATTEMPTS: u8 = 8;
const JOIN_RETRY_SECS: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "firmware", derive(defmt::Format))]
pub enum ModemError {
    /// Payload larger than [`SEND_PAYLOAD_MAX`]
    PayloadTooLong,
    /// UART transfer failed
    Uart,
    /// No answer before the command timeout
    Timeout,
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn command(args: core::fmt::Arguments<'_>) -> CommandLine {
    let mut s = CommandLine::new();
    let _ = s.write_fmt(args);
    let _ = s.push_str("\r\n");
    s
}

/// `AT+SEND=<port>:<HEX>`
pub fn send_command(port: u8, payload: &[u8]) -> Result<CommandLine, ModemError> {
    if payload.len() > SEND_PAYLOAD_MAX {
        return Err(ModemError::PayloadTooLong);
    }
    let mut s = CommandLine::new();
    let _ = write!(s, "AT+SEND={}:", port);
    for b in payload {
        let _ = write!(s, "{:02X}", b);
    }
    let _ = s.push_str("\r\n");
    Ok(s)
}

/// OTAA join; the modem retries on its own, the core never does.
pub fn join_command() -> CommandLine {
    command(format_args!(
        "AT+JOIN=1:0:{}:{}",
        JOIN_RETRY_SECS, JOIN_ATTEMPTS
    ))
}

pub fn band_command(region: Region) -> CommandLine {
    command(format_args!("AT+BAND={}", region.id()))
}

/// 8-channel sub-band mask, only meaningful for US915/AU915/CN470.
pub fn mask_command(subband: u8) -> CommandLine {
    let mask: u16 = match subband {
        1..=12 => 1 << (subband - 1),
        _ => 0x0001,
    };
    command(format_args!("AT+MASK={:04X}", mask))
}

pub fn data_rate_command(dr: u8) -> CommandLine {
    command(format_args!("AT+DR={}", dr))
}

pub fn confirm_command(confirmed: bool) -> CommandLine {
    command(format_args!("AT+CFM={}", confirmed as u8))
}

// ── Responses and events ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemEvent {
    Ok,
    Busy,
    ParamError,
    Error,
    Joined,
    JoinFailed,
    TxDone,
    /// Confirmed uplink acknowledged (true) or not (false).
    Confirmed(bool),
    Rx(RxFrame),
    /// Anything else, including malformed event lines.
    Other,
}

impl ModemEvent {
    /// Completion of an uplink, given the confirm mode it was sent with.
    pub fn tx_outcome(&self, confirmed: bool) -> Option<TxOutcome> {
        match *self {
            ModemEvent::TxDone if !confirmed => Some(TxOutcome::Sent),
            ModemEvent::Confirmed(true) => Some(TxOutcome::Confirmed),
            ModemEvent::Confirmed(false) => Some(TxOutcome::Unconfirmed),
            _ => None,
        }
    }
}

pub fn parse_line(line: &str) -> ModemEvent {
    let line = line.trim();
    match line {
        "OK" => return ModemEvent::Ok,
        "AT_BUSY_ERROR" => return ModemEvent::Busy,
        "AT_PARAM_ERROR" => return ModemEvent::ParamError,
        "AT_ERROR" | "AT_COMMAND_NOT_FOUND" | "AT_NO_NETWORK_JOINED" => {
            return ModemEvent::Error
        }
        _ => {}
    }

    let Some(evt) = line.strip_prefix(EVT_PREFIX) else {
        return ModemEvent::Other;
    };
    if evt == "JOINED" {
        ModemEvent::Joined
    } else if evt.starts_with("JOIN_FAILED") {
        ModemEvent::JoinFailed
    } else if evt == "TX_DONE" {
        ModemEvent::TxDone
    } else if evt == "SEND_CONFIRMED_OK" {
        ModemEvent::Confirmed(true)
    } else if evt.starts_with("SEND_CONFIRMED_FAILED") {
        ModemEvent::Confirmed(false)
    } else if evt.starts_with("RX_") {
        parse_rx(evt).map_or(ModemEvent::Other, ModemEvent::Rx)
    } else {
        ModemEvent::Other
    }
}

/// `RX_<win>:<rssi>:<snr>:UNICAST:<port>:<hex>`
fn parse_rx(evt: &str) -> Option<RxFrame> {
    let mut parts = evt.split(':');
    let _window = parts.next()?;
    let rssi = parts.next()?.parse::<i16>().ok()?;
    let snr = parts.next()?.parse::<i8>().ok()?;
    let _cast = parts.next()?;
    let port = parts.next()?.parse::<u8>().ok()?;
    let hex = parts.next().unwrap_or("");

    let mut payload: heapless::Vec<u8, RX_PAYLOAD_MAX> = heapless::Vec::new();
    let digits = hex.as_bytes();
    if digits.len() % 2 != 0 {
        return None;
    }
    for pair in digits.chunks(2) {
        let hi = hex_value(pair[0])?;
        let lo = hex_value(pair[1])?;
        if payload.push((hi << 4) | lo).is_err() {
            break;
        }
    }
    Some(RxFrame::new(rssi, snr, port, &payload))
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Splits the modem UART stream into lines.
pub struct LineReader {
    buf: String<LINE_MAX>,
    /// Lines dropped for length
    pub overflows: u16,
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

impl LineReader {
    pub fn new() -> Self {
        Self {
            buf: String::new(),
            overflows: 0,
        }
    }

    /// Feeds one byte; returns the parsed line on `\n`. Blank lines are skipped.
    pub fn push_byte(&mut self, b: u8) -> Option<ModemEvent> {
        match b {
            b'\n' => {
                let line = self.buf.trim();
                let evt = (!line.is_empty()).then(|| parse_line(line));
                self.buf.clear();
                evt
            }
            b'\r' => None,
            _ => {
                if !b.is_ascii() || self.buf.push(b as char).is_err() {
                    self.overflows = self.overflows.wrapping_add(1);
                    self.buf.clear();
                }
                None
            }
        }
    }
}

// ── Reply tracking ────────────────────────────────────────────────────────────

/// What the modem task should do with an event line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemAction {
    Complete(TxOutcome),
    Join(bool),
    Deliver(RxFrame),
    Nothing,
}

/// Pairs `OK` and error lines with the commands they answer. The modem
/// replies in write order.
#[derive(Debug, Default)]
pub struct ReplyTracker {
    confirmed: bool,
    outstanding: u8,
    /// Replies still due before the uplink's own, when one is in flight.
    uplink_slot: Option<u8>,
}

impl ReplyTracker {
    pub fn new(confirmed: bool) -> Self {
        Self {
            confirmed,
            ..Self::default()
        }
    }

    pub fn uplink_in_flight(&self) -> bool {
        self.uplink_slot.is_some()
    }

    /// A command line reached the modem.
    pub fn on_written(&mut self, cmd: &str) {
        if is_send(cmd) {
            self.uplink_slot = Some(self.outstanding);
        }
        self.outstanding = self.outstanding.saturating_add(1);
    }

    /// A command line could not be written. An uplink fails right away.
    pub fn on_write_failed(&mut self, cmd: &str) -> ModemAction {
        if is_send(cmd) {
            ModemAction::Complete(TxOutcome::Failed)
        } else {
            ModemAction::Nothing
        }
    }

    pub fn on_event(&mut self, evt: ModemEvent) -> ModemAction {
        if let Some(outcome) = evt.tx_outcome(self.confirmed) {
            // Reply line lost: the completion still settles the uplink
            if self.uplink_slot.take().is_some() {
                self.outstanding = self.outstanding.saturating_sub(1);
            }
            return ModemAction::Complete(outcome);
        }
        match evt {
            ModemEvent::Ok => {
                self.on_reply();
                ModemAction::Nothing
            }
            ModemEvent::Busy | ModemEvent::ParamError | ModemEvent::Error => {
                if self.on_reply() {
                    ModemAction::Complete(TxOutcome::Failed)
                } else {
                    ModemAction::Nothing
                }
            }
            ModemEvent::Joined => ModemAction::Join(true),
            ModemEvent::JoinFailed => ModemAction::Join(false),
            ModemEvent::Rx(frame) => ModemAction::Deliver(frame),
            ModemEvent::TxDone | ModemEvent::Confirmed(_) | ModemEvent::Other => {
                ModemAction::Nothing
            }
        }
    }

    /// Consumes one reply. Returns true if it answered the uplink.
    fn on_reply(&mut self) -> bool {
        if self.outstanding == 0 {
            return false;
        }
        self.outstanding -= 1;
        match self.uplink_slot {
            Some(0) => {
                self.uplink_slot = None;
                true
            }
            Some(n) => {
                self.uplink_slot = Some(n - 1);
                false
            }
            None => false,
        }
    }
}

fn is_send(cmd: &str) -> bool {
    cmd.starts_with("AT+SEND=")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_command_hex_encodes_payload() {
        let cmd = send_command(2, &[0x87, 0xD6, 0x12, 0x00]).expect("fits");
        assert_eq!(cmd.as_str(), "AT+SEND=2:87D61200\r\n");
        assert_eq!(
            send_command(2, &[0u8; SEND_PAYLOAD_MAX + 1]),
            Err(ModemError::PayloadTooLong)
        );
    }

    #[test]
    fn configuration_commands() {
        assert_eq!(join_command().as_str(), "AT+JOIN=1:0:10:8\r\n");
        assert_eq!(band_command(Region::Us915).as_str(), "AT+BAND=8\r\n");
        assert_eq!(mask_command(2).as_str(), "AT+MASK=0002\r\n");
        assert_eq!(confirm_command(true).as_str(), "AT+CFM=1\r\n");
    }

    #[test]
    fn status_lines() {
        assert_eq!(parse_line("OK\r"), ModemEvent::Ok);
        assert_eq!(parse_line("AT_BUSY_ERROR"), ModemEvent::Busy);
        assert_eq!(parse_line("AT_PARAM_ERROR"), ModemEvent::ParamError);
        assert_eq!(parse_line("+EVT:JOINED"), ModemEvent::Joined);
        assert_eq!(parse_line("+EVT:JOIN_FAILED_RX_TIMEOUT"), ModemEvent::JoinFailed);
        assert_eq!(parse_line("+EVT:TX_DONE"), ModemEvent::TxDone);
        assert_eq!(parse_line("+EVT:SEND_CONFIRMED_OK"), ModemEvent::Confirmed(true));
        assert_eq!(
            parse_line("+EVT:SEND_CONFIRMED_FAILED(4)"),
            ModemEvent::Confirmed(false)
        );
        assert_eq!(parse_line("AT+VER=4.0.5"), ModemEvent::Other);
    }

    #[test]
    fn rx_event_decodes_metadata_and_payload() {
        let evt = parse_line("+EVT:RX_1:-71:8:UNICAST:3:AA550000003c");
        assert_eq!(
            evt,
            ModemEvent::Rx(RxFrame::new(-71, 8, 3, &[0xAA, 0x55, 0x00, 0x00, 0x00, 0x3C]))
        );
        assert_eq!(parse_line("+EVT:RX_1:-71:8:UNICAST:3:ABC"), ModemEvent::Other);
        assert_eq!(parse_line("+EVT:RX_1:-71:x:UNICAST:3:AB"), ModemEvent::Other);
    }

    #[test]
    fn completion_depends_on_confirm_mode() {
        assert_eq!(ModemEvent::TxDone.tx_outcome(false), Some(TxOutcome::Sent));
        assert_eq!(ModemEvent::TxDone.tx_outcome(true), None);
        assert_eq!(
            ModemEvent::Confirmed(false).tx_outcome(true),
            Some(TxOutcome::Unconfirmed)
        );
        assert_eq!(ModemEvent::Ok.tx_outcome(false), None);
    }

    #[test]
    fn line_reader_splits_stream() {
        let mut r = LineReader::new();
        let events: Vec<ModemEvent> = b"\r\nOK\r\n+EVT:TX_DONE\r\n"
            .iter()
            .filter_map(|&b| r.push_byte(b))
            .collect();
        assert_eq!(events, vec![ModemEvent::Ok, ModemEvent::TxDone]);
    }

    #[test]
    fn busy_reply_after_console_command_still_fails_the_uplink() {
        let mut replies = ReplyTracker::new(false);
        let send = send_command(2, &[0x01, 0x02]).unwrap();
        replies.on_written(&send);
        replies.on_written("AT+VER=?\r\n");
        assert!(replies.uplink_in_flight());

        assert_eq!(
            replies.on_event(ModemEvent::Busy),
            ModemAction::Complete(TxOutcome::Failed)
        );
        assert!(!replies.uplink_in_flight());
        assert_eq!(replies.on_event(ModemEvent::Ok), ModemAction::Nothing);
    }

    #[test]
    fn console_reply_does_not_settle_a_later_uplink() {
        let mut replies = ReplyTracker::new(false);
        replies.on_written("AT+VER=?\r\n");
        replies.on_written(&send_command(2, &[0xAB]).unwrap());

        assert_eq!(replies.on_event(ModemEvent::Ok), ModemAction::Nothing);
        assert!(replies.uplink_in_flight());
        assert_eq!(
            replies.on_event(ModemEvent::ParamError),
            ModemAction::Complete(TxOutcome::Failed)
        );
    }

    #[test]
    fn accepted_uplink_completes_on_tx_done() {
        let mut replies = ReplyTracker::new(false);
        replies.on_written(&send_command(2, &[0xAB]).unwrap());
        assert_eq!(replies.on_event(ModemEvent::Ok), ModemAction::Nothing);
        replies.on_written("AT+VER=?\r\n");
        assert_eq!(replies.on_event(ModemEvent::Error), ModemAction::Nothing);
        assert_eq!(
            replies.on_event(ModemEvent::TxDone),
            ModemAction::Complete(TxOutcome::Sent)
        );
    }

    #[test]
    fn completion_without_reply_line_clears_the_uplink() {
        let mut replies = ReplyTracker::new(true);
        replies.on_written(&send_command(2, &[0xAB]).unwrap());
        assert_eq!(
            replies.on_event(ModemEvent::Confirmed(false)),
            ModemAction::Complete(TxOutcome::Unconfirmed)
        );
        assert!(!replies.uplink_in_flight());
        replies.on_written("AT+VER=?\r\n");
        assert_eq!(replies.on_event(ModemEvent::Busy), ModemAction::Nothing);
    }

    #[test]
    fn failed_write_of_uplink_fails_it() {
        let mut replies = ReplyTracker::new(false);
        let send = send_command(2, &[0xAB]).unwrap();
        assert_eq!(
            replies.on_write_failed(&send),
            ModemAction::Complete(TxOutcome::Failed)
        );
        assert_eq!(replies.on_write_failed("AT+VER=?\r\n"), ModemAction::Nothing);
    }

    #[test]
    fn unsolicited_events_pass_through() {
        let mut replies = ReplyTracker::new(false);
        assert_eq!(replies.on_event(ModemEvent::Joined), ModemAction::Join(true));
        assert_eq!(replies.on_event(ModemEvent::JoinFailed), ModemAction::Join(false));
        assert_eq!(replies.on_event(ModemEvent::Busy), ModemAction::Nothing);
    }
}
