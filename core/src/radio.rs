#![deny(unsafe_code)]
#![deny(warnings)]
//! REYAX RYLR998 LoRa module over a UART
//!
//! The module speaks a line-oriented AT protocol at the configured baud
//! rate. Every command is answered with `+OK` or `+ERR=<code>`; unsolicited
//! `+RCV=<addr>,<len>,<data>,<rssi>,<snr>` lines may arrive in between and
//! only feed the RSSI diagnostic.
//!
//! ```text
//! AT+ADDRESS=3
//! AT+NETWORKID=18
//! AT+BAND=915000000
//! AT+CRFOP=22
//! AT+PARAMETER=8,7,1,12
//! AT+SEND=1,48,{"distance":123,"battery":3.41,"isPresent":true}
//! ```

use core::fmt::{self, Write as _};

use embassy_futures::select::{select, Either};
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{Read, Write};
use hal_abstractions::{LinkParams, RadioTransport};
use heapless::{String, Vec};

/// Largest payload `AT+SEND` accepts
pub const MAX_PAYLOAD: usize = 240;

/// How long to wait for `+OK` after a configuration command
pub const RESPONSE_TIMEOUT_MS: u32 = 1000;

/// How long to wait for `+OK` after `AT+SEND`
pub const SEND_TIMEOUT_MS: u32 = 5000;

// "+RCV=65535,240,<240 bytes>,-120,-20"
const RX_LINE_CAPACITY: usize = 280;
const COMMAND_CAPACITY: usize = 48;

/// RYLR998 driver errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// UART read or write failed
    Io,
    /// No `+OK` within the timeout
    Timeout,
    /// Module answered `+ERR=<code>`
    Module(u8),
    /// Payload longer than [`MAX_PAYLOAD`]
    PayloadTooLarge(usize),
    /// Command did not fit the command buffer
    Format,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "UART error"),
            Self::Timeout => write!(f, "Radio response timeout"),
            Self::Module(code) => write!(f, "Radio module error {}", code),
            Self::PayloadTooLarge(len) => {
                write!(f, "Payload of {} bytes exceeds {}", len, MAX_PAYLOAD)
            }
            Self::Format => write!(f, "Command too long"),
        }
    }
}

impl core::error::Error for RadioError {}

enum Reply {
    Ok,
    Err(u8),
    Received(Option<i16>),
    Other,
}

fn classify(line: &[u8]) -> Reply {
    if line == b"+OK" {
        Reply::Ok
    } else if let Some(code) = line.strip_prefix(b"+ERR=") {
        let code = core::str::from_utf8(code)
            .ok()
            .and_then(|c| c.trim().parse().ok())
            .unwrap_or(u8::MAX);
        Reply::Err(code)
    } else if line.starts_with(b"+RCV=") {
        Reply::Received(parse_rcv_rssi(line))
    } else {
        Reply::Other
    }
}

/// RSSI field of a `+RCV=` line
///
/// The data field may contain commas, so the trailing fields are taken
/// from the end.
fn parse_rcv_rssi(line: &[u8]) -> Option<i16> {
    let body = line.strip_prefix(b"+RCV=")?;
    let mut fields = body.rsplitn(3, |b| *b == b',');
    let _snr = fields.next()?;
    let rssi = fields.next()?;
    fields.next()?;
    core::str::from_utf8(rssi).ok()?.trim().parse().ok()
}

async fn read_line<U: Read>(
    uart: &mut U,
    line: &mut Vec<u8, RX_LINE_CAPACITY>,
) -> Result<(), RadioError> {
    line.clear();
    let mut overflowed = false;
    let mut byte = [0u8; 1];
    loop {
        let n = uart.read(&mut byte).await.map_err(|_| RadioError::Io)?;
        if n == 0 {
            return Err(RadioError::Io);
        }
        match byte[0] {
            b'\n' if overflowed => {
                line.clear();
                overflowed = false;
            }
            b'\n' => {
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(());
            }
            b => {
                if line.push(b).is_err() {
                    overflowed = true;
                }
            }
        }
    }
}

async fn wait_for_ok<U: Read>(
    uart: &mut U,
    line: &mut Vec<u8, RX_LINE_CAPACITY>,
    last_rssi: &mut Option<i16>,
) -> Result<(), RadioError> {
    loop {
        read_line(uart, line).await?;
        match classify(line) {
            Reply::Ok => return Ok(()),
            Reply::Err(code) => return Err(RadioError::Module(code)),
            Reply::Received(Some(rssi)) => *last_rssi = Some(rssi),
            Reply::Received(None) | Reply::Other => {}
        }
    }
}

/// RYLR998 transport
pub struct Rylr998<U, D> {
    uart: U,
    delay: D,
    line: Vec<u8, RX_LINE_CAPACITY>,
    last_rssi: Option<i16>,
}

impl<U, D> Rylr998<U, D>
where
    U: Read + Write,
    D: DelayNs,
{
    pub fn new(uart: U, delay: D) -> Self {
        Self {
            uart,
            delay,
            line: Vec::new(),
            last_rssi: None,
        }
    }

    /// Give back the UART and delay
    pub fn release(self) -> (U, D) {
        (self.uart, self.delay)
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), RadioError> {
        self.uart.write_all(bytes).await.map_err(|_| RadioError::Io)
    }

    async fn await_ok(&mut self, timeout_ms: u32) -> Result<(), RadioError> {
        let Self {
            uart,
            delay,
            line,
            last_rssi,
        } = self;
        match select(wait_for_ok(uart, line, last_rssi), delay.delay_ms(timeout_ms)).await {
            Either::First(result) => result,
            Either::Second(()) => Err(RadioError::Timeout),
        }
    }

    /// Send one AT command and wait for `+OK`
    async fn command(&mut self, args: fmt::Arguments<'_>) -> Result<(), RadioError> {
        let mut cmd: String<COMMAND_CAPACITY> = String::new();
        cmd.write_fmt(args).map_err(|_| RadioError::Format)?;
        debug!("LoRa > {}", cmd.as_str());

        self.write_all(cmd.as_bytes()).await?;
        self.write_all(b"\r\n").await?;
        self.uart.flush().await.map_err(|_| RadioError::Io)?;
        self.await_ok(RESPONSE_TIMEOUT_MS).await.inspect_err(|e| {
            warn!("LoRa command {} failed: {:?}", cmd.as_str(), e);
        })
    }
}

impl<U, D> RadioTransport for Rylr998<U, D>
where
    U: Read + Write,
    D: DelayNs,
{
    type Error = RadioError;

    async fn configure(&mut self, params: &LinkParams) -> Result<(), RadioError> {
        self.command(format_args!("AT+ADDRESS={}", params.address))
            .await?;
        self.command(format_args!("AT+NETWORKID={}", params.network_id))
            .await?;
        self.command(format_args!("AT+BAND={}", params.band_hz))
            .await?;
        self.command(format_args!("AT+CRFOP={}", params.power_dbm))
            .await?;
        self.command(format_args!(
            "AT+PARAMETER={},{},{},{}",
            params.spreading_factor, params.bandwidth, params.coding_rate, params.preamble
        ))
        .await?;
        info!(
            "LoRa configured: address {} network {} band {} Hz",
            params.address, params.network_id, params.band_hz
        );
        Ok(())
    }

    async fn send(&mut self, target: u16, payload: &[u8]) -> Result<(), RadioError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(RadioError::PayloadTooLarge(payload.len()));
        }

        let mut header: String<COMMAND_CAPACITY> = String::new();
        write!(header, "AT+SEND={},{},", target, payload.len()).map_err(|_| RadioError::Format)?;

        self.write_all(header.as_bytes()).await?;
        self.write_all(payload).await?;
        self.write_all(b"\r\n").await?;
        self.uart.flush().await.map_err(|_| RadioError::Io)?;
        self.await_ok(SEND_TIMEOUT_MS).await
    }

    fn last_rssi(&self) -> Option<i16> {
        self.last_rssi
    }
}
