//! pigpio daemon backend
//!
//! Talks to `pigpiod` over its TCP socket interface. Every request is a
//! 16-byte header of four little-endian words `(cmd, p1, p2, p3)`, followed
//! by `p3` extension bytes for commands that carry data. The daemon answers
//! with 16 bytes echoing the header, the last word replaced by a signed
//! result; negative results are pigpio error codes.
//!
//! Waveforms are built by appending pulses to the daemon's pending waveform
//! (`WVAG`) and turning it into a stored wave (`WVCRE`). Chains (`WVCHA`)
//! address waves by single-byte ids.

use std::time::Duration;

use ir_wave::{PulseBurst, SegmentHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::device::PulseDevice;
use crate::error::{ConnectionError, TransmitError, TxError};

/// Default daemon port
pub const DEFAULT_PIGPIO_PORT: u16 = 8888;

/// Set GPIO mode
pub const CMD_MODES: u32 = 0;
/// Append generic pulses to the pending waveform
pub const CMD_WVAG: u32 = 28;
/// Query transmit busy
pub const CMD_WVBSY: u32 = 32;
/// Halt waveform transmission
pub const CMD_WVHLT: u32 = 33;
/// Create a wave from the pending waveform
pub const CMD_WVCRE: u32 = 49;
/// Delete a wave
pub const CMD_WVDEL: u32 = 50;
/// Start a new (empty) pending waveform
pub const CMD_WVNEW: u32 = 53;
/// Transmit a chain of waves
pub const CMD_WVCHA: u32 = 93;

/// GPIO output mode for `MODES`
pub const MODE_OUTPUT: u32 = 1;

/// Too many pulses in the pending waveform
pub const PI_TOO_MANY_PULSES: i32 = -36;
/// No more control blocks for waveforms
pub const PI_TOO_MANY_CBS: i32 = -67;
/// No more OOL slots for waveforms
pub const PI_TOO_MANY_OOL: i32 = -68;
/// Wave table full
pub const PI_NO_WAVEFORM_ID: i32 = -70;

/// Wave ids a chain can address (255 escapes chain commands)
pub const MAX_CHAIN_WAVE_ID: u32 = 249;

const HEADER_LEN: usize = 16;
const PULSE_LEN: usize = 12;

/// Build a request frame
pub fn encode_request(cmd: u32, p1: u32, p2: u32, ext: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + ext.len());
    for word in [cmd, p1, p2, ext.len() as u32] {
        frame.extend_from_slice(&word.to_le_bytes());
    }
    frame.extend_from_slice(ext);
    frame
}

/// Extract the signed result from a reply frame
pub fn decode_result(reply: &[u8; HEADER_LEN]) -> i32 {
    i32::from_le_bytes([reply[12], reply[13], reply[14], reply[15]])
}

/// Pack pulses as `WVAG` extension data
///
/// An empty list becomes one zero-length pulse; the daemon refuses to
/// create a wave with no pulses at all.
pub fn encode_pulses(pulses: &[PulseBurst]) -> Vec<u8> {
    let padding = [PulseBurst::silence(0)];
    let pulses = if pulses.is_empty() { &padding[..] } else { pulses };

    let mut ext = Vec::with_capacity(pulses.len() * PULSE_LEN);
    for p in pulses {
        ext.extend_from_slice(&p.on_mask.to_le_bytes());
        ext.extend_from_slice(&p.off_mask.to_le_bytes());
        ext.extend_from_slice(&p.duration_us.to_le_bytes());
    }
    ext
}

/// Pack segment handles as `WVCHA` extension data
pub fn encode_chain(handles: &[SegmentHandle]) -> Result<Vec<u8>, TxError> {
    handles
        .iter()
        .map(|h| {
            if h.0 <= MAX_CHAIN_WAVE_ID {
                Ok(h.0 as u8)
            } else {
                Err(TxError::from(TransmitError::Fault {
                    command: "WVCHA",
                    code: h.0 as i32,
                }))
            }
        })
        .collect()
}

/// Map a negative wave-building result to an error
fn wave_error(command: &'static str, code: i32) -> TxError {
    match code {
        PI_TOO_MANY_PULSES | PI_TOO_MANY_CBS | PI_TOO_MANY_OOL | PI_NO_WAVEFORM_ID => {
            TxError::Capacity { command, code }
        }
        _ => TransmitError::Fault { command, code }.into(),
    }
}

/// Pulse generator reached through a pigpio daemon
pub struct PigpioDevice {
    endpoint: String,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl PigpioDevice {
    /// Device at `host:port`
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            endpoint: format!("{}:{}", host, port),
            connect_timeout: Duration::from_secs(3),
            stream: None,
        }
    }

    /// Override the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Daemon address
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one command and return the raw result
    async fn command(&mut self, cmd: u32, p1: u32, p2: u32, ext: &[u8]) -> Result<i32, TxError> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotOpen)?;

        stream.write_all(&encode_request(cmd, p1, p2, ext)).await?;

        let mut reply = [0u8; HEADER_LEN];
        stream.read_exact(&mut reply).await?;

        let result = decode_result(&reply);
        debug!("pigpio cmd {} -> {}", cmd, result);
        Ok(result)
    }

    /// Append pulses to the pending waveform and store it as a wave
    async fn create_wave(&mut self, pulses: &[PulseBurst]) -> Result<SegmentHandle, TxError> {
        let added = self.command(CMD_WVAG, 0, 0, &encode_pulses(pulses)).await?;
        if added < 0 {
            return Err(wave_error("WVAG", added));
        }

        let id = self.command(CMD_WVCRE, 0, 0, &[]).await?;
        if id < 0 {
            return Err(wave_error("WVCRE", id));
        }
        Ok(SegmentHandle(id as u32))
    }
}

impl PulseDevice for PigpioDevice {
    fn describe(&self) -> String {
        format!("pigpio@{}", self.endpoint)
    }

    async fn connect(&mut self) -> Result<(), TxError> {
        let unreachable_at = |reason: String| ConnectionError::Unreachable {
            endpoint: self.endpoint.clone(),
            reason,
        };

        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.endpoint)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(unreachable_at(e.to_string()).into()),
            Err(_) => return Err(unreachable_at("connect timed out".to_string()).into()),
        };
        stream.set_nodelay(true)?;
        self.stream = Some(stream);

        // Discard pulses a previous client may have left pending
        let res = self.command(CMD_WVNEW, 0, 0, &[]).await?;
        if res < 0 {
            self.stream = None;
            return Err(ConnectionError::Busy(format!("{} (code {})", self.endpoint, res)).into());
        }

        info!("Connected to pigpio daemon at {}", self.endpoint);
        Ok(())
    }

    async fn set_output(&mut self, gpio: u32) -> Result<(), TxError> {
        let res = self.command(CMD_MODES, gpio, MODE_OUTPUT, &[]).await?;
        if res < 0 {
            return Err(ConnectionError::Rejected { gpio, code: res }.into());
        }
        Ok(())
    }

    async fn add_waveform(&mut self, pulses: &[PulseBurst]) -> Result<SegmentHandle, TxError> {
        self.create_wave(pulses).await
    }

    async fn add_silence(&mut self, duration_us: u32) -> Result<SegmentHandle, TxError> {
        self.create_wave(&[PulseBurst::silence(duration_us)]).await
    }

    async fn submit_chain(&mut self, handles: &[SegmentHandle]) -> Result<(), TxError> {
        let ext = encode_chain(handles)?;
        let res = self.command(CMD_WVCHA, 0, 0, &ext).await?;
        if res < 0 {
            return Err(TransmitError::Fault { command: "WVCHA", code: res }.into());
        }
        Ok(())
    }

    async fn is_busy(&mut self) -> Result<bool, TxError> {
        let res = self.command(CMD_WVBSY, 0, 0, &[]).await?;
        if res < 0 {
            return Err(TransmitError::Fault { command: "WVBSY", code: res }.into());
        }
        Ok(res == 1)
    }

    async fn halt(&mut self) -> Result<(), TxError> {
        let res = self.command(CMD_WVHLT, 0, 0, &[]).await?;
        if res < 0 {
            return Err(TransmitError::Fault { command: "WVHLT", code: res }.into());
        }
        Ok(())
    }

    async fn delete(&mut self, handle: SegmentHandle) -> Result<(), TxError> {
        let res = self.command(CMD_WVDEL, handle.0, 0, &[]).await?;
        if res < 0 {
            return Err(TransmitError::Fault { command: "WVDEL", code: res }.into());
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!("Disconnected from {}", self.endpoint);
        }
    }
}
