use std::fmt;
use std::io;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use thiserror::Error;

use super::command::{Command, format_command};
use super::parser::{MeasureReply, ParseError, parse_done, parse_measure_reply};
use crate::frame::{ACK, ENQ, EOL, FrameError, Framed, escape, read_frame};
use crate::port::ByteChannel;

/// What the session was waiting for when a read came back short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Prompt,
    Ack { command: String },
    Line,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Prompt => write!(f, "prompt (ASCII ENQ)"),
            Phase::Ack { command } => {
                write!(f, "acknowledgement (ASCII ACK) for command \"{}\"", command)
            }
            Phase::Line => write!(f, "a complete line"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{}", timeout_message(.phase, .received))]
    Timeout { phase: Phase, received: Vec<u8> },
    #[error(
        "Got data before acknowledgement (ASCII ACK) for command \"{command}\": \"{}\"",
        escape(.received)
    )]
    ProtocolMismatch { command: String, received: Vec<u8> },
    #[error("Unexpected response to \"measure\" command: \"{text}\"")]
    UnexpectedResponse { text: String },
    #[error("Can't treat \"{text}\" as number of measured points")]
    MalformedCount { text: String },
    #[error("Measurement error: {message}")]
    DeviceError { message: String },
    #[error("serial i/o: {0}")]
    Io(#[from] io::Error),
}

fn timeout_message(phase: &Phase, received: &[u8]) -> String {
    if received.is_empty() {
        format!("Got timeout while expecting {}", phase)
    } else {
        format!(
            "Didn't get {} in the device response (\"{}\")",
            phase,
            escape(received)
        )
    }
}

impl SessionError {
    fn from_frame(err: FrameError, phase: Phase) -> Self {
        match err {
            FrameError::Timeout => SessionError::Timeout {
                phase,
                received: Vec::new(),
            },
            FrameError::Incomplete(received) => SessionError::Timeout { phase, received },
            FrameError::Io(e) => SessionError::Io(e),
        }
    }

    fn from_status(err: ParseError, line: &str) -> Self {
        match err {
            ParseError::Mismatch(_) => SessionError::UnexpectedResponse {
                text: line.to_string(),
            },
            ParseError::BadCount(text) => SessionError::MalformedCount { text },
        }
    }
}

/// Outcome of one `measure` round.
#[derive(Debug, Clone)]
pub struct MeasurementResult {
    /// Count from the `START:` line.
    pub announced_points: u64,
    /// Count from the `DONE:` line; this many data lines follow `data`.
    pub actual_points: u64,
    pub started_at: Instant,
    pub finished_at: Instant,
}

impl MeasurementResult {
    pub fn duration(&self) -> Duration {
        self.finished_at.duration_since(self.started_at)
    }
}

/// Overrides the channel read timeout until dropped.
struct TimeoutGuard<'a, C: ByteChannel> {
    channel: &'a mut C,
    saved: Duration,
}

impl<'a, C: ByteChannel> TimeoutGuard<'a, C> {
    fn new(channel: &'a mut C, timeout: Duration) -> Self {
        let saved = channel.read_timeout();
        channel.set_read_timeout(timeout);
        Self { channel, saved }
    }
}

impl<C: ByteChannel> Deref for TimeoutGuard<'_, C> {
    type Target = C;
    fn deref(&self) -> &C {
        self.channel
    }
}

impl<C: ByteChannel> DerefMut for TimeoutGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.channel
    }
}

impl<C: ByteChannel> Drop for TimeoutGuard<'_, C> {
    fn drop(&mut self) {
        self.channel.set_read_timeout(self.saved);
    }
}

/// Command console session with the scope over one channel.
pub struct Session<C: ByteChannel> {
    channel: C,
    acquire_timeout: Duration,
}

impl<C: ByteChannel> Session<C> {
    pub fn new(channel: C, acquire_timeout: Duration) -> Self {
        Self {
            channel,
            acquire_timeout,
        }
    }

    #[cfg(test)]
    pub fn channel(&self) -> &C {
        &self.channel
    }

    fn write(&mut self, cmd: &Command) -> Result<(), SessionError> {
        let bytes = format_command(cmd);
        debug!("write \"{}\"", escape(&bytes));
        self.channel.write_all(&bytes)?;
        Ok(())
    }

    /// Send a bare line end and wait for the prompt.
    pub fn sync_prompt(&mut self) -> Result<(), SessionError> {
        self.write(&Command::Empty)?;
        self.wait_prompt()
    }

    pub fn wait_prompt(&mut self) -> Result<(), SessionError> {
        let Framed { before, after } = read_frame(&mut self.channel, ENQ)
            .map_err(|e| SessionError::from_frame(e, Phase::Prompt))?;
        if !before.is_empty() {
            warn!(
                "Got data before prompt (ASCII ENQ): \"{}\". Ignoring...",
                escape(&before)
            );
        }
        if !after.is_empty() {
            warn!(
                "Got data after prompt (ASCII ENQ): \"{}\". Ignoring...",
                escape(&after)
            );
        }
        Ok(())
    }

    /// Write a command and consume its acknowledgement. Anything ahead of
    /// the ACK invalidates the exchange.
    pub fn send_command(&mut self, cmd: &Command) -> Result<(), SessionError> {
        let name = cmd.name();
        self.write(cmd)?;

        let Framed { before, after } = read_frame(&mut self.channel, ACK).map_err(|e| {
            SessionError::from_frame(
                e,
                Phase::Ack {
                    command: name.to_string(),
                },
            )
        })?;
        if !before.is_empty() {
            return Err(SessionError::ProtocolMismatch {
                command: name.to_string(),
                received: before,
            });
        }
        if !after.is_empty() {
            warn!(
                "Got data after acknowledgement (ASCII ACK) for command \"{}\": \"{}\". Ignoring...",
                name,
                escape(&after)
            );
        }
        Ok(())
    }

    /// Read one trimmed line. With `timeout` set, the channel's read timeout
    /// is replaced for this call only and restored on every path.
    pub fn read_line(&mut self, timeout: Option<Duration>) -> Result<String, SessionError> {
        match timeout {
            Some(t) => {
                let mut guard = TimeoutGuard::new(&mut self.channel, t);
                read_line_on(&mut *guard)
            }
            None => read_line_on(&mut self.channel),
        }
    }

    /// `id` exchange; returns the device identity string.
    pub fn identify(&mut self) -> Result<String, SessionError> {
        self.send_command(&Command::Id)?;
        self.read_line(None)
    }

    pub fn run_measurement(&mut self, points: u64) -> Result<MeasurementResult, SessionError> {
        self.wait_prompt()?;
        info!("Sending \"measure\" command...");
        self.send_command(&Command::Measure { points })?;

        let line = self.read_line(None)?;
        let announced_points = match parse_measure_reply(&line) {
            Ok(MeasureReply::Started(n)) => n,
            Ok(MeasureReply::Failed(message)) => {
                // Leave the console at a prompt if the device still offers one.
                match self.wait_prompt() {
                    Ok(()) | Err(SessionError::Timeout { .. }) => {}
                    Err(e) => debug!("no prompt after device error: {}", e),
                }
                return Err(SessionError::DeviceError { message });
            }
            Err(e) => return Err(SessionError::from_status(e, &line)),
        };
        let started_at = Instant::now();
        info!("Started measurement for {} point(s).", announced_points);

        let line = self.read_line(Some(self.acquire_timeout))?;
        let actual_points = parse_done(&line).map_err(|e| SessionError::from_status(e, &line))?;
        let finished_at = Instant::now();

        let result = MeasurementResult {
            announced_points,
            actual_points,
            started_at,
            finished_at,
        };
        info!(
            "Finished measurement. Got {} point(s) in {:?}.",
            result.actual_points,
            result.duration()
        );

        self.wait_prompt()?;
        Ok(result)
    }

    /// Request the data dump. The caller reads `actual_points` lines itself.
    pub fn fetch_data(&mut self) -> Result<(), SessionError> {
        self.send_command(&Command::Data)
    }
}

fn read_line_on<C: ByteChannel>(channel: &mut C) -> Result<String, SessionError> {
    let Framed { before, after } =
        read_frame(channel, EOL).map_err(|e| SessionError::from_frame(e, Phase::Line))?;
    if !after.is_empty() {
        warn!(
            "Got data after end of line: \"{}\". Ignoring...",
            escape(&after)
        );
    }
    Ok(String::from_utf8_lossy(&before).trim().to_string())
}
