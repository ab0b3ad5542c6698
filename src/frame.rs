use thiserror::Error;

use crate::port::ByteChannel;

/// Device prompt, sent when it is ready for a command.
pub const ENQ: u8 = 0x05;
/// Command acknowledgement.
pub const ACK: u8 = 0x06;
/// Negative acknowledgement. The device defines it but never sends it.
#[allow(dead_code)]
pub const NAK: u8 = 0x15;
pub const EOL: u8 = b'\n';

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("nothing received")]
    Timeout,
    #[error("delimiter missing from {}", escape(.0))]
    Incomplete(Vec<u8>),
    #[error("serial i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// One delimiter located inside a read buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framed {
    /// Bytes that arrived ahead of the delimiter.
    pub before: Vec<u8>,
    /// Spillover read past the delimiter.
    pub after: Vec<u8>,
}

pub fn split_at_delimiter(data: &[u8], delim: u8) -> Result<Framed, FrameError> {
    if data.is_empty() {
        return Err(FrameError::Timeout);
    }
    let pos = data
        .iter()
        .position(|&b| b == delim)
        .ok_or_else(|| FrameError::Incomplete(data.to_vec()))?;
    Ok(Framed {
        before: data[..pos].to_vec(),
        after: data[pos + 1..].to_vec(),
    })
}

pub fn read_frame(channel: &mut dyn ByteChannel, delim: u8) -> Result<Framed, FrameError> {
    let data = channel.read_until(delim)?;
    log::debug!("read {:?} until {:#04x}: \"{}\"", channel.read_timeout(), delim, escape(&data));
    split_at_delimiter(&data, delim)
}

/// Printable rendering of raw device bytes for diagnostics.
pub fn escape(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::ScriptedChannel;

    #[test]
    fn splits_prefix_and_spillover() {
        let f = split_at_delimiter(b"junk\x05tail", ENQ).unwrap();
        assert_eq!(f.before, b"junk");
        assert_eq!(f.after, b"tail");
    }

    #[test]
    fn bare_delimiter() {
        let f = split_at_delimiter(&[ACK], ACK).unwrap();
        assert!(f.before.is_empty());
        assert!(f.after.is_empty());
    }

    #[test]
    fn first_delimiter_wins() {
        let f = split_at_delimiter(b"a\nb\n", EOL).unwrap();
        assert_eq!(f.before, b"a");
        assert_eq!(f.after, b"b\n");
    }

    #[test]
    fn empty_read_is_timeout() {
        assert!(matches!(split_at_delimiter(b"", EOL), Err(FrameError::Timeout)));
    }

    #[test]
    fn missing_delimiter_keeps_data() {
        match split_at_delimiter(b"START: 1", EOL) {
            Err(FrameError::Incomplete(d)) => assert_eq!(d, b"START: 1"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn read_frame_uses_channel() {
        let mut ch = ScriptedChannel::new().reply(b"\x06");
        let f = read_frame(&mut ch, ACK).unwrap();
        assert!(f.before.is_empty());
        assert!(matches!(read_frame(&mut ch, ACK), Err(FrameError::Timeout)));
    }

    #[test]
    fn escape_control_bytes() {
        assert_eq!(escape(b"ok\x05\n"), "ok\\x05\\n");
    }
}
