use anyhow::Result;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::time::{Duration, Instant};

use crate::cli::{SerialOpts, TimingOpts};

/// Bidirectional byte stream the protocol session runs over.
pub trait ByteChannel {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// Read through `delim` or until the read timeout elapses. Bytes after
    /// the delimiter stay queued for the next call; an empty buffer means
    /// nothing arrived in time.
    fn read_until(&mut self, delim: u8) -> io::Result<Vec<u8>>;
    fn read_timeout(&self) -> Duration;
    fn set_read_timeout(&mut self, timeout: Duration);
}

/// The part of a serial port the channel needs.
pub trait SerialLink: Read + Write {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        SerialPort::set_timeout(self.as_mut(), timeout)?;
        Ok(())
    }
}

pub struct SerialChannel<P: SerialLink = Box<dyn SerialPort>> {
    reader: BufReader<P>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl<P: SerialLink> SerialChannel<P> {
    pub fn new(port: P, timing: &TimingOpts) -> Self {
        Self {
            reader: BufReader::new(port),
            read_timeout: timing.read_timeout(),
            write_timeout: timing.write_timeout(),
        }
    }
}

impl<P: SerialLink> ByteChannel for SerialChannel<P> {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.reader.get_mut();
        port.set_timeout(self.write_timeout)?;
        port.write_all(bytes)?;
        port.flush()
    }

    fn read_until(&mut self, delim: u8) -> io::Result<Vec<u8>> {
        let deadline = Instant::now() + self.read_timeout;
        let mut data = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.reader.get_mut().set_timeout(remaining)?;
            let available = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                break;
            }
            match available.iter().position(|&b| b == delim) {
                Some(pos) => {
                    data.extend_from_slice(&available[..=pos]);
                    self.reader.consume(pos + 1);
                    break;
                }
                None => {
                    let n = available.len();
                    data.extend_from_slice(available);
                    self.reader.consume(n);
                }
            }
        }

        Ok(data)
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }
}

pub fn open_port(dev: &str, opts: &SerialOpts, timing: &TimingOpts) -> Result<SerialChannel> {
    let builder = serialport::new(dev, opts.baud)
        .timeout(timing.read_timeout())
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(if opts.rtscts {
            FlowControl::Hardware
        } else {
            FlowControl::None
        });

    let port = builder
        .open()
        .map_err(|e| anyhow::anyhow!("open {}: {}", dev, e))?;
    Ok(SerialChannel::new(port, timing))
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Serial line fake: each queued burst is handed out by `read` as the
    /// port would; an empty queue times out.
    struct FakeLink {
        bursts: VecDeque<Vec<u8>>,
        written: Vec<u8>,
        timeouts: Vec<Duration>,
    }

    impl FakeLink {
        fn new(bursts: &[&[u8]]) -> Self {
            Self {
                bursts: bursts.iter().map(|b| b.to_vec()).collect(),
                written: Vec::new(),
                timeouts: Vec::new(),
            }
        }
    }

    impl Read for FakeLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(mut burst) = self.bursts.pop_front() else {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
            };
            let n = burst.len().min(buf.len());
            buf[..n].copy_from_slice(&burst[..n]);
            if n < burst.len() {
                self.bursts.push_front(burst.split_off(n));
            }
            Ok(n)
        }
    }

    impl Write for FakeLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialLink for FakeLink {
        fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
            self.timeouts.push(timeout);
            Ok(())
        }
    }

    fn timing() -> TimingOpts {
        TimingOpts {
            timeout_ms: 1000,
            write_timeout_ms: 5000,
            acquire_timeout_ms: 60_000,
        }
    }

    #[test]
    fn ack_and_line_in_one_burst() {
        let mut ch = SerialChannel::new(FakeLink::new(&[b"\x06START: 3\n"]), &timing());
        assert_eq!(ch.read_until(0x06).unwrap(), b"\x06");
        assert_eq!(ch.read_until(b'\n').unwrap(), b"START: 3\n");
        assert!(ch.read_until(b'\n').unwrap().is_empty());
    }

    #[test]
    fn data_dump_in_one_burst() {
        let mut ch = SerialChannel::new(FakeLink::new(&[b"1,5\n2,0\n3,7\n"]), &timing());
        for want in [&b"1,5\n"[..], b"2,0\n", b"3,7\n"] {
            assert_eq!(ch.read_until(b'\n').unwrap(), want);
        }
    }

    #[test]
    fn line_split_across_bursts() {
        let mut ch = SerialChannel::new(FakeLink::new(&[b"DON", b"E: 4", b"\nnext"]), &timing());
        assert_eq!(ch.read_until(b'\n').unwrap(), b"DONE: 4\n");
        // no delimiter before the line goes quiet
        assert_eq!(ch.read_until(b'\n').unwrap(), b"next");
    }

    #[test]
    fn silent_line_returns_nothing() {
        let mut ch = SerialChannel::new(FakeLink::new(&[]), &timing());
        assert!(ch.read_until(0x05).unwrap().is_empty());
    }

    #[test]
    fn write_uses_write_timeout() {
        let mut ch = SerialChannel::new(FakeLink::new(&[]), &timing());
        ch.write_all(b"id\n").unwrap();
        let link = ch.reader.get_ref();
        assert_eq!(link.written, b"id\n");
        assert_eq!(link.timeouts, vec![Duration::from_secs(5)]);
    }
}
