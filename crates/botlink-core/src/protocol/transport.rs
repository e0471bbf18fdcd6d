//! Byte-stream transport abstraction
//!
//! The protocol engine only needs duplex byte-stream semantics: write a
//! line, ask how many bytes are waiting, read them. Abstracting that behind
//! a trait keeps the engine independent of the physical link and lets the
//! whole command/response path run against a scripted in-memory transport.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use serialport::SerialPort;

/// Duplex byte stream the protocol engine drives.
///
/// Implementations are not required to be thread-safe; the engine issues
/// strictly sequential half-duplex exchanges.
pub trait Transport: Send {
    /// Write all bytes to the device.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Number of bytes currently available to read without blocking.
    fn available(&mut self) -> io::Result<usize>;

    /// Read into `buf`, returning the number of bytes read (0 if none).
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Discard any unread input.
    fn clear_input(&mut self) -> io::Result<()>;

    /// Name of the underlying link, for diagnostics.
    fn name(&self) -> &str;
}

/// `Transport` backed by a real serial port.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialTransport {
    /// Wrap an already-opened serial port.
    pub fn new(port: Box<dyn SerialPort>, name: impl Into<String>) -> Self {
        Self {
            port,
            name: name.into(),
        }
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn available(&mut self) -> io::Result<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::other)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            // The framing layer polls availability; a timed-out read just
            // means no data yet
            Err(e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Debug, Default)]
struct MockState {
    /// Bytes waiting to be read
    read_buf: VecDeque<u8>,
    /// Scripted replies, delivered one per write
    replies: VecDeque<Vec<u8>>,
    /// Decoded, trimmed lines written so far
    writes: Vec<String>,
    /// Echo every write back as the reply
    echo: bool,
    /// Fail the next writes with a broken-pipe error
    fail_writes: bool,
}

/// Scriptable in-memory transport for exercising the protocol engine
/// without hardware.
///
/// Replies are queued with [`enqueue_reply`](MockTransport::enqueue_reply)
/// and become readable when the next command is written, mirroring a device
/// that answers each request. Echo mode instead reflects every written line
/// back, which is how the firmware acknowledges attach and encoded-motor
/// commands. Clones share state, so a test can keep a handle while the
/// session owns the transport.
///
/// # Example
/// ```
/// use botlink_core::protocol::transport::{MockTransport, Transport};
///
/// let mock = MockTransport::new();
/// mock.enqueue_reply("n 2 3 1");
///
/// let mut session_side = mock.clone();
/// session_side.write_all(b"n\r\n").unwrap();
///
/// let mut buf = [0u8; 16];
/// let n = session_side.read(&mut buf).unwrap();
/// assert_eq!(&buf[..n], b"n 2 3 1");
/// assert_eq!(mock.writes(), vec!["n".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct MockTransport {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self {
            name: "MOCK0".to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Queue a reply to be delivered when the next command is written.
    pub fn enqueue_reply(&self, reply: &str) {
        let mut state = self.state.lock().unwrap();
        state.replies.push_back(reply.as_bytes().to_vec());
    }

    /// Reflect every written line back as its own reply.
    pub fn set_echo(&self, on: bool) {
        self.state.lock().unwrap().echo = on;
    }

    /// Make subsequent writes fail with a broken-pipe error.
    pub fn fail_writes(&self, on: bool) {
        self.state.lock().unwrap().fail_writes = on;
    }

    /// Decoded, trimmed command lines written so far.
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        let line = String::from_utf8_lossy(data).trim().to_string();
        state.writes.push(line);
        if state.echo {
            state.read_buf.extend(data.iter().copied());
        } else if let Some(reply) = state.replies.pop_front() {
            state.read_buf.extend(reply);
        }
        Ok(())
    }

    fn available(&mut self) -> io::Result<usize> {
        Ok(self.state.lock().unwrap().read_buf.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        let mut n = 0;
        for slot in buf.iter_mut() {
            match state.read_buf.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.state.lock().unwrap().read_buf.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reply_delivered_on_write() {
        let mock = MockTransport::new();
        mock.enqueue_reply("a 1 2 3");

        let mut t = mock.clone();
        assert_eq!(t.available().unwrap(), 0);
        t.write_all(b"r a\r\n").unwrap();
        assert_eq!(t.available().unwrap(), 7);

        let mut buf = [0u8; 32];
        let n = t.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"a 1 2 3");
    }

    #[test]
    fn echo_mode_reflects_writes() {
        let mock = MockTransport::new();
        mock.set_echo(true);

        let mut t = mock.clone();
        t.write_all(b"a m 0 5\r\n").unwrap();

        let mut buf = [0u8; 32];
        let n = t.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"a m 0 5\r\n");
    }

    #[test]
    fn write_log_records_trimmed_lines() {
        let mut t = MockTransport::new();
        t.write_all(b"v 0 90\r\n").unwrap();
        t.write_all(b"d 0 0 0\r\n").unwrap();
        assert_eq!(t.writes(), vec!["v 0 90".to_string(), "d 0 0 0".to_string()]);
    }

    #[test]
    fn clear_input_discards_pending_bytes() {
        let mock = MockTransport::new();
        mock.enqueue_reply("stale");
        let mut t = mock.clone();
        t.write_all(b"x\r\n").unwrap();
        t.clear_input().unwrap();
        assert_eq!(t.available().unwrap(), 0);
    }

    #[test]
    fn clear_input_keeps_queued_replies() {
        let mock = MockTransport::new();
        mock.enqueue_reply("n 2 3 1");
        let mut t = mock.clone();
        t.clear_input().unwrap();
        t.write_all(b"n\r\n").unwrap();
        assert!(t.available().unwrap() > 0);
    }

    #[test]
    fn injected_write_failure() {
        let mock = MockTransport::new();
        mock.fail_writes(true);
        let mut t = mock.clone();
        let err = t.write_all(b"n\r\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn partial_read() {
        let mock = MockTransport::new();
        mock.enqueue_reply("abcdefgh");
        let mut t = mock.clone();
        t.write_all(b"x\r\n").unwrap();

        let mut buf = [0u8; 5];
        assert_eq!(t.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"abcde");
        assert_eq!(t.available().unwrap(), 3);
    }
}
