//! Request framing and retry policy
//!
//! A command is a short ASCII line; the device answers (or stays silent)
//! after a settle delay. [`send_command`] performs one such exchange: it
//! frames the line with the canonical terminator, writes it, sleeps the
//! settle time, and reads back whatever arrived. How silence and completion
//! are treated is chosen per call through [`SendOptions`] — there is no
//! ambient mode state, so an exchange can never observe flags left over
//! from a previous one.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::error::ProtocolError;
use super::transport::Transport;
use super::{
    DEFAULT_ECHO_DEADLINE_MS, DEFAULT_SETTLE_MS, LINE_TERMINATOR, READ_BUFFER_SIZE, SEND_ATTEMPTS,
};

/// How an exchange treats the device's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// One round trip; silence is an acceptable outcome and yields an
    /// empty response. Used when the firmware is not expected to answer.
    Single,
    /// Re-send while the device stays silent, up to the retry budget.
    /// An exhausted budget is a recoverable empty-response error.
    Retry,
    /// Keep reading until the accumulated reply equals the command line
    /// verbatim: the firmware echoes the command when a blocking move
    /// completes.
    EchoCompletion,
}

/// Per-exchange framing options.
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    /// Delay between writing the command and reading the reply
    pub settle: Duration,
    /// Reply policy for this exchange
    pub mode: ResponseMode,
    /// Upper bound on the completion-echo wait
    pub echo_deadline: Duration,
}

impl SendOptions {
    /// Options with the default settle time and echo deadline.
    pub fn new(mode: ResponseMode) -> Self {
        Self {
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            mode,
            echo_deadline: Duration::from_millis(DEFAULT_ECHO_DEADLINE_MS),
        }
    }

    /// Same, with a family-specific settle time.
    pub fn with_settle(mode: ResponseMode, settle: Duration) -> Self {
        Self {
            settle,
            ..Self::new(mode)
        }
    }
}

impl Default for SendOptions {
    fn default() -> Self {
        Self::new(ResponseMode::Single)
    }
}

/// Poll interval while waiting for a completion echo
const ECHO_POLL: Duration = Duration::from_millis(10);

/// Perform one command/response exchange.
///
/// Returns the trimmed reply text, which may be empty in
/// [`ResponseMode::Single`]. Stale input is discarded before the first
/// write so a late reply to an earlier command cannot be mistaken for this
/// one's.
pub fn send_command(
    transport: &mut dyn Transport,
    line: &str,
    opts: &SendOptions,
) -> Result<String, ProtocolError> {
    let framed = format!("{line}{LINE_TERMINATOR}");
    transport.clear_input()?;

    let mut attempts = SEND_ATTEMPTS;
    loop {
        transport.write_all(framed.as_bytes())?;
        thread::sleep(opts.settle);
        attempts -= 1;
        if opts.mode != ResponseMode::Retry || transport.available()? > 0 {
            break;
        }
        if attempts == 0 {
            warn!("no response to {line:?} after {SEND_ATTEMPTS} attempts");
            return Err(ProtocolError::EmptyResponse);
        }
        debug!("no response to {line:?} yet, trying {attempts} more times");
    }

    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut len = drain(transport, &mut buf, 0)?;
    let mut text = decode(&buf[..len]);

    if opts.mode == ResponseMode::EchoCompletion {
        let deadline = Instant::now() + opts.echo_deadline;
        while text != line {
            if Instant::now() >= deadline {
                warn!("gave up waiting for completion echo of {line:?} (last read {text:?})");
                return Err(ProtocolError::EchoTimeout);
            }
            thread::sleep(ECHO_POLL);
            len = drain(transport, &mut buf, len)?;
            text = decode(&buf[..len]);
        }
    }

    debug!("received {len} bytes: {text:?}");
    Ok(text)
}

/// Append everything currently readable to `buf`, starting at `len`.
fn drain(
    transport: &mut dyn Transport,
    buf: &mut [u8],
    mut len: usize,
) -> Result<usize, ProtocolError> {
    while len < buf.len() && transport.available()? > 0 {
        let n = transport.read(&mut buf[len..])?;
        if n == 0 {
            break;
        }
        len += n;
    }
    Ok(len)
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::transport::MockTransport;
    use pretty_assertions::assert_eq;

    fn quick(mode: ResponseMode) -> SendOptions {
        SendOptions {
            settle: Duration::from_millis(1),
            mode,
            echo_deadline: Duration::from_millis(50),
        }
    }

    #[test]
    fn single_mode_accepts_silence() {
        let mock = MockTransport::new();
        let mut t = mock.clone();
        let reply = send_command(&mut t, "v 0 90", &quick(ResponseMode::Single)).unwrap();
        assert_eq!(reply, "");
        assert_eq!(mock.writes(), vec!["v 0 90".to_string()]);
    }

    #[test]
    fn retry_mode_returns_reply() {
        let mock = MockTransport::new();
        mock.enqueue_reply("q 6 42\r\n");
        let mut t = mock.clone();
        let reply = send_command(&mut t, "q 6", &quick(ResponseMode::Retry)).unwrap();
        assert_eq!(reply, "q 6 42");
        assert_eq!(mock.writes().len(), 1);
    }

    #[test]
    fn retry_mode_exhausts_budget_on_silence() {
        let mock = MockTransport::new();
        let mut t = mock.clone();
        let err = send_command(&mut t, "r a", &quick(ResponseMode::Retry)).unwrap_err();
        assert!(matches!(err, ProtocolError::EmptyResponse));
        // the command is re-sent on every attempt
        assert_eq!(mock.writes().len(), SEND_ATTEMPTS as usize);
    }

    #[test]
    fn echo_completion_returns_when_echo_matches() {
        let mock = MockTransport::new();
        mock.set_echo(true);
        let mut t = mock.clone();
        let reply = send_command(&mut t, "e 0 200 100", &quick(ResponseMode::EchoCompletion));
        assert_eq!(reply.unwrap(), "e 0 200 100");
    }

    #[test]
    fn echo_completion_times_out_without_matching_echo() {
        let mock = MockTransport::new();
        mock.enqueue_reply("something else");
        let mut t = mock.clone();
        let err =
            send_command(&mut t, "e 0 200 100", &quick(ResponseMode::EchoCompletion)).unwrap_err();
        assert!(matches!(err, ProtocolError::EchoTimeout));
    }

    #[test]
    fn reply_is_trimmed() {
        let mock = MockTransport::new();
        mock.enqueue_reply("  n 2 3 1 \r\n");
        let mut t = mock.clone();
        let reply = send_command(&mut t, "n", &quick(ResponseMode::Retry)).unwrap();
        assert_eq!(reply, "n 2 3 1");
    }

    #[test]
    fn write_failure_surfaces_as_io_error() {
        let mock = MockTransport::new();
        mock.fail_writes(true);
        let mut t = mock.clone();
        let err = send_command(&mut t, "n", &quick(ResponseMode::Single)).unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
    }
}
