//! Serial Protocol Communication
//!
//! Implements the line-oriented text protocol spoken by the robot firmware.
//!
//! Commands are short ASCII tokens terminated by CRLF; replies are
//! whitespace-delimited ASCII fields. There is no checksum and no framing
//! beyond the line terminator: field counts and exact command echoes are
//! the only integrity mechanism, and that contract is preserved here
//! because it is what the firmware expects.

pub mod commands;
mod error;
pub mod framing;
pub(crate) mod response;
pub mod serial;
pub mod transport;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use commands::Command;
pub use error::{ProtocolError, SlotKind};
pub use framing::{send_command, ResponseMode, SendOptions};
pub use serial::{clear_buffers, configure_port, list_ports, open_port, PortInfo};

/// Default baud rate for the robot firmware
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default settle time in milliseconds: how long to wait after writing a
/// command before attempting to read the reply
pub const DEFAULT_SETTLE_MS: u64 = 100;

/// Total number of send attempts for commands that expect a reply
pub const SEND_ATTEMPTS: u32 = 4;

/// Fixed read buffer size; no reply is longer than this
pub const READ_BUFFER_SIZE: usize = 1024;

/// Canonical line terminator appended to every command
pub const LINE_TERMINATOR: &str = "\r\n";

/// Default deadline for a completion echo on encoded motor moves.
/// The firmware bounds timed runs at 30 seconds; a stalled encoder should
/// not block the host forever.
pub const DEFAULT_ECHO_DEADLINE_MS: u64 = 60_000;

/// Protocol major version implemented by this crate
pub const VERSION_MAJOR: u32 = 2;
/// Protocol minor version implemented by this crate
pub const VERSION_MINOR: u32 = 3;
/// Protocol subminor version implemented by this crate
pub const VERSION_SUBMINOR: u32 = 1;

/// Firmware/host protocol version triple as reported by the `n` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    /// Major version; a mismatch in either direction is incompatible
    pub major: u32,
    /// Minor version; a mismatch is a warning only
    pub minor: u32,
    /// Subminor version; informational
    pub subminor: u32,
}

/// Protocol version implemented by this crate
pub const HOST_VERSION: FirmwareVersion = FirmwareVersion {
    major: VERSION_MAJOR,
    minor: VERSION_MINOR,
    subminor: VERSION_SUBMINOR,
};

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.subminor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_display() {
        assert_eq!(HOST_VERSION.to_string(), "2.3.1");
    }
}
