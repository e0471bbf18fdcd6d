//! Protocol errors

use std::fmt;

use thiserror::Error;

use super::FirmwareVersion;

/// Which kind of slot an operation referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// A DC motor slot
    Motor,
    /// A servo slot
    Servo,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Motor => write!(f, "motor"),
            SlotKind::Servo => write!(f, "servo"),
        }
    }
}

/// Errors that can occur while talking to the robot
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("serial port error: {0}")]
    Serial(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not connected to the robot")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("session has been closed")]
    SessionClosed,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("no response from the device")]
    EmptyResponse,

    #[error("timed out waiting for the completion echo")]
    EchoTimeout,

    #[error("echo mismatch: sent {sent:?}, received {received:?}")]
    EchoMismatch {
        /// The command line that was written
        sent: String,
        /// What the device sent back
        received: String,
    },

    #[error("unexpected response length {actual} (expected {expected}): {response:?}")]
    ResponseLength {
        /// Field count the command family requires
        expected: usize,
        /// Field count actually received
        actual: usize,
        /// The literal offending response
        response: String,
    },

    #[error("unparseable field {field:?} in response {response:?}")]
    ResponseValue {
        /// The token that failed numeric conversion
        field: String,
        /// The literal offending response
        response: String,
    },

    #[error("invalid {kind} number {index}")]
    InvalidSlot { kind: SlotKind, index: usize },

    #[error("{kind} {index} has already been attached")]
    AlreadyAttached { kind: SlotKind, index: usize },

    #[error("{kind} {index} has not been attached")]
    NotAttached { kind: SlotKind, index: usize },

    #[error("pin {0} does not exist or is already attached to hardware")]
    PinUnavailable(u8),

    #[error("GPS is not attached")]
    GpsNotAttached,

    #[error("{what} {value} outside allowed range {min}..={max}")]
    OutOfRange {
        what: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },

    #[error("{what} must be positive (got {value})")]
    NotPositive { what: &'static str, value: i32 },

    #[error("{what} must not be negative (got {value})")]
    Negative { what: &'static str, value: i32 },

    #[error("no more than two motors may run at any given time")]
    TooManyMotors,

    #[error("firmware version {firmware} is incompatible with host version {host}")]
    VersionMismatch {
        /// Version reported by the device
        firmware: FirmwareVersion,
        /// Version this crate implements
        host: FirmwareVersion,
    },
}

impl ProtocolError {
    /// Whether a robot program can meaningfully continue past this error.
    ///
    /// A fatal error means the link itself is unusable: the port could not
    /// be opened or the firmware speaks an incompatible protocol major
    /// version. Whether to terminate the process on a fatal error is left
    /// to the embedding application.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::ConnectionFailed(_) | ProtocolError::VersionMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HOST_VERSION;

    #[test]
    fn fatal_subset() {
        assert!(ProtocolError::ConnectionFailed("port busy".into()).is_fatal());
        assert!(ProtocolError::VersionMismatch {
            firmware: FirmwareVersion {
                major: 3,
                minor: 0,
                subminor: 0
            },
            host: HOST_VERSION,
        }
        .is_fatal());

        assert!(!ProtocolError::EmptyResponse.is_fatal());
        assert!(!ProtocolError::NotConnected.is_fatal());
        assert!(!ProtocolError::PinUnavailable(7).is_fatal());
    }

    #[test]
    fn display_names_offending_response() {
        let err = ProtocolError::ResponseLength {
            expected: 3,
            actual: 2,
            response: "q 6".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("expected 3"));
        assert!(msg.contains("q 6"));
    }

    #[test]
    fn slot_kind_display() {
        assert_eq!(SlotKind::Motor.to_string(), "motor");
        assert_eq!(SlotKind::Servo.to_string(), "servo");
    }
}
