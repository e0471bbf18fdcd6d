//! # botlink Core Library
//!
//! Host-side driver for Arduino-based teaching robots.
//!
//! The robot firmware speaks a compact line-oriented text protocol over a
//! serial link. This crate implements the host half of that protocol:
//! connection bring-up and firmware version negotiation, request framing
//! with a bounded retry policy, response parsing and validation, and the
//! bookkeeping that enforces hardware constraints (pin ownership,
//! attachment state, the two-concurrent-motor limit) before a command is
//! allowed to reach the wire.
//!
//! ## Example
//!
//! ```rust,ignore
//! use botlink_core::robot::{Robot, RobotConfig, MOTOR1};
//!
//! let mut robot = Robot::new(RobotConfig {
//!     port_name: "/dev/ttyACM0".to_string(),
//!     ..RobotConfig::default()
//! });
//! robot.connect()?;
//! robot.attach_motor(MOTOR1, 5)?;
//! robot.run_motor(MOTOR1, 500, 3000)?; // full speed for 3 seconds
//! robot.close();
//! ```
//!
//! A `Robot` is not internally synchronized: the protocol is strictly
//! half-duplex request-reply, so callers running multiple threads must
//! serialize access to the session themselves.

#![warn(missing_docs)]

pub mod board;
mod pins;
pub mod protocol;
pub mod robot;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::board::BoardConfig;
    pub use crate::protocol::transport::{MockTransport, SerialTransport, Transport};
    pub use crate::protocol::{FirmwareVersion, ProtocolError};
    pub use crate::robot::{
        ConnectionState, Robot, RobotConfig, MOTOR1, MOTOR2, MOTOR3, MOTOR4, SERVO1, SERVO2,
        SERVO3,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
