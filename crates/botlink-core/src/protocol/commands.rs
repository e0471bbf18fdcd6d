//! Protocol commands
//!
//! Defines the commands understood by the robot firmware, their exact wire
//! encoding, and the per-family settle/reply policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::framing::{ResponseMode, SendOptions};
use super::DEFAULT_SETTLE_MS;

/// Commands understood by the robot firmware.
///
/// `encode` produces the exact line the firmware parses; the firmware is
/// case-sensitive, so `d` (timed motor run) and `D` (timed dual-motor run)
/// are distinct commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Query the firmware version triple (`n`)
    FirmwareVersion,

    /// Bind a DC motor slot to a digital pin (`a m`)
    AttachMotor {
        /// Motor slot
        motor: usize,
        /// Digital pin the motor is wired to
        pin: u8,
    },

    /// Bind a servo slot to a digital pin (`a s`)
    AttachServo {
        /// Servo slot
        servo: usize,
        /// Digital pin the servo is wired to
        pin: u8,
    },

    /// Enable the GPS module on its two fixed pins (`a g`)
    AttachGps,

    /// Bulk-read every free analog pin (`r a`)
    ReadAnalogPins,

    /// Bulk-read every free digital pin (`r d`)
    ReadDigitalPins,

    /// Read the legacy temperature sensor (`r t`)
    ReadTemperature,

    /// Read the ping sensor on a digital pin (`q`)
    Ping {
        /// Digital pin the ping sensor is wired to
        pin: u8,
    },

    /// Read the conductivity probe (`c`)
    ReadConductivity,

    /// Read the legacy compass (`c`, short settle)
    ReadCompass,

    /// Read the legacy gyroscope (`g`)
    ReadGyroscope,

    /// Read the GPS module (`g`, long settle)
    ReadGps,

    /// Move one servo to an angular position (`v`); no reply awaited
    MoveServo {
        /// Servo slot
        servo: usize,
        /// Target angle in degrees
        position: i32,
    },

    /// Move all three servos at once (`V`); no reply awaited
    MoveAllServos {
        /// Target angles for servos 1 through 3
        positions: [i32; 3],
    },

    /// Run one DC motor at a speed for a time in milliseconds (`d`)
    RunMotor {
        /// Motor slot
        motor: usize,
        /// Signed speed
        speed: i32,
        /// Duration in milliseconds; 0 runs until the next command
        time: i32,
    },

    /// Run two DC motors for the same time (`D`)
    RunTwoMotors {
        /// (slot, speed) for each motor
        motors: [(usize, i32); 2],
        /// Duration in milliseconds
        time: i32,
    },

    /// Run four DC motors for the same time (`F`)
    RunFourMotors {
        /// (slot, speed) for each motor
        motors: [(usize, i32); 4],
        /// Duration in milliseconds
        time: i32,
    },

    /// Move one encoded motor a number of ticks; the firmware echoes the
    /// command when the move completes (`e`)
    RunEncodedMotor {
        /// Motor slot
        motor: usize,
        /// Signed speed
        speed: i32,
        /// Encoder ticks to travel
        ticks: i32,
    },

    /// Move two encoded motors, each its own tick count (`E`)
    RunTwoEncodedMotors {
        /// (slot, speed, ticks) for each motor
        motors: [(usize, i32, i32); 2],
    },

    /// Read an encoder's net tick count (`p`)
    EncoderPosition {
        /// Motor slot
        motor: usize,
    },

    /// Reset an encoder's tick count to zero (`z`)
    ResetEncoder {
        /// Motor slot
        motor: usize,
    },

    /// Set the ramp-up time applied to all motors (`m`)
    SetRampUpTime {
        /// Ramp-up time in milliseconds
        millis: i32,
    },
}

impl Command {
    /// The exact wire line for this command, without the terminator.
    pub fn encode(&self) -> String {
        match self {
            Command::FirmwareVersion => "n".to_string(),
            Command::AttachMotor { motor, pin } => format!("a m {motor} {pin}"),
            Command::AttachServo { servo, pin } => format!("a s {servo} {pin}"),
            Command::AttachGps => "a g".to_string(),
            Command::ReadAnalogPins => "r a".to_string(),
            Command::ReadDigitalPins => "r d".to_string(),
            Command::ReadTemperature => "r t".to_string(),
            Command::Ping { pin } => format!("q {pin}"),
            Command::ReadConductivity | Command::ReadCompass => "c".to_string(),
            Command::ReadGyroscope | Command::ReadGps => "g".to_string(),
            Command::MoveServo { servo, position } => format!("v {servo} {position}"),
            Command::MoveAllServos { positions: [a, b, c] } => format!("V {a} {b} {c}"),
            Command::RunMotor { motor, speed, time } => format!("d {motor} {speed} {time}"),
            Command::RunTwoMotors {
                motors: [(m1, s1), (m2, s2)],
                time,
            } => format!("D {m1} {s1} {m2} {s2} {time}"),
            Command::RunFourMotors {
                motors: [(m1, s1), (m2, s2), (m3, s3), (m4, s4)],
                time,
            } => format!("F {m1} {s1} {m2} {s2} {m3} {s3} {m4} {s4} {time}"),
            Command::RunEncodedMotor {
                motor,
                speed,
                ticks,
            } => format!("e {motor} {speed} {ticks}"),
            Command::RunTwoEncodedMotors {
                motors: [(m1, s1, t1), (m2, s2, t2)],
            } => format!("E {m1} {s1} {t1} {m2} {s2} {t2}"),
            Command::EncoderPosition { motor } => format!("p {motor}"),
            Command::ResetEncoder { motor } => format!("z {motor}"),
            Command::SetRampUpTime { millis } => format!("m {millis}"),
        }
    }

    /// Settle time for this command family.
    ///
    /// Attach operations and the GPS give the firmware longer to answer;
    /// the conductivity probe is the slowest sensor on the board.
    pub fn settle(&self) -> Duration {
        let ms = match self {
            Command::AttachServo { .. } | Command::AttachGps | Command::ReadGps => 500,
            Command::Ping { .. } => 200,
            Command::ReadTemperature => 1000,
            Command::ReadConductivity => 3000,
            Command::ReadCompass => 300,
            _ => DEFAULT_SETTLE_MS,
        };
        Duration::from_millis(ms)
    }

    /// Reply policy for this command family.
    pub fn response_mode(&self) -> ResponseMode {
        match self {
            Command::AttachMotor { .. }
            | Command::AttachServo { .. }
            | Command::AttachGps
            | Command::ReadAnalogPins
            | Command::ReadDigitalPins
            | Command::Ping { .. }
            | Command::ReadConductivity
            | Command::ReadCompass
            | Command::ReadGyroscope
            | Command::ReadGps
            | Command::EncoderPosition { .. } => ResponseMode::Retry,
            Command::RunEncodedMotor { .. } | Command::RunTwoEncodedMotors { .. } => {
                ResponseMode::EchoCompletion
            }
            _ => ResponseMode::Single,
        }
    }

    /// Full framing options for this command family.
    pub fn send_options(&self) -> SendOptions {
        SendOptions::with_settle(self.response_mode(), self.settle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_encoding() {
        assert_eq!(Command::FirmwareVersion.encode(), "n");
        assert_eq!(Command::AttachMotor { motor: 2, pin: 7 }.encode(), "a m 2 7");
        assert_eq!(Command::AttachServo { servo: 0, pin: 9 }.encode(), "a s 0 9");
        assert_eq!(Command::AttachGps.encode(), "a g");
        assert_eq!(Command::ReadAnalogPins.encode(), "r a");
        assert_eq!(Command::ReadDigitalPins.encode(), "r d");
        assert_eq!(Command::Ping { pin: 6 }.encode(), "q 6");
        assert_eq!(
            Command::MoveServo {
                servo: 1,
                position: 135
            }
            .encode(),
            "v 1 135"
        );
        assert_eq!(
            Command::MoveAllServos {
                positions: [0, 90, 180]
            }
            .encode(),
            "V 0 90 180"
        );
        assert_eq!(
            Command::RunMotor {
                motor: 0,
                speed: -500,
                time: 3000
            }
            .encode(),
            "d 0 -500 3000"
        );
        assert_eq!(
            Command::RunTwoMotors {
                motors: [(0, 250), (1, -250)],
                time: 0
            }
            .encode(),
            "D 0 250 1 -250 0"
        );
        assert_eq!(
            Command::RunEncodedMotor {
                motor: 1,
                speed: 300,
                ticks: 48
            }
            .encode(),
            "e 1 300 48"
        );
        assert_eq!(
            Command::RunTwoEncodedMotors {
                motors: [(0, 300, 48), (1, 300, 48)]
            }
            .encode(),
            "E 0 300 48 1 300 48"
        );
        assert_eq!(Command::EncoderPosition { motor: 1 }.encode(), "p 1");
        assert_eq!(Command::ResetEncoder { motor: 0 }.encode(), "z 0");
        assert_eq!(Command::SetRampUpTime { millis: 1500 }.encode(), "m 1500");
    }

    #[test]
    fn test_settle_times() {
        assert_eq!(
            Command::AttachServo { servo: 0, pin: 9 }.settle(),
            Duration::from_millis(500)
        );
        assert_eq!(
            Command::ReadConductivity.settle(),
            Duration::from_millis(3000)
        );
        assert_eq!(Command::Ping { pin: 6 }.settle(), Duration::from_millis(200));
        assert_eq!(
            Command::FirmwareVersion.settle(),
            Duration::from_millis(100)
        );
        // same wire byte, different settle
        assert_eq!(Command::ReadCompass.settle(), Duration::from_millis(300));
        assert_eq!(Command::ReadGps.settle(), Duration::from_millis(500));
    }

    #[test]
    fn test_response_modes() {
        assert_eq!(
            Command::AttachMotor { motor: 0, pin: 5 }.response_mode(),
            ResponseMode::Retry
        );
        assert_eq!(
            Command::MoveServo {
                servo: 0,
                position: 90
            }
            .response_mode(),
            ResponseMode::Single
        );
        assert_eq!(
            Command::RunEncodedMotor {
                motor: 0,
                speed: 300,
                ticks: 48
            }
            .response_mode(),
            ResponseMode::EchoCompletion
        );
        assert_eq!(
            Command::RunMotor {
                motor: 0,
                speed: 300,
                time: 1000
            }
            .response_mode(),
            ResponseMode::Single
        );
    }
}
