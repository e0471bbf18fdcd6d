//! Device session
//!
//! Orchestrates the connection lifecycle and exposes the typed operations
//! the robot supports, composing the framing engine, the reply parser, and
//! the pin/attachment bookkeeping.
//!
//! A [`Robot`] is a single logical stream of command/response exchanges:
//! the protocol is half-duplex with no pipelining, so no new command is
//! issued while a reply is outstanding. The type holds no locks and is not
//! reentrant; callers with multiple threads must funnel work through one
//! owner.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::board::BoardConfig;
use crate::pins::PinBank;
use crate::protocol::commands::Command;
use crate::protocol::framing;
use crate::protocol::response;
use crate::protocol::serial;
use crate::protocol::transport::{SerialTransport, Transport};
use crate::protocol::{
    FirmwareVersion, ProtocolError, SlotKind, DEFAULT_BAUD_RATE, HOST_VERSION,
};

/// The M1 DC motor slot (pin 5 on the stock shield)
pub const MOTOR1: usize = 0;
/// The M2 DC motor slot (pin 6 on the stock shield)
pub const MOTOR2: usize = 1;
/// The M3 DC motor slot (pin 7 on the stock shield)
pub const MOTOR3: usize = 2;
/// The M4 DC motor slot (pin 8 on the stock shield)
pub const MOTOR4: usize = 3;

/// The first servo slot (pin 9 on the stock shield)
pub const SERVO1: usize = 0;
/// The second servo slot (pin 10 on the stock shield)
pub const SERVO2: usize = 1;
/// The third servo slot (pin 11 on the stock shield)
pub const SERVO3: usize = 2;

const MOTOR_COUNT: usize = 4;
const SERVO_COUNT: usize = 3;

/// The motor driver browns out beyond two simultaneous DC motors
const MAX_RUNNING_MOTORS: usize = 2;

const SPEED_LIMIT: i32 = 500;
const QUAD_SPEED_LIMIT: i32 = 255;
const TIME_LIMIT_MS: i32 = 30_000;
const ANGLE_LIMIT: i32 = 180;
const SERVO_NEUTRAL: i32 = 90;
const MIXER_SPEED_LIMIT: i32 = 255;
const DEFAULT_MIXER_SPEED: i32 = 30;

/// Fixed wiring for the GPS module
const GPS_RX_PIN: u8 = 10;
const GPS_TX_PIN: u8 = 11;

/// Opening the port resets the board; give the bootloader time to hand
/// over to the firmware before talking to it
const BOOT_SETTLE: Duration = Duration::from_millis(3000);

/// Quiet period before close-time teardown
const CLOSE_SETTLE: Duration = Duration::from_millis(300);

/// Post-move settle after an encoded run completes
const ENCODER_SETTLE: Duration = Duration::from_millis(1000);

/// Connection lifecycle state.
///
/// `Closed` is terminal: a session that has been closed cannot be
/// reconnected, create a new [`Robot`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not yet connected
    Disconnected,
    /// Bring-up in progress
    Connecting,
    /// Connected and ready
    Connected,
    /// Closed for good
    Closed,
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Serial port name (e.g. "/dev/ttyACM0" or "COM3")
    pub port_name: String,
    /// Baud rate; the stock firmware listens at 9600
    pub baud_rate: u32,
    /// Pin tables for the board in use
    pub board: BoardConfig,
    /// Drive servos to neutral and stop motors when the session closes
    pub reset_on_close: bool,
    /// Skip range validation and send caller values as-is
    pub override_validation: bool,
    /// Dump response fields and full diagnostics on protocol errors
    pub verbose: bool,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            board: BoardConfig::default(),
            reset_on_close: true,
            override_validation: false,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct MotorSlot {
    attached: bool,
    running: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct ServoSlot {
    attached: bool,
}

/// A session with one robot.
///
/// Created disconnected; [`connect`](Robot::connect) (or
/// [`attach_transport`](Robot::attach_transport)) brings the link up, and
/// [`close`](Robot::close) tears it down for good.
pub struct Robot {
    config: RobotConfig,
    transport: Option<Box<dyn Transport>>,
    state: ConnectionState,
    firmware: Option<FirmwareVersion>,
    digital: PinBank,
    analog: PinBank,
    motors: [MotorSlot; MOTOR_COUNT],
    servos: [ServoSlot; SERVO_COUNT],
    gps_attached: bool,
    mixer_speed: i32,
}

impl Robot {
    /// Create a new, disconnected session.
    pub fn new(config: RobotConfig) -> Self {
        let digital = PinBank::new(config.board.digital_pins());
        let analog = PinBank::new(config.board.analog_pins());
        Self {
            config,
            transport: None,
            state: ConnectionState::Disconnected,
            firmware: None,
            digital,
            analog,
            motors: [MotorSlot::default(); MOTOR_COUNT],
            servos: [ServoSlot::default(); SERVO_COUNT],
            gps_attached: false,
            mixer_speed: DEFAULT_MIXER_SPEED,
        }
    }

    /// Open the configured serial port and bring the session up.
    ///
    /// Failures here are fatal in the [`ProtocolError::is_fatal`] sense: a
    /// robot program cannot do anything without its link. Whether to
    /// terminate the process is the caller's decision.
    pub fn connect(&mut self) -> Result<(), ProtocolError> {
        self.check_can_connect()?;
        if self.config.port_name.is_empty() {
            return Err(ProtocolError::ConnectionFailed(format!(
                "no port was specified{}",
                port_hint()
            )));
        }

        info!("connecting to robot on {}", self.config.port_name);
        self.state = ConnectionState::Connecting;

        let mut port =
            match serial::open_port(&self.config.port_name, Some(self.config.baud_rate)) {
                Ok(port) => port,
                Err(e) => {
                    self.state = ConnectionState::Disconnected;
                    return Err(ProtocolError::ConnectionFailed(format!("{e}{}", port_hint())));
                }
            };
        if let Err(e) = serial::configure_port(port.as_mut()) {
            self.state = ConnectionState::Disconnected;
            return Err(ProtocolError::ConnectionFailed(e.to_string()));
        }
        let _ = serial::clear_buffers(port.as_mut());

        // The board is rebooting right now
        debug!("waiting {:?} for the board to finish resetting", BOOT_SETTLE);
        thread::sleep(BOOT_SETTLE);
        let _ = serial::clear_buffers(port.as_mut());

        let name = self.config.port_name.clone();
        self.transport = Some(Box::new(SerialTransport::new(port, name)));
        self.bring_up()
    }

    /// Bring the session up over an already-open transport.
    ///
    /// This is the seam for alternate transports and for exercising the
    /// engine without hardware; the same bring-up sequence (pin tables,
    /// initial analog refresh, version negotiation) runs either way.
    pub fn attach_transport(
        &mut self,
        transport: Box<dyn Transport>,
    ) -> Result<(), ProtocolError> {
        self.check_can_connect()?;
        self.state = ConnectionState::Connecting;
        self.transport = Some(transport);
        self.bring_up()
    }

    fn check_can_connect(&self) -> Result<(), ProtocolError> {
        match self.state {
            ConnectionState::Closed => Err(ProtocolError::SessionClosed),
            ConnectionState::Connected => Err(ProtocolError::AlreadyConnected),
            _ => Ok(()),
        }
    }

    fn bring_up(&mut self) -> Result<(), ProtocolError> {
        self.digital = PinBank::new(self.config.board.digital_pins());
        self.analog = PinBank::new(self.config.board.analog_pins());
        self.motors = [MotorSlot::default(); MOTOR_COUNT];
        self.servos = [ServoSlot::default(); SERVO_COUNT];
        self.gps_attached = false;
        self.state = ConnectionState::Connected;

        if let Err(e) = self.refresh_analog_pins() {
            warn!("initial analog refresh failed: {e}");
        }

        match self.negotiate_version() {
            Ok(version) => {
                info!("firmware version {version}, host version {HOST_VERSION}");
                self.firmware = Some(version);
            }
            Err(e) if e.is_fatal() => {
                self.transport = None;
                self.state = ConnectionState::Disconnected;
                return Err(e);
            }
            // A garbled version reply is not worth refusing the link over
            Err(e) => warn!("could not verify the firmware version: {e}"),
        }

        info!("connected");
        Ok(())
    }

    fn negotiate_version(&mut self) -> Result<FirmwareVersion, ProtocolError> {
        let raw = self.send(&Command::FirmwareVersion)?;
        let tokens = response::fields(&raw, 4, self.config.verbose)?;
        let part = |field: &str| {
            field
                .parse::<u32>()
                .map_err(|_| ProtocolError::ResponseValue {
                    field: field.to_string(),
                    response: raw.clone(),
                })
        };
        let firmware = FirmwareVersion {
            major: part(tokens[1])?,
            minor: part(tokens[2])?,
            subminor: part(tokens[3])?,
        };

        if firmware.major != HOST_VERSION.major {
            return Err(ProtocolError::VersionMismatch {
                firmware,
                host: HOST_VERSION,
            });
        }
        if firmware.minor > HOST_VERSION.minor {
            warn!("host is behind the firmware by a minor version; consider updating");
        } else if firmware.minor < HOST_VERSION.minor {
            warn!("firmware is behind by a minor version; consider reflashing the board");
        } else if firmware.subminor != HOST_VERSION.subminor {
            debug!("subminor version difference, no action needed");
        }
        Ok(firmware)
    }

    /// Close the session: optionally drive all attached servos to neutral
    /// and stop all attached motors, then drop the link. The session cannot
    /// be reconnected afterwards.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if self.transport.is_some() {
            thread::sleep(CLOSE_SETTLE);
            info!("closing robot connection");
            if self.config.reset_on_close {
                self.reset_outputs();
            }
        }
        self.transport = None;
        self.state = ConnectionState::Closed;
        info!("connection closed");
    }

    fn reset_outputs(&mut self) {
        debug!("resetting servos and motors");
        for servo in 0..SERVO_COUNT {
            if self.servos[servo].attached {
                if let Err(e) = self.move_servo(servo, SERVO_NEUTRAL) {
                    warn!("could not reset servo {servo}: {e}");
                }
            }
        }
        for motor in 0..MOTOR_COUNT {
            if self.motors[motor].attached {
                if let Err(e) = self.run_motor(motor, 0, 0) {
                    warn!("could not stop motor {motor}: {e}");
                }
            }
        }
    }

    // ---- attachment ----

    /// Bind a DC motor slot to a free digital pin.
    ///
    /// The firmware acknowledges by echoing the command verbatim; anything
    /// else is rejected and the slot and pin are left untouched.
    pub fn attach_motor(&mut self, motor: usize, pin: u8) -> Result<(), ProtocolError> {
        self.require_connected()?;
        self.check_motor_slot(motor, MOTOR4)?;
        if self.motors[motor].attached {
            return Err(ProtocolError::AlreadyAttached {
                kind: SlotKind::Motor,
                index: motor,
            });
        }
        if !self.digital.contains(pin) {
            return Err(ProtocolError::PinUnavailable(pin));
        }

        self.verify_echo(&Command::AttachMotor { motor, pin })?;
        self.motors[motor].attached = true;
        self.digital.take(pin);
        debug!("attached motor {motor} to pin {pin}");
        Ok(())
    }

    /// Bind a servo slot to a free digital pin.
    pub fn attach_servo(&mut self, servo: usize, pin: u8) -> Result<(), ProtocolError> {
        self.require_connected()?;
        self.check_servo_slot(servo)?;
        if self.servos[servo].attached {
            return Err(ProtocolError::AlreadyAttached {
                kind: SlotKind::Servo,
                index: servo,
            });
        }
        if !self.digital.contains(pin) {
            return Err(ProtocolError::PinUnavailable(pin));
        }

        self.verify_echo(&Command::AttachServo { servo, pin })?;
        self.servos[servo].attached = true;
        self.digital.take(pin);
        debug!("attached servo {servo} to pin {pin}");
        Ok(())
    }

    /// Enable the GPS module. It is always wired to digital pins 10 and 11,
    /// both of which must still be free.
    pub fn attach_gps(&mut self) -> Result<(), ProtocolError> {
        self.require_connected()?;
        if !self.digital.contains(GPS_RX_PIN) {
            return Err(ProtocolError::PinUnavailable(GPS_RX_PIN));
        }
        if !self.digital.contains(GPS_TX_PIN) {
            return Err(ProtocolError::PinUnavailable(GPS_TX_PIN));
        }

        self.verify_echo(&Command::AttachGps)?;
        self.digital.take(GPS_RX_PIN);
        self.digital.take(GPS_TX_PIN);
        self.gps_attached = true;
        debug!("attached GPS module");
        Ok(())
    }

    // ---- motors ----

    /// Run one DC motor at `speed` for `time` milliseconds.
    ///
    /// Blocks for the duration of the run. A time of 0 starts the motor and
    /// returns immediately; the motor keeps running until the next command
    /// for that slot (`run_motor(motor, 0, 0)` stops it).
    pub fn run_motor(&mut self, motor: usize, speed: i32, time: i32) -> Result<(), ProtocolError> {
        self.require_connected()?;
        self.check_motor_slot(motor, MOTOR4)?;
        self.check_attached(motor)?;
        if !self.config.override_validation {
            check_range("speed", speed, -SPEED_LIMIT, SPEED_LIMIT)?;
            check_range("time", time, 0, TIME_LIMIT_MS)?;
            self.reserve_running(&[(motor, speed)])?;
        }

        debug!("running motor {motor} at speed {speed} for {time} ms");
        let reply = self.send(&Command::RunMotor { motor, speed, time })?;
        if !reply.is_empty() {
            thread::sleep(Duration::from_millis(time.max(0) as u64));
        }
        if time != 0 {
            self.motors[motor].running = false;
        }
        Ok(())
    }

    /// Run two DC motors at independent speeds for the same duration.
    pub fn run_two_motors(
        &mut self,
        motor1: usize,
        speed1: i32,
        motor2: usize,
        speed2: i32,
        time: i32,
    ) -> Result<(), ProtocolError> {
        self.require_connected()?;
        self.check_motor_slot(motor1, MOTOR4)?;
        self.check_motor_slot(motor2, MOTOR4)?;
        self.check_attached(motor1)?;
        self.check_attached(motor2)?;
        if !self.config.override_validation {
            check_range("speed", speed1, -SPEED_LIMIT, SPEED_LIMIT)?;
            check_range("speed", speed2, -SPEED_LIMIT, SPEED_LIMIT)?;
            check_range("time", time, 0, TIME_LIMIT_MS)?;
            self.reserve_running(&[(motor1, speed1), (motor2, speed2)])?;
        }

        debug!(
            "running motor {motor1} at {speed1} and motor {motor2} at {speed2} for {time} ms"
        );
        let reply = self.send(&Command::RunTwoMotors {
            motors: [(motor1, speed1), (motor2, speed2)],
            time,
        })?;
        if !reply.is_empty() {
            thread::sleep(Duration::from_millis(time.max(0) as u64));
        }
        if time != 0 {
            self.motors[motor1].running = false;
            self.motors[motor2].running = false;
        }
        Ok(())
    }

    /// Run all four DC motors at once.
    ///
    /// The motor driver cannot actually power four motors, so this is
    /// rejected unless validation is overridden. Speeds use the raw PWM
    /// range of ±255.
    #[deprecated(note = "the driver board only supports two motors at a time")]
    pub fn run_four_motors(
        &mut self,
        motors: [(usize, i32); 4],
        time: i32,
    ) -> Result<(), ProtocolError> {
        self.require_connected()?;
        for (motor, _) in motors {
            self.check_motor_slot(motor, MOTOR4)?;
        }
        for (motor, _) in motors {
            self.check_attached(motor)?;
        }
        if !self.config.override_validation {
            for (_, speed) in motors {
                check_range("speed", speed, -QUAD_SPEED_LIMIT, QUAD_SPEED_LIMIT)?;
            }
            return Err(ProtocolError::TooManyMotors);
        }

        debug!("running four motors for {time} ms");
        let reply = self.send(&Command::RunFourMotors { motors, time })?;
        if !reply.is_empty() {
            thread::sleep(Duration::from_millis(time.max(0) as u64));
        }
        Ok(())
    }

    /// Move one encoded motor a number of encoder ticks, blocking until the
    /// firmware echoes completion.
    ///
    /// Only the M1 and M2 slots carry encoders. If the encoder is not
    /// wired correctly the firmware never echoes; the wait is bounded by
    /// the framing engine's echo deadline.
    pub fn run_encoded_motor(
        &mut self,
        motor: usize,
        speed: i32,
        ticks: i32,
    ) -> Result<(), ProtocolError> {
        self.require_connected()?;
        self.check_motor_slot(motor, MOTOR4)?;
        if !self.config.override_validation {
            check_range("speed", speed, -SPEED_LIMIT, SPEED_LIMIT)?;
            self.check_motor_slot(motor, MOTOR2)?;
            if ticks <= 0 {
                return Err(ProtocolError::NotPositive {
                    what: "ticks",
                    value: ticks,
                });
            }
            self.reserve_running(&[(motor, speed)])?;
        }

        debug!("running encoded motor {motor} at speed {speed} for {ticks} ticks");
        let result = self.send(&Command::RunEncodedMotor {
            motor,
            speed,
            ticks,
        });
        self.motors[motor].running = false;
        result?;
        debug!("encoded move complete");
        thread::sleep(ENCODER_SETTLE);
        Ok(())
    }

    /// Move both encoded motors, each with its own speed and tick count,
    /// blocking until the firmware echoes completion.
    pub fn run_two_encoded_motors(
        &mut self,
        motor1: usize,
        speed1: i32,
        ticks1: i32,
        motor2: usize,
        speed2: i32,
        ticks2: i32,
    ) -> Result<(), ProtocolError> {
        self.require_connected()?;
        self.check_motor_slot(motor1, MOTOR4)?;
        self.check_motor_slot(motor2, MOTOR4)?;
        if !self.config.override_validation {
            check_range("speed", speed1, -SPEED_LIMIT, SPEED_LIMIT)?;
            check_range("speed", speed2, -SPEED_LIMIT, SPEED_LIMIT)?;
            self.check_motor_slot(motor1, MOTOR2)?;
            self.check_motor_slot(motor2, MOTOR2)?;
            for ticks in [ticks1, ticks2] {
                if ticks <= 0 {
                    return Err(ProtocolError::NotPositive {
                        what: "ticks",
                        value: ticks,
                    });
                }
            }
            self.reserve_running(&[(motor1, speed1), (motor2, speed2)])?;
        }

        debug!(
            "running encoded motors {motor1} ({speed1}, {ticks1} ticks) and {motor2} ({speed2}, {ticks2} ticks)"
        );
        let result = self.send(&Command::RunTwoEncodedMotors {
            motors: [(motor1, speed1, ticks1), (motor2, speed2, ticks2)],
        });
        self.motors[motor1].running = false;
        self.motors[motor2].running = false;
        result?;
        debug!("encoded moves complete");
        thread::sleep(ENCODER_SETTLE);
        Ok(())
    }

    /// Net encoder tick count for a motor since the last reset. Positive
    /// speeds increase the count, negative speeds decrease it.
    pub fn encoded_motor_position(&mut self, motor: usize) -> Result<i32, ProtocolError> {
        self.require_connected()?;
        self.check_motor_slot(motor, MOTOR4)?;
        if !self.config.override_validation {
            self.check_motor_slot(motor, MOTOR2)?;
        }

        let raw = self.send(&Command::EncoderPosition { motor })?;
        let tokens = response::fields(&raw, 3, self.config.verbose)?;
        response::int_field(tokens[2], &raw)
    }

    /// Reset a motor's encoder tick count to zero.
    pub fn reset_encoded_motor_position(&mut self, motor: usize) -> Result<(), ProtocolError> {
        self.require_connected()?;
        self.check_motor_slot(motor, MOTOR4)?;
        if !self.config.override_validation {
            self.check_motor_slot(motor, MOTOR2)?;
        }

        let reply = self.send(&Command::ResetEncoder { motor })?;
        if reply.is_empty() {
            return Err(ProtocolError::EmptyResponse);
        }
        debug!("encoder {motor} reset");
        Ok(())
    }

    /// Set the ramp-up time applied to all motors, in milliseconds.
    ///
    /// Ramp-up is included in a timed run's total: a 1500 ms ramp within a
    /// 5000 ms run leaves 3500 ms at the requested speed.
    pub fn set_motor_ramp_up_time(&mut self, millis: i32) -> Result<(), ProtocolError> {
        self.require_connected()?;
        if millis < 0 {
            return Err(ProtocolError::Negative {
                what: "ramp-up time",
                value: millis,
            });
        }

        let reply = self.send(&Command::SetRampUpTime { millis })?;
        if reply.is_empty() {
            return Err(ProtocolError::EmptyResponse);
        }
        debug!("motor ramp-up time set to {millis} ms");
        Ok(())
    }

    // ---- servos ----

    /// Move one servo to an angular position in degrees [0, 180].
    ///
    /// Non-blocking: the command is fired and the physical move completes
    /// on its own time. Back-to-back calls for the same servo supersede
    /// each other.
    pub fn move_servo(&mut self, servo: usize, position: i32) -> Result<(), ProtocolError> {
        self.require_connected()?;
        self.check_servo_slot(servo)?;
        if !self.servos[servo].attached {
            return Err(ProtocolError::NotAttached {
                kind: SlotKind::Servo,
                index: servo,
            });
        }
        if !self.config.override_validation {
            check_range("position", position, 0, ANGLE_LIMIT)?;
        }

        debug!("moving servo {servo} to {position}");
        self.send(&Command::MoveServo { servo, position })?;
        Ok(())
    }

    /// Move all three servos simultaneously. All three must be attached.
    pub fn move_all_servos(
        &mut self,
        pos1: i32,
        pos2: i32,
        pos3: i32,
    ) -> Result<(), ProtocolError> {
        self.require_connected()?;
        for servo in 0..SERVO_COUNT {
            if !self.servos[servo].attached {
                return Err(ProtocolError::NotAttached {
                    kind: SlotKind::Servo,
                    index: servo,
                });
            }
        }
        if !self.config.override_validation {
            check_range("position", pos1, 0, ANGLE_LIMIT)?;
            check_range("position", pos2, 0, ANGLE_LIMIT)?;
            check_range("position", pos3, 0, ANGLE_LIMIT)?;
        }

        debug!("moving servos to {pos1}, {pos2}, {pos3}");
        self.send(&Command::MoveAllServos {
            positions: [pos1, pos2, pos3],
        })?;
        Ok(())
    }

    // ---- pin reads ----

    /// Bulk-read every free analog pin into the cache.
    ///
    /// Every cache entry is reset to the stale sentinel first; a failed
    /// refresh therefore leaves all readings recognizably stale rather
    /// than silently old.
    pub fn refresh_analog_pins(&mut self) -> Result<(), ProtocolError> {
        self.analog.reset_cache();
        self.require_connected()?;

        let raw = self.send(&Command::ReadAnalogPins)?;
        let expected = 1 + self.analog.len();
        let tokens = response::fields(&raw, expected, self.config.verbose)?;
        let values = response::int_fields(&tokens[1..], &raw)?;
        self.analog.commit(values);
        debug!("analog pins refreshed");
        Ok(())
    }

    /// Bulk-read every free digital pin into the cache.
    pub fn refresh_digital_pins(&mut self) -> Result<(), ProtocolError> {
        self.digital.reset_cache();
        self.require_connected()?;

        let raw = self.send(&Command::ReadDigitalPins)?;
        let expected = 1 + self.digital.len();
        let tokens = response::fields(&raw, expected, self.config.verbose)?;
        let values = response::int_fields(&tokens[1..], &raw)?;
        self.digital.commit(values);
        debug!("digital pins refreshed");
        Ok(())
    }

    /// Cached reading for an analog pin (0–1023), refreshing first if no
    /// refresh has happened this session. `-1` means the last refresh
    /// failed to produce a value.
    pub fn analog_pin(&mut self, pin: u8) -> Result<i32, ProtocolError> {
        if !self.analog.has_readings() {
            self.refresh_analog_pins()?;
        }
        self.analog
            .reading(pin)
            .ok_or(ProtocolError::PinUnavailable(pin))
    }

    /// Cached reading for a digital pin (0 or 1), refreshing first if no
    /// refresh has happened this session.
    pub fn digital_pin(&mut self, pin: u8) -> Result<i32, ProtocolError> {
        if !self.digital.has_readings() {
            self.refresh_digital_pins()?;
        }
        self.digital
            .reading(pin)
            .ok_or(ProtocolError::PinUnavailable(pin))
    }

    // ---- accessory sensors ----

    /// Distance in centimeters from the ping sensor on a free digital pin.
    /// Ping sensors need no attach step, but the pin must not be claimed.
    pub fn ping(&mut self, pin: u8) -> Result<i32, ProtocolError> {
        self.require_connected()?;
        if !self.digital.contains(pin) {
            return Err(ProtocolError::PinUnavailable(pin));
        }

        let raw = self.send(&Command::Ping { pin })?;
        let tokens = response::fields(&raw, 3, self.config.verbose)?;
        response::int_field(tokens[2], &raw)
    }

    /// Water temperature in degrees Celsius from the sensor on pin 2.
    #[deprecated(note = "the temperature sensor is no longer fitted")]
    pub fn temperature(&mut self) -> Result<i32, ProtocolError> {
        self.require_connected()?;
        let raw = self.send(&Command::ReadTemperature)?;
        let tokens = response::fields(&raw, 2, self.config.verbose)?;
        response::int_field(tokens[1], &raw)
    }

    /// Voltage difference between the conductivity probe plates, in ADC
    /// units.
    pub fn conductivity(&mut self) -> Result<i32, ProtocolError> {
        self.require_connected()?;
        let raw = self.send(&Command::ReadConductivity)?;
        let tokens = response::fields(&raw, 2, self.config.verbose)?;
        response::int_field(tokens[1], &raw)
    }

    /// Compass heading in degrees.
    #[deprecated(note = "the compass is unreliable near running motors")]
    pub fn compass(&mut self) -> Result<i32, ProtocolError> {
        self.require_connected()?;
        let raw = self.send(&Command::ReadCompass)?;
        let tokens = response::fields(&raw, 2, self.config.verbose)?;
        response::int_field(tokens[1], &raw)
    }

    /// Orientation on the gyroscope's three axes.
    #[deprecated(note = "the gyroscope is no longer fitted")]
    pub fn gyroscope(&mut self) -> Result<[i32; 3], ProtocolError> {
        self.require_connected()?;
        let raw = self.send(&Command::ReadGyroscope)?;
        let tokens = response::fields(&raw, 4, self.config.verbose)?;
        Ok([
            response::int_field(tokens[1], &raw)?,
            response::int_field(tokens[2], &raw)?,
            response::int_field(tokens[3], &raw)?,
        ])
    }

    /// GPS fix as [degrees latitude, minutes latitude, degrees longitude,
    /// minutes longitude]. Requires [`attach_gps`](Robot::attach_gps), and
    /// the module needs around 30 seconds from cold boot to find
    /// satellites.
    pub fn gps_coordinates(&mut self) -> Result<[f64; 4], ProtocolError> {
        self.require_connected()?;
        if !self.gps_attached {
            return Err(ProtocolError::GpsNotAttached);
        }

        let raw = self.send(&Command::ReadGps)?;
        let tokens = response::fields(&raw, 5, self.config.verbose)?;
        Ok([
            response::float_field(tokens[1], &raw)?,
            response::float_field(tokens[2], &raw)?,
            response::float_field(tokens[3], &raw)?,
            response::float_field(tokens[4], &raw)?,
        ])
    }

    // ---- mixer ----

    /// Run the mixing motor at the configured mixer speed.
    #[deprecated(note = "the mixer accessory is no longer used")]
    pub fn run_mixer(&mut self, motor: usize, time: i32) -> Result<(), ProtocolError> {
        self.require_connected()?;
        self.check_motor_slot(motor, MOTOR4)?;
        if !self.config.override_validation && time < 0 {
            return Err(ProtocolError::Negative {
                what: "time",
                value: time,
            });
        }

        debug!(
            "running mixer on motor {motor} at speed {} for {time} ms",
            self.mixer_speed
        );
        let reply = self.send(&Command::RunMotor {
            motor,
            speed: self.mixer_speed,
            time,
        })?;
        if !reply.is_empty() {
            thread::sleep(Duration::from_millis(time.max(0) as u64));
        }
        Ok(())
    }

    /// Stop a mixer started with a time of 0.
    #[deprecated(note = "the mixer accessory is no longer used")]
    pub fn stop_mixer(&mut self, motor: usize) -> Result<(), ProtocolError> {
        self.require_connected()?;
        self.check_motor_slot(motor, MOTOR4)?;
        debug!("stopping mixer on motor {motor}");
        self.send(&Command::RunMotor {
            motor,
            speed: 0,
            time: 0,
        })?;
        Ok(())
    }

    /// Set the mixer speed, clamped to [0, 255] unless validation is
    /// overridden.
    #[deprecated(note = "the mixer accessory is no longer used")]
    pub fn set_mixer_speed(&mut self, speed: i32) {
        if self.config.override_validation {
            self.mixer_speed = speed;
            return;
        }
        let clamped = speed.clamp(0, MIXER_SPEED_LIMIT);
        if clamped != speed {
            warn!("mixer speed {speed} out of range, clamping to {clamped}");
        }
        self.mixer_speed = clamped;
    }

    /// The configured mixer speed.
    #[deprecated(note = "the mixer accessory is no longer used")]
    pub fn mixer_speed(&self) -> i32 {
        self.mixer_speed
    }

    // ---- configuration & introspection ----

    /// Whether a transport is currently attached.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Firmware version negotiated at bring-up, if any.
    pub fn firmware_version(&self) -> Option<FirmwareVersion> {
        self.firmware
    }

    /// Digital pins still free to attach or poll.
    pub fn available_digital_pins(&self) -> Vec<u8> {
        self.digital.available().to_vec()
    }

    /// Analog pins still free to poll.
    pub fn available_analog_pins(&self) -> Vec<u8> {
        self.analog.available().to_vec()
    }

    /// Whether servos and motors are reset when the session closes.
    pub fn reset_on_close(&self) -> bool {
        self.config.reset_on_close
    }

    /// Control close-time teardown of servos and motors.
    pub fn set_reset_on_close(&mut self, reset: bool) {
        self.config.reset_on_close = reset;
    }

    /// Whether range validation is currently overridden.
    pub fn override_validation(&self) -> bool {
        self.config.override_validation
    }

    /// Disable (or re-enable) range validation.
    ///
    /// With the override active, out-of-range speeds, times, and angles are
    /// sent to the device exactly as given. Hard preconditions (a live
    /// connection, attached hardware) still apply.
    pub fn set_override_validation(&mut self, enabled: bool) {
        if enabled {
            warn!(
                "validation override enabled: range checks are off and the values sent to the \
                 device are now your responsibility"
            );
        }
        self.config.override_validation = enabled;
    }

    // ---- internals ----

    fn require_connected(&self) -> Result<(), ProtocolError> {
        if self.transport.is_none() {
            return Err(ProtocolError::NotConnected);
        }
        Ok(())
    }

    fn check_motor_slot(&self, motor: usize, max: usize) -> Result<(), ProtocolError> {
        if motor > max {
            return Err(ProtocolError::InvalidSlot {
                kind: SlotKind::Motor,
                index: motor,
            });
        }
        Ok(())
    }

    fn check_servo_slot(&self, servo: usize) -> Result<(), ProtocolError> {
        if servo >= SERVO_COUNT {
            return Err(ProtocolError::InvalidSlot {
                kind: SlotKind::Servo,
                index: servo,
            });
        }
        Ok(())
    }

    fn check_attached(&self, motor: usize) -> Result<(), ProtocolError> {
        if !self.motors[motor].attached {
            return Err(ProtocolError::NotAttached {
                kind: SlotKind::Motor,
                index: motor,
            });
        }
        Ok(())
    }

    /// Speculatively mark the given motors as running (a speed of 0 stops)
    /// and roll the flags back if more than two motors would run at once.
    /// Runs after every other check so a rejection never leaves speculative
    /// state behind.
    fn reserve_running(&mut self, motors: &[(usize, i32)]) -> Result<(), ProtocolError> {
        let previous = self.motors.map(|m| m.running);
        for &(motor, speed) in motors {
            self.motors[motor].running = speed != 0;
        }
        let running = self.motors.iter().filter(|m| m.running).count();
        if running > MAX_RUNNING_MOTORS {
            for (slot, was) in self.motors.iter_mut().zip(previous) {
                slot.running = was;
            }
            return Err(ProtocolError::TooManyMotors);
        }
        Ok(())
    }

    fn send(&mut self, command: &Command) -> Result<String, ProtocolError> {
        let transport = self
            .transport
            .as_mut()
            .ok_or(ProtocolError::NotConnected)?;
        let line = command.encode();
        debug!("sending command: {line}");
        framing::send_command(transport.as_mut(), &line, &command.send_options())
    }

    fn verify_echo(&mut self, command: &Command) -> Result<(), ProtocolError> {
        let line = command.encode();
        let reply = self.send(command)?;
        if reply != line {
            return Err(ProtocolError::EchoMismatch {
                sent: line,
                received: reply,
            });
        }
        Ok(())
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        self.close();
    }
}

fn check_range(what: &'static str, value: i32, min: i32, max: i32) -> Result<(), ProtocolError> {
    if value < min || value > max {
        return Err(ProtocolError::OutOfRange {
            what,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Candidate ports for connect-failure diagnostics.
fn port_hint() -> String {
    let ports = serial::list_ports();
    if ports.is_empty() {
        return String::new();
    }
    let names: Vec<&str> = ports.iter().map(|p| p.name.as_str()).collect();
    format!("; available ports: {}", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_session_is_disconnected() {
        let robot = Robot::new(RobotConfig::default());
        assert_eq!(robot.state(), ConnectionState::Disconnected);
        assert!(!robot.is_connected());
        assert!(robot.firmware_version().is_none());
    }

    #[test]
    fn config_defaults() {
        let config = RobotConfig::default();
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert!(config.reset_on_close);
        assert!(!config.override_validation);
    }

    #[test]
    fn operations_require_a_connection() {
        let mut robot = Robot::new(RobotConfig::default());
        assert!(matches!(
            robot.attach_motor(MOTOR1, 5),
            Err(ProtocolError::NotConnected)
        ));
        assert!(matches!(
            robot.run_motor(MOTOR1, 100, 0),
            Err(ProtocolError::NotConnected)
        ));
        assert!(matches!(
            robot.ping(6),
            Err(ProtocolError::NotConnected)
        ));
    }

    #[test]
    fn closed_is_terminal() {
        let mut robot = Robot::new(RobotConfig::default());
        robot.close();
        assert_eq!(robot.state(), ConnectionState::Closed);
        assert!(matches!(
            robot.connect(),
            Err(ProtocolError::SessionClosed)
        ));
    }

    #[test]
    fn connect_without_a_port_is_fatal() {
        let mut robot = Robot::new(RobotConfig::default());
        let err = robot.connect().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, ProtocolError::ConnectionFailed(_)));
    }
}
