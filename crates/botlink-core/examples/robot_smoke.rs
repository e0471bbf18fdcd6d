//! Robot Communication Smoke Test
//!
//! A standalone tool to check the serial link to a robot: connect, verify
//! the firmware version, read the pins, and optionally exercise a motor
//! and a servo.
//!
//! Usage:
//!   cargo run --example robot_smoke -- [OPTIONS]
//!
//! Options:
//!   --port PORT       Serial port (default: /dev/ttyACM0)
//!   --baud RATE       Baud rate (default: 9600)
//!   --nano            Use the Nano/Pro Mini pin tables instead of the Uno
//!   --motor-pin PIN   Attach motor 1 to PIN and run it briefly
//!   --servo-pin PIN   Attach servo 1 to PIN and sweep it
//!   --list            Just list candidate serial ports and exit

use botlink_core::board::BoardConfig;
use botlink_core::protocol::list_ports;
use botlink_core::robot::{Robot, RobotConfig, MOTOR1, SERVO1};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut port_name = "/dev/ttyACM0".to_string();
    let mut baud_rate = 9600u32;
    let mut board = BoardConfig::uno();
    let mut motor_pin: Option<u8> = None;
    let mut servo_pin: Option<u8> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                i += 1;
                if i < args.len() {
                    port_name = args[i].clone();
                }
            }
            "--baud" | "-b" => {
                i += 1;
                if i < args.len() {
                    baud_rate = args[i].parse().unwrap_or(9600);
                }
            }
            "--nano" => {
                board = BoardConfig::nano();
            }
            "--motor-pin" => {
                i += 1;
                if i < args.len() {
                    motor_pin = args[i].parse().ok();
                }
            }
            "--servo-pin" => {
                i += 1;
                if i < args.len() {
                    servo_pin = args[i].parse().ok();
                }
            }
            "--list" => {
                for port in list_ports() {
                    println!(
                        "{}  {}",
                        port.name,
                        port.product.as_deref().unwrap_or("(unknown device)")
                    );
                }
                return;
            }
            other => {
                eprintln!("unknown option: {other}");
                std::process::exit(2);
            }
        }
        i += 1;
    }

    let mut robot = Robot::new(RobotConfig {
        port_name,
        baud_rate,
        board,
        ..RobotConfig::default()
    });

    println!("Connecting (the board resets first, this takes a few seconds)...");
    if let Err(e) = robot.connect() {
        eprintln!("connect failed: {e}");
        // fatal means the link is unusable; nothing to retry here
        std::process::exit(if e.is_fatal() { 1 } else { 2 });
    }
    if let Some(version) = robot.firmware_version() {
        println!("Firmware version: {version}");
    }

    match robot.refresh_analog_pins() {
        Ok(()) => {
            print!("Analog readings:");
            for pin in robot.available_analog_pins() {
                match robot.analog_pin(pin) {
                    Ok(value) => print!("  A{pin}={value}"),
                    Err(e) => print!("  A{pin}=<{e}>"),
                }
            }
            println!();
        }
        Err(e) => eprintln!("analog refresh failed: {e}"),
    }

    if let Some(pin) = motor_pin {
        println!("Attaching motor 1 to pin {pin} and running for 2 seconds...");
        match robot
            .attach_motor(MOTOR1, pin)
            .and_then(|_| robot.run_motor(MOTOR1, 250, 2000))
        {
            Ok(()) => println!("motor ok"),
            Err(e) => eprintln!("motor test failed: {e}"),
        }
    }

    if let Some(pin) = servo_pin {
        println!("Attaching servo 1 to pin {pin} and sweeping...");
        let sweep = robot.attach_servo(SERVO1, pin).and_then(|_| {
            robot.move_servo(SERVO1, 0)?;
            std::thread::sleep(std::time::Duration::from_millis(700));
            robot.move_servo(SERVO1, 180)?;
            std::thread::sleep(std::time::Duration::from_millis(700));
            robot.move_servo(SERVO1, 90)
        });
        match sweep {
            Ok(()) => println!("servo ok"),
            Err(e) => eprintln!("servo test failed: {e}"),
        }
    }

    robot.close();
    println!("Done.");
}
