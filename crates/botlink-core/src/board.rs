//! Board pin tables
//!
//! Different board revisions expose different free pins. A board is plain
//! data: the digital and analog pins that are unclaimed when a session
//! starts. Anything wired permanently on the shield (the serial pair, the
//! onboard LED pin if reserved, etc.) simply is not listed.

use serde::{Deserialize, Serialize};

/// Pin tables for one board revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    digital_pins: Vec<u8>,
    analog_pins: Vec<u8>,
}

impl BoardConfig {
    /// A board with explicit pin tables.
    pub fn new(digital_pins: Vec<u8>, analog_pins: Vec<u8>) -> Self {
        Self {
            digital_pins,
            analog_pins,
        }
    }

    /// Arduino Uno: digital 2–13 free, six analog inputs.
    pub fn uno() -> Self {
        Self::new((2..=13).collect(), (0..=5).collect())
    }

    /// Arduino Nano / Pro Mini: same digital pins, eight analog inputs.
    pub fn nano() -> Self {
        Self::new((2..=13).collect(), (0..=7).collect())
    }

    /// Digital pins free at session start.
    pub fn digital_pins(&self) -> &[u8] {
        &self.digital_pins
    }

    /// Analog pins free at session start.
    pub fn analog_pins(&self) -> &[u8] {
        &self.analog_pins
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self::uno()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn uno_pin_tables() {
        let board = BoardConfig::uno();
        assert_eq!(
            board.digital_pins(),
            &[2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13]
        );
        assert_eq!(board.analog_pins(), &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn nano_has_two_more_analog_inputs() {
        let board = BoardConfig::nano();
        assert_eq!(board.analog_pins().len(), 8);
        assert_eq!(board.digital_pins(), BoardConfig::uno().digital_pins());
    }

    #[test]
    fn custom_board_is_plain_data() {
        let board = BoardConfig::new(vec![3, 4], vec![0]);
        assert_eq!(board.digital_pins(), &[3, 4]);
        assert_eq!(board.analog_pins(), &[0]);
    }
}
