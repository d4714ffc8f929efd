// Last commanded position of every servo
//
// There is no position feedback from the servos, so this is the only
// record of where they are.

use super::calibration::{SERVO_COUNT, ServoId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionStore {
    positions: [u8; SERVO_COUNT],
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ServoId) -> u8 {
        self.positions[id.index()]
    }

    /// No validation; the motion engine only stores clamped positions
    pub fn set(&mut self, id: ServoId, position: u8) {
        self.positions[id.index()] = position;
    }

    pub fn as_array(&self) -> [u8; SERVO_COUNT] {
        self.positions
    }
}
