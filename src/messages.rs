// Message types exchanged with the runtime over zenoh

use serde::{Deserialize, Serialize};

use crate::gait::Motion;
use crate::servo::{MotionEngine, SERVO_COUNT, ServoBackend, ServoId};

/// Command from teleop/scripts -> runtime
///
/// Single-servo moves without `step_delay_ms` use the engine's default delay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MotionCommand {
    /// Run a named whole-body motion
    Motion { motion: Motion },
    /// Jump a servo to an absolute position
    SetAbsolute { servo: ServoId, position: i32 },
    /// Step a servo to an absolute position
    SmoothSet {
        servo: ServoId,
        position: i32,
        step_delay_ms: Option<u64>,
    },
    /// Step a servo to an offset from its initial position
    RelativeToInitial {
        servo: ServoId,
        offset: i32,
        step_delay_ms: Option<u64>,
    },
    /// Step a servo by an offset from where it is now
    RelativeToSelf {
        servo: ServoId,
        delta: i32,
        step_delay_ms: Option<u64>,
    },
}

/// Commanded absolute position of every servo, published after each command
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServoState {
    pub positions: [u8; SERVO_COUNT],
}

impl<B: ServoBackend> From<&MotionEngine<'_, B>> for ServoState {
    fn from(engine: &MotionEngine<'_, B>) -> Self {
        Self {
            positions: engine.positions().as_array(),
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Idle,
    Moving,
}
