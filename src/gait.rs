// Whole-body motions built from the motion engine primitives
//
// Each motion is a fixed sequence of moves with literal offsets. Nothing is
// remembered between motions: every group move states where it starts.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::servo::{DriverError, MotionEngine, ServoBackend, ServoId};

/// Hip joints, one per leg
pub const COXA_GROUP: [ServoId; 6] = [
    ServoId::new(0),
    ServoId::new(3),
    ServoId::new(6),
    ServoId::new(9),
    ServoId::new(12),
    ServoId::new(15),
];

/// Upper leg joints, one per leg
pub const FEMUR_GROUP: [ServoId; 6] = [
    ServoId::new(1),
    ServoId::new(4),
    ServoId::new(7),
    ServoId::new(10),
    ServoId::new(13),
    ServoId::new(16),
];

/// Lower leg joints, one per leg
pub const TIBIA_GROUP: [ServoId; 6] = [
    ServoId::new(2),
    ServoId::new(5),
    ServoId::new(8),
    ServoId::new(11),
    ServoId::new(14),
    ServoId::new(17),
];

/// Named whole-body motions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Motion {
    /// Swing the outer legs out before standing
    PrepareForStand,
    /// All legs touch the ground; not suitable for standing
    TouchGround,
    /// All legs touch the ground; suitable for standing
    UpTouchGround,
    /// Touch the ground, then push off with the femurs. Coxa positions must already be set.
    PushUpright,
}

impl Motion {
    pub fn run<B: ServoBackend>(self, engine: &mut MotionEngine<'_, B>) -> Result<(), DriverError> {
        info!("Running motion {:?}", self);
        match self {
            Motion::PrepareForStand => prepare_for_stand(engine),
            Motion::TouchGround => touch_ground(engine),
            Motion::UpTouchGround => up_touch_ground(engine),
            Motion::PushUpright => push_upright(engine),
        }
    }
}

/// Move all femurs together between two offsets
pub fn set_femurs<B: ServoBackend>(
    engine: &mut MotionEngine<'_, B>,
    start: i32,
    target: i32,
) -> Result<(), DriverError> {
    let delay = engine.step_delay();
    engine.set_group_relative_to_initial(&FEMUR_GROUP, start, target, delay, None)
}

/// Move all tibias together between two offsets
pub fn set_tibias<B: ServoBackend>(
    engine: &mut MotionEngine<'_, B>,
    start: i32,
    target: i32,
) -> Result<(), DriverError> {
    let delay = engine.step_delay();
    engine.set_group_relative_to_initial(&TIBIA_GROUP, start, target, delay, None)
}

pub fn prepare_for_stand<B: ServoBackend>(
    engine: &mut MotionEngine<'_, B>,
) -> Result<(), DriverError> {
    let delay = engine.step_delay();
    engine.smooth_set(ServoId::new(0), 150, delay)?;
    engine.smooth_set(ServoId::new(6), 100, delay)?;
    engine.smooth_set(ServoId::new(9), 0, delay)?; // skipped by the stock calibration
    engine.smooth_set(ServoId::new(15), 130, delay)
}

pub fn touch_ground<B: ServoBackend>(engine: &mut MotionEngine<'_, B>) -> Result<(), DriverError> {
    set_tibias(engine, 0, 15)?;
    set_femurs(engine, 0, 20)
}

pub fn up_touch_ground<B: ServoBackend>(
    engine: &mut MotionEngine<'_, B>,
) -> Result<(), DriverError> {
    set_tibias(engine, 0, 40)
}

pub fn push_upright<B: ServoBackend>(engine: &mut MotionEngine<'_, B>) -> Result<(), DriverError> {
    up_touch_ground(engine)?;
    set_femurs(engine, 0, 25)
}
