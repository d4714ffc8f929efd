// Servo layer for the Antdroid hexapod
//
// Provides:
// - Calibration table (pin, initial offset, inversion, enabled) per servo
// - Direct, batched and simulated output backends
// - PWM bridge serial protocol
// - Motion engine (absolute set, interpolated group and single-servo moves)

pub mod backend;
pub mod calibration;
pub mod link;
mod motion;
mod position;

pub use backend::{
    BatchedBackend, DirectBackend, DriverError, ServoBackend, SimulatedBackend, SimulatedMode,
};
pub use calibration::{
    Calibration, CalibrationEntry, CalibrationError, CalibrationTables, Inversion,
    InversionTable, SERVO_COUNT, ServoId,
};
pub use link::ServoLink;
pub use motion::{MotionEngine, POSITION_MAX, POSITION_MIN};
pub use position::PositionStore;
