// Timing, topics, serial defaults and the stock calibration tables
use std::time::Duration;

// Delay between each one-degree step of an interpolated move
pub const SERVO_WAIT_TIME: Duration = Duration::from_millis(40);

// Delay between bringing up each servo during initialization
pub const SERVO_SETUP_DELAY: Duration = Duration::from_millis(200);

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Zenoh topics
pub const TOPIC_CMD_MOTION: &str = "antdroid/cmd/motion"; // commands
pub const TOPIC_STATE_SERVOS: &str = "antdroid/state/servos"; // commanded positions
pub const TOPIC_HEALTH: &str = "antdroid/state/health"; // idle / moving

// Serial port of the PWM bridge
pub const SERVO_PORT: &str = "/dev/ttyACM0";

// Servo pulse width range in microseconds (0 and 180 degrees)
pub const PULSE_MIN_US: u16 = 500;
pub const PULSE_MAX_US: u16 = 2500;

/// Output pin of every servo, ordered front/middle/back, left then right,
/// coxa/femur/tibia within a leg.
pub const SERVO_PIN_MAP: [u8; 18] = [
    22, 23, 24, // front  left
    25, 26, 27, // middle left
    28, 29, 30, // back   left
    31, 32, 33, // front  right
    34, 35, 36, // middle right
    37, 38, 39, // back   right
];

/// Position (degrees) each servo is driven to at startup; the zero point of relative moves
pub const SERVO_INIT_OFFSETS: [i32; 18] = [
    90, 48, 77, // front  left
    127, 52, 115, // middle left
    130, 10, 100, // back   left
    90, 155, 65, // front  right, coxa is miscalibrated (see SERVO_SKIP)
    123, 180, 98, // middle right
    95, 180, 95, // back   right
];

/// Right-hand servos are mounted mirrored
pub const SERVO_INVERSION: [i8; 18] = [
    1, 1, 1, 1, 1, 1, 1, 1, 1, // left
    -1, -1, -1, -1, -1, -1, -1, -1, -1, // right
];

/// Servos that are never driven. 9 always heads to 0 regardless of the commanded position.
pub const SERVO_SKIP: [u8; 1] = [9];
