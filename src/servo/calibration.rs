// Per-servo calibration: pin, initial offset, inversion, enabled flag
//
// Loaded once at startup (stock tables from config.rs, or a JSON file) and
// never mutated afterwards.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{SERVO_INIT_OFFSETS, SERVO_INVERSION, SERVO_PIN_MAP, SERVO_SKIP};

/// Number of servos on the hexapod (6 legs x 3 joints)
pub const SERVO_COUNT: usize = 18;

/// Index of one servo, always in [0, 17]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ServoId(u8);

impl ServoId {
    /// Panics if `index` is not a valid servo index.
    pub const fn new(index: u8) -> Self {
        assert!((index as usize) < SERVO_COUNT, "servo id out of range");
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// All servo ids in ascending order
    pub fn all() -> impl Iterator<Item = ServoId> {
        (0..SERVO_COUNT as u8).map(ServoId)
    }
}

impl TryFrom<u8> for ServoId {
    type Error = CalibrationError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        if (index as usize) < SERVO_COUNT {
            Ok(Self(index))
        } else {
            Err(CalibrationError::ServoOutOfRange(index))
        }
    }
}

impl<'de> Deserialize<'de> for ServoId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        ServoId::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ServoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Motion sense of a servo; serialised as +1 / -1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Inversion {
    Normal,
    Inverted,
}

impl Inversion {
    pub fn sign(self) -> i32 {
        match self {
            Inversion::Normal => 1,
            Inversion::Inverted => -1,
        }
    }
}

impl TryFrom<i8> for Inversion {
    type Error = CalibrationError;

    fn try_from(sign: i8) -> Result<Self, Self::Error> {
        match sign {
            1 => Ok(Inversion::Normal),
            -1 => Ok(Inversion::Inverted),
            other => Err(CalibrationError::InvalidInversion(other)),
        }
    }
}

impl From<Inversion> for i8 {
    fn from(inversion: Inversion) -> Self {
        inversion.sign() as i8
    }
}

/// Sign table used by group moves, indexed by servo id
pub type InversionTable = [Inversion; SERVO_COUNT];

/// Calibration of a single servo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationEntry {
    pub pin: u8,
    pub init_offset: i32,
    pub inversion: Inversion,
    pub enabled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("Calibration table '{table}' has {len} entries, expected {SERVO_COUNT}")]
    TableLength { table: &'static str, len: usize },

    #[error("Invalid inversion sign {0}, expected 1 or -1")]
    InvalidInversion(i8),

    #[error("Servo id {0} out of range")]
    ServoOutOfRange(u8),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid calibration file: {0}")]
    Json(#[from] serde_json::Error),
}

/// The four parallel tables as they appear in a calibration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationTables {
    pub pins: Vec<u8>,
    pub init_offsets: Vec<i32>,
    pub inversion: Vec<Inversion>,
    pub enabled: Vec<bool>,
}

/// Immutable calibration of all 18 servos
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calibration {
    entries: [CalibrationEntry; SERVO_COUNT],
}

impl Calibration {
    pub fn new(entries: [CalibrationEntry; SERVO_COUNT]) -> Self {
        Self { entries }
    }

    /// Build from parallel tables, rejecting any table that does not have exactly 18 entries
    pub fn from_tables(tables: &CalibrationTables) -> Result<Self, CalibrationError> {
        check_len("pins", tables.pins.len())?;
        check_len("init_offsets", tables.init_offsets.len())?;
        check_len("inversion", tables.inversion.len())?;
        check_len("enabled", tables.enabled.len())?;

        let entries = std::array::from_fn(|i| CalibrationEntry {
            pin: tables.pins[i],
            init_offset: tables.init_offsets[i],
            inversion: tables.inversion[i],
            enabled: tables.enabled[i],
        });
        Ok(Self { entries })
    }

    pub fn from_json(json: &str) -> Result<Self, CalibrationError> {
        let tables: CalibrationTables = serde_json::from_str(json)?;
        Self::from_tables(&tables)
    }

    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        info!("Loading calibration from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn get(&self, id: ServoId) -> &CalibrationEntry {
        &self.entries[id.index()]
    }

    pub fn pin(&self, id: ServoId) -> u8 {
        self.get(id).pin
    }

    pub fn init_offset(&self, id: ServoId) -> i32 {
        self.get(id).init_offset
    }

    pub fn inversion(&self, id: ServoId) -> Inversion {
        self.get(id).inversion
    }

    pub fn is_enabled(&self, id: ServoId) -> bool {
        self.get(id).enabled
    }

    /// Calibrated sign of every servo
    pub fn inversion_table(&self) -> InversionTable {
        self.entries.map(|entry| entry.inversion)
    }

    pub fn to_tables(&self) -> CalibrationTables {
        CalibrationTables {
            pins: self.entries.iter().map(|e| e.pin).collect(),
            init_offsets: self.entries.iter().map(|e| e.init_offset).collect(),
            inversion: self.entries.iter().map(|e| e.inversion).collect(),
            enabled: self.entries.iter().map(|e| e.enabled).collect(),
        }
    }
}

impl Default for Calibration {
    /// The stock Antdroid tables from config.rs
    fn default() -> Self {
        let entries = std::array::from_fn(|i| CalibrationEntry {
            pin: SERVO_PIN_MAP[i],
            init_offset: SERVO_INIT_OFFSETS[i],
            inversion: if SERVO_INVERSION[i] < 0 {
                Inversion::Inverted
            } else {
                Inversion::Normal
            },
            enabled: !SERVO_SKIP.contains(&(i as u8)),
        });
        Self { entries }
    }
}

fn check_len(table: &'static str, len: usize) -> Result<(), CalibrationError> {
    if len == SERVO_COUNT {
        Ok(())
    } else {
        Err(CalibrationError::TableLength { table, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables() {
        let cal = Calibration::default();
        assert_eq!(cal.pin(ServoId::new(0)), 22);
        assert_eq!(cal.pin(ServoId::new(17)), 39);
        assert_eq!(cal.init_offset(ServoId::new(1)), 48);
        assert_eq!(cal.inversion(ServoId::new(8)), Inversion::Normal);
        assert_eq!(cal.inversion(ServoId::new(9)), Inversion::Inverted);

        // Only servo 9 is on the skip list
        let disabled: Vec<ServoId> = ServoId::all().filter(|&id| !cal.is_enabled(id)).collect();
        assert_eq!(disabled, vec![ServoId::new(9)]);
    }

    #[test]
    fn test_tables_round_trip_through_json() {
        let cal = Calibration::default();
        let json = serde_json::to_string(&cal.to_tables()).unwrap();
        assert!(json.contains("\"inversion\":[1,1,1,1,1,1,1,1,1,-1"));
        assert_eq!(Calibration::from_json(&json).unwrap(), cal);
    }

    #[test]
    fn test_short_table_rejected() {
        let mut tables = Calibration::default().to_tables();
        tables.init_offsets.pop();

        match Calibration::from_tables(&tables) {
            Err(CalibrationError::TableLength { table, len }) => {
                assert_eq!(table, "init_offsets");
                assert_eq!(len, 17);
            }
            other => panic!("expected length error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_inversion_sign_rejected() {
        let json = r#"{"pins":[],"init_offsets":[],"inversion":[2],"enabled":[]}"#;
        assert!(matches!(
            Calibration::from_json(json),
            Err(CalibrationError::Json(_))
        ));
    }

    #[test]
    fn test_servo_id_bounds() {
        assert!(ServoId::try_from(17).is_ok());
        assert!(matches!(
            ServoId::try_from(18),
            Err(CalibrationError::ServoOutOfRange(18))
        ));
        assert_eq!(ServoId::all().count(), SERVO_COUNT);
    }

    #[test]
    #[should_panic(expected = "servo id out of range")]
    fn test_servo_id_new_panics_out_of_range() {
        let _ = ServoId::new(18);
    }
}
