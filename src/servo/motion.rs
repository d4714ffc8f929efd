// Motion primitives on top of a servo backend
//
// Absolute set, interpolated group moves in offset space, and smoothed
// single-servo moves in absolute space. Every move is blocking: it returns
// only after all steps have been written and all step delays have elapsed.

use std::time::Duration;

use tracing::{debug, info, trace};

use super::backend::{Result, ServoBackend};
use super::calibration::{Calibration, InversionTable, ServoId};
use super::position::PositionStore;
use crate::config::SERVO_WAIT_TIME;

/// Lowest and highest absolute position a servo can be commanded to
pub const POSITION_MIN: i32 = 0;
pub const POSITION_MAX: i32 = 180;

/// Drives the servos through a backend and remembers where it left them
pub struct MotionEngine<'c, B> {
    calibration: &'c Calibration,
    backend: B,
    positions: PositionStore,
    step_delay: Duration,
}

impl<'c, B: ServoBackend> MotionEngine<'c, B> {
    pub fn new(calibration: &'c Calibration, backend: B) -> Self {
        Self {
            calibration,
            backend,
            positions: PositionStore::new(),
            step_delay: SERVO_WAIT_TIME,
        }
    }

    /// Use a different default step delay
    pub fn with_step_delay(mut self, step_delay: Duration) -> Self {
        self.step_delay = step_delay;
        self
    }

    /// Default delay between steps, used by callers that don't pick their own
    pub fn step_delay(&self) -> Duration {
        self.step_delay
    }

    pub fn set_step_delay(&mut self, step_delay: Duration) {
        self.step_delay = step_delay;
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn positions(&self) -> &PositionStore {
        &self.positions
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Drive every enabled servo to its initial offset, one at a time
    ///
    /// Disabled servos are skipped but still wait out `setup_delay`, so
    /// startup takes the same time regardless of the skip list.
    pub fn initialize(&mut self, setup_delay: Duration) -> Result<()> {
        info!("Initializing servos");

        for id in ServoId::all() {
            let entry = *self.calibration.get(id);
            if entry.enabled {
                debug!("Configuring servo {} on pin {}", id, entry.pin);
                self.set_absolute(id, entry.init_offset, true)?;
            } else {
                debug!("Skipping servo {} configuration for pin {}", id, entry.pin);
            }
            pause(setup_delay);
        }

        info!("Servos initialized");
        Ok(())
    }

    /// Set a servo to an absolute position, clamped to [0, 180]
    ///
    /// Disabled servos are silently left alone. With `flush` false the write
    /// is only staged on batched backends until the next commit.
    pub fn set_absolute(&mut self, id: ServoId, position: i32, flush: bool) -> Result<()> {
        trace!("set_absolute({}, {})", id, position);

        if !self.calibration.is_enabled(id) {
            return Ok(());
        }

        let clamped = position.clamp(POSITION_MIN, POSITION_MAX) as u8;
        self.backend.write(id, clamped)?;
        self.positions.set(id, clamped);

        if flush {
            self.backend.commit()?;
        }
        Ok(())
    }

    /// Last commanded absolute position
    pub fn position_absolute(&self, id: ServoId) -> u8 {
        self.positions.get(id)
    }

    /// Last commanded position as an offset from the servo's initial position
    ///
    /// Only meaningful if the stored position was itself produced from an
    /// offset without clamping.
    pub fn position_relative_initial(&self, id: ServoId) -> i32 {
        let absolute = self.positions.get(id) as i64;
        let entry = self.calibration.get(id);
        let offset = (absolute - entry.init_offset as i64) / entry.inversion.sign() as i64;
        offset.clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }

    /// Move a group of servos in lock-step from `start` to `target`, both
    /// offsets from each servo's initial position
    ///
    /// One degree per step, both ends included. All servos of a step are
    /// committed together, then the move waits `step_delay`. If `start` equals
    /// `target` exactly one step is made. `inversion_override` replaces the
    /// calibrated signs for this move only.
    pub fn set_group_relative_to_initial(
        &mut self,
        servos: &[ServoId],
        start: i32,
        target: i32,
        step_delay: Duration,
        inversion_override: Option<&InversionTable>,
    ) -> Result<()> {
        debug!(
            "Group move {:?}: offset {} -> {} ({:?}/step)",
            servos, start, target, step_delay
        );

        let inversion = match inversion_override {
            Some(table) => *table,
            None => self.calibration.inversion_table(),
        };

        for offset in steps(start, target) {
            for &id in servos {
                let absolute = offset_to_absolute(
                    self.calibration.init_offset(id),
                    offset,
                    inversion[id.index()].sign(),
                );
                self.set_absolute(id, absolute, false)?;
            }
            self.backend.commit()?;
            pause(step_delay);
        }
        Ok(())
    }

    /// Move one servo from where it is to `target`, an offset from its initial position
    pub fn set_single_relative_to_initial(
        &mut self,
        id: ServoId,
        target: i32,
        step_delay: Duration,
    ) -> Result<()> {
        debug!("set_single_relative_to_initial({}, {}, {:?})", id, target, step_delay);

        let current = self.position_relative_initial(id);
        self.set_group_relative_to_initial(&[id], current, target, step_delay, None)
    }

    /// Move one servo `delta` degrees (in offset space) from where it is
    pub fn set_single_relative_to_self(
        &mut self,
        id: ServoId,
        delta: i32,
        step_delay: Duration,
    ) -> Result<()> {
        debug!("set_single_relative_to_self({}, {}, {:?})", id, delta, step_delay);

        let current = self.position_relative_initial(id);
        let target = current.saturating_add(delta);
        self.set_group_relative_to_initial(&[id], current, target, step_delay, None)
    }

    /// Step one servo in absolute space from its current position to `target`,
    /// committing every step
    pub fn smooth_set(&mut self, id: ServoId, target: i32, step_delay: Duration) -> Result<()> {
        if !self.calibration.is_enabled(id) {
            return Ok(());
        }
        debug!("smooth_set({}, {}, {:?})", id, target, step_delay);

        let current = self.positions.get(id) as i32;
        for position in steps(current, target) {
            self.set_absolute(id, position, true)?;
            pause(step_delay);
        }
        Ok(())
    }
}

/// Absolute position for an offset, clamped to the servo range
fn offset_to_absolute(init_offset: i32, offset: i32, sign: i32) -> i32 {
    let absolute = init_offset as i64 + offset as i64 * sign as i64;
    absolute.clamp(POSITION_MIN as i64, POSITION_MAX as i64) as i32
}

/// Integer positions from `start` to `target`, both included, one apart
///
/// Ascending when `target > start`, descending otherwise; a single value
/// when they are equal.
fn steps(start: i32, target: i32) -> Box<dyn Iterator<Item = i32>> {
    if target > start {
        Box::new(start..=target)
    } else {
        Box::new((target..=start).rev())
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servo::backend::SimulatedBackend;
    use crate::servo::calibration::{CalibrationEntry, Inversion};

    /// Every servo enabled at offset 90, right side inverted
    fn fixture() -> Calibration {
        Calibration::new(std::array::from_fn(|i| CalibrationEntry {
            pin: i as u8,
            init_offset: 90,
            inversion: if i < 9 {
                Inversion::Normal
            } else {
                Inversion::Inverted
            },
            enabled: true,
        }))
    }

    fn engine(cal: &Calibration) -> MotionEngine<'_, SimulatedBackend> {
        MotionEngine::new(cal, SimulatedBackend::batched()).with_step_delay(Duration::ZERO)
    }

    #[test]
    fn test_steps() {
        assert_eq!(steps(0, 3).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(steps(3, 0).collect::<Vec<_>>(), vec![3, 2, 1, 0]);
        assert_eq!(steps(-2, -4).collect::<Vec<_>>(), vec![-2, -3, -4]);
        assert_eq!(steps(5, 5).collect::<Vec<_>>(), vec![5]);
        assert_eq!(
            steps(i32::MAX - 1, i32::MAX).collect::<Vec<_>>(),
            vec![i32::MAX - 1, i32::MAX]
        );
        assert_eq!(
            steps(i32::MIN + 1, i32::MIN).collect::<Vec<_>>(),
            vec![i32::MIN + 1, i32::MIN]
        );
        assert_eq!(steps(i32::MIN, i32::MIN).count(), 1);
    }

    #[test]
    fn test_offset_to_absolute_saturates() {
        assert_eq!(offset_to_absolute(90, 10, 1), 100);
        assert_eq!(offset_to_absolute(90, 10, -1), 80);
        assert_eq!(offset_to_absolute(90, i32::MAX, 1), 180);
        assert_eq!(offset_to_absolute(90, i32::MAX, -1), 0);
        assert_eq!(offset_to_absolute(90, i32::MIN, 1), 0);
        assert_eq!(offset_to_absolute(90, i32::MIN, -1), 180);
        assert_eq!(offset_to_absolute(i32::MAX, i32::MAX, 1), 180);
    }

    #[test]
    fn test_group_move_at_offset_extremes() {
        let cal = fixture();
        let mut engine = engine(&cal);
        let normal = ServoId::new(1);
        let inverted = ServoId::new(10);

        for (start, target, normal_pos, inverted_pos) in [
            (i32::MAX - 2, i32::MAX, 180, 0),
            (i32::MIN + 2, i32::MIN, 0, 180),
            (i32::MAX, i32::MAX, 180, 0),
            (i32::MIN, i32::MIN, 0, 180),
        ] {
            let commits = engine.backend().commit_count();
            engine
                .set_group_relative_to_initial(
                    &[normal, inverted],
                    start,
                    target,
                    Duration::ZERO,
                    None,
                )
                .unwrap();

            let expected_steps = (start as i64 - target as i64).unsigned_abs() as usize + 1;
            assert_eq!(engine.backend().commit_count() - commits, expected_steps);
            assert_eq!(engine.position_absolute(normal), normal_pos);
            assert_eq!(engine.position_absolute(inverted), inverted_pos);
        }
    }

    #[test]
    fn test_set_absolute_without_flush_stays_staged() {
        let cal = fixture();
        let mut engine = engine(&cal);
        let id = ServoId::new(0);

        engine.set_absolute(id, 30, false).unwrap();
        assert_eq!(engine.position_absolute(id), 30);
        assert_eq!(engine.backend().output(id), None);
        assert_eq!(engine.backend().commit_count(), 0);

        engine.set_absolute(id, 31, true).unwrap();
        assert_eq!(engine.backend().output(id), Some(31));
        assert_eq!(engine.backend().commit_count(), 1);
    }

    #[test]
    fn test_group_steps_are_committed_together() {
        let cal = fixture();
        let mut engine = engine(&cal);
        let left = ServoId::new(1);
        let right = ServoId::new(10);

        engine
            .set_group_relative_to_initial(&[left, right], 0, 2, Duration::ZERO, None)
            .unwrap();

        let frames = engine.backend().frames();
        assert_eq!(frames.len(), 3);
        for (s, frame) in frames.iter().enumerate() {
            let s = s as u8;
            assert_eq!(frame[left.index()], Some(90 + s));
            assert_eq!(frame[right.index()], Some(90 - s));
        }
    }

    #[test]
    fn test_group_inversion_override() {
        let cal = fixture();
        let mut engine = engine(&cal);
        let id = ServoId::new(10);

        let mut signs = cal.inversion_table();
        signs[id.index()] = Inversion::Normal;

        engine
            .set_group_relative_to_initial(&[id], 0, 5, Duration::ZERO, Some(&signs))
            .unwrap();
        assert_eq!(engine.position_absolute(id), 95);

        // Calibration is untouched by the override
        engine
            .set_group_relative_to_initial(&[id], 0, 5, Duration::ZERO, None)
            .unwrap();
        assert_eq!(engine.position_absolute(id), 85);
    }

    #[test]
    fn test_group_skips_disabled_members() {
        let mut tables = fixture().to_tables();
        tables.enabled[4] = false;
        let cal = Calibration::from_tables(&tables).unwrap();
        let mut engine = engine(&cal);

        engine
            .set_group_relative_to_initial(
                &[ServoId::new(1), ServoId::new(4)],
                0,
                3,
                Duration::ZERO,
                None,
            )
            .unwrap();

        assert_eq!(engine.backend().commit_count(), 4);
        assert!(engine.backend().writes_to(ServoId::new(4)).is_empty());
        assert_eq!(engine.position_absolute(ServoId::new(4)), 0);
        assert_eq!(engine.position_absolute(ServoId::new(1)), 93);
    }

    #[test]
    fn test_relative_initial_both_signs() {
        let cal = fixture();
        let mut engine = engine(&cal);
        let normal = ServoId::new(2);
        let inverted = ServoId::new(11);

        for offset in [-30, -1, 0, 1, 45] {
            engine
                .set_group_relative_to_initial(
                    &[normal, inverted],
                    offset,
                    offset,
                    Duration::ZERO,
                    None,
                )
                .unwrap();
            assert_eq!(engine.position_relative_initial(normal), offset);
            assert_eq!(engine.position_relative_initial(inverted), offset);
        }
    }

    #[test]
    fn test_smooth_set_steps_in_absolute_space() {
        let cal = fixture();
        let mut engine = engine(&cal);
        let id = ServoId::new(11); // inverted, which smooth_set ignores

        engine.set_absolute(id, 100, true).unwrap();
        engine.smooth_set(id, 96, Duration::ZERO).unwrap();

        assert_eq!(
            engine.backend().writes_to(id),
            vec![100, 100, 99, 98, 97, 96]
        );
        // One commit for the initial set, one per step
        assert_eq!(engine.backend().commit_count(), 6);
    }

    #[test]
    fn test_smooth_set_past_limit_repeats_bound() {
        let cal = fixture();
        let mut engine = engine(&cal);
        let id = ServoId::new(0);

        engine.set_absolute(id, 178, true).unwrap();
        engine.smooth_set(id, 181, Duration::ZERO).unwrap();

        assert_eq!(engine.backend().writes_to(id), vec![178, 178, 179, 180, 180]);
        assert_eq!(engine.position_absolute(id), 180);
    }

    #[test]
    fn test_smooth_set_disabled_is_noop() {
        let cal = Calibration::default();
        let mut engine = engine(&cal);

        engine.smooth_set(ServoId::new(9), 0, Duration::ZERO).unwrap();
        assert!(engine.backend().writes().is_empty());
        assert_eq!(engine.backend().commit_count(), 0);
    }

    #[test]
    fn test_initialize_drives_enabled_servos_to_offsets() {
        let cal = Calibration::default();
        let mut engine = engine(&cal);

        engine.initialize(Duration::ZERO).unwrap();

        for id in ServoId::all() {
            if cal.is_enabled(id) {
                assert_eq!(engine.backend().output(id), Some(cal.init_offset(id) as u8));
                assert_eq!(engine.position_relative_initial(id), 0);
            } else {
                assert_eq!(engine.backend().output(id), None);
            }
        }
        // One commit per enabled servo
        assert_eq!(engine.backend().commit_count(), 17);
    }

    #[test]
    fn test_default_step_delay() {
        let cal = fixture();
        let mut engine = MotionEngine::new(&cal, SimulatedBackend::direct());
        assert_eq!(engine.step_delay(), SERVO_WAIT_TIME);

        engine.set_step_delay(Duration::from_millis(5));
        assert_eq!(engine.step_delay(), Duration::from_millis(5));
    }
}
