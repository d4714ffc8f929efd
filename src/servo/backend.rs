// Servo output backends
//
// Every backend offers the same two operations: `write` a position for one
// servo and `commit` what has been written. The direct backend puts each
// write on its channel straight away; the batched backend stages writes and
// pushes them all in a single frame on commit.

use std::io::Write;

use tracing::{debug, trace};

use super::calibration::{Calibration, SERVO_COUNT, ServoId};
use super::link::{ServoLink, angle_to_pulse_us};

/// Error types for servo output
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Servo {id} has no attached output")]
    Detached { id: ServoId },
}

pub type Result<T> = std::result::Result<T, DriverError>;

/// Output side of the motion engine
pub trait ServoBackend {
    /// Send an absolute position (degrees, already clamped) to a servo
    fn write(&mut self, id: ServoId, position: u8) -> Result<()>;

    /// Make every write since the previous commit visible on the outputs
    fn commit(&mut self) -> Result<()>;
}

impl<B: ServoBackend + ?Sized> ServoBackend for Box<B> {
    fn write(&mut self, id: ServoId, position: u8) -> Result<()> {
        (**self).write(id, position)
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }
}

/// Output channel of every enabled servo; disabled servos get no handle
fn attach_channels(calibration: &Calibration) -> [Option<u8>; SERVO_COUNT] {
    let mut channels = [None; SERVO_COUNT];
    for id in ServoId::all() {
        if calibration.is_enabled(id) {
            channels[id.index()] = Some(calibration.pin(id));
        }
    }
    channels
}

/// Per-channel backend: each write reaches the hardware immediately
pub struct DirectBackend<W: Write> {
    link: ServoLink<W>,
    channels: [Option<u8>; SERVO_COUNT],
}

impl<W: Write> DirectBackend<W> {
    pub fn attach(link: ServoLink<W>, calibration: &Calibration) -> Self {
        Self {
            link,
            channels: attach_channels(calibration),
        }
    }

    pub fn link(&self) -> &ServoLink<W> {
        &self.link
    }
}

impl<W: Write> ServoBackend for DirectBackend<W> {
    fn write(&mut self, id: ServoId, position: u8) -> Result<()> {
        let channel = self.channels[id.index()].ok_or(DriverError::Detached { id })?;
        trace!("Direct write servo {} (channel {}) -> {}", id, channel, position);
        self.link.write_pulse(channel, angle_to_pulse_us(position))?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
}

/// PWM-controller backend: writes are staged and flushed together on commit
pub struct BatchedBackend<W: Write> {
    link: ServoLink<W>,
    channels: [Option<u8>; SERVO_COUNT],
    staged: [Option<u16>; SERVO_COUNT],
}

impl<W: Write> BatchedBackend<W> {
    pub fn attach(link: ServoLink<W>, calibration: &Calibration) -> Self {
        Self {
            link,
            channels: attach_channels(calibration),
            staged: [None; SERVO_COUNT],
        }
    }

    pub fn link(&self) -> &ServoLink<W> {
        &self.link
    }

    /// Number of servos with a value waiting for the next commit
    pub fn staged_count(&self) -> usize {
        self.staged.iter().filter(|s| s.is_some()).count()
    }
}

impl<W: Write> ServoBackend for BatchedBackend<W> {
    fn write(&mut self, id: ServoId, position: u8) -> Result<()> {
        if self.channels[id.index()].is_none() {
            return Err(DriverError::Detached { id });
        }
        trace!("Stage servo {} -> {}", id, position);
        self.staged[id.index()] = Some(angle_to_pulse_us(position));
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let frame: Vec<(u8, u16)> = self
            .channels
            .iter()
            .zip(self.staged.iter())
            .filter_map(|(&channel, &pulse)| Some((channel?, pulse?)))
            .collect();

        debug!("Committing {} staged channels", frame.len());
        self.link.sync_write_pulses(&frame)?;
        self.staged = [None; SERVO_COUNT];
        Ok(())
    }
}

/// Which update model the simulated backend mimics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedMode {
    Direct,
    Batched,
}

/// In-memory backend used for dry runs and tests
///
/// Keeps the position each output is currently showing: immediately for
/// `Direct`, on commit for `Batched`. Unless built `without_history`, it also
/// records every write and snapshots the outputs at every commit.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    mode: SimulatedMode,
    staged: [Option<u8>; SERVO_COUNT],
    outputs: [Option<u8>; SERVO_COUNT],
    history: bool,
    writes: Vec<(ServoId, u8)>,
    frames: Vec<[Option<u8>; SERVO_COUNT]>,
    commits: usize,
}

impl SimulatedBackend {
    pub fn new(mode: SimulatedMode) -> Self {
        Self {
            mode,
            staged: [None; SERVO_COUNT],
            outputs: [None; SERVO_COUNT],
            history: true,
            writes: Vec::new(),
            frames: Vec::new(),
            commits: 0,
        }
    }

    /// Stop recording writes and frames; for long-running dry runs
    pub fn without_history(mut self) -> Self {
        self.history = false;
        self
    }

    pub fn direct() -> Self {
        Self::new(SimulatedMode::Direct)
    }

    pub fn batched() -> Self {
        Self::new(SimulatedMode::Batched)
    }

    /// Position currently visible on a servo's output, if it was ever driven
    pub fn output(&self, id: ServoId) -> Option<u8> {
        self.outputs[id.index()]
    }

    /// Every write received, in order
    pub fn writes(&self) -> &[(ServoId, u8)] {
        &self.writes
    }

    /// Positions written to one servo, in order
    pub fn writes_to(&self, id: ServoId) -> Vec<u8> {
        self.writes
            .iter()
            .filter(|(w, _)| *w == id)
            .map(|&(_, pos)| pos)
            .collect()
    }

    pub fn commit_count(&self) -> usize {
        self.commits
    }

    /// Outputs as they stood right after each commit
    pub fn frames(&self) -> &[[Option<u8>; SERVO_COUNT]] {
        &self.frames
    }
}

impl ServoBackend for SimulatedBackend {
    fn write(&mut self, id: ServoId, position: u8) -> Result<()> {
        trace!("Simulated write servo {} -> {}", id, position);
        if self.history {
            self.writes.push((id, position));
        }
        match self.mode {
            SimulatedMode::Direct => self.outputs[id.index()] = Some(position),
            SimulatedMode::Batched => self.staged[id.index()] = Some(position),
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        for (output, staged) in self.outputs.iter_mut().zip(self.staged.iter_mut()) {
            if let Some(position) = staged.take() {
                *output = Some(position);
            }
        }
        self.commits += 1;
        if self.history {
            self.frames.push(self.outputs);
        }
        Ok(())
    }
}
