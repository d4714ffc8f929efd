// 50 Hz command loop in front of a blocking motion thread
//
// Motions block for as long as they take to step through, so they run on
// their own thread. The async loop only forwards commands, drops the ones
// that arrive while a motion is in flight, and publishes state.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, warn};

use crate::config::{LOOP_HZ, SERVO_SETUP_DELAY, TOPIC_CMD_MOTION, TOPIC_HEALTH, TOPIC_STATE_SERVOS};
use crate::messages::{MotionCommand, RuntimeHealth, ServoState};
use crate::servo::{
    BatchedBackend, Calibration, DirectBackend, DriverError, MotionEngine, ServoBackend,
    ServoLink, SimulatedBackend,
};

/// Which output backend drives the servos
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    /// One serial packet per servo write
    Direct,
    /// Writes staged and sent as one frame per commit
    Batched,
    /// No hardware, positions are only logged
    Sim,
}

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub backend: BackendKind,
    pub port: String,
    pub calibration: Option<PathBuf>,
    pub step_delay: Duration,
    pub skip_init: bool,
}

/// Open the selected backend, attaching a channel for every enabled servo
pub fn open_backend(
    kind: BackendKind,
    port: &str,
    calibration: &Calibration,
) -> Result<Box<dyn ServoBackend + Send>, DriverError> {
    info!("Using {:?} servo backend", kind);
    let backend: Box<dyn ServoBackend + Send> = match kind {
        BackendKind::Direct => {
            info!("Opening PWM bridge on {}", port);
            Box::new(DirectBackend::attach(ServoLink::open(port)?, calibration))
        }
        BackendKind::Batched => {
            info!("Opening PWM bridge on {}", port);
            Box::new(BatchedBackend::attach(ServoLink::open(port)?, calibration))
        }
        BackendKind::Sim => Box::new(SimulatedBackend::batched().without_history()),
    };
    Ok(backend)
}

/// Carry out one command, blocking until the move is complete
pub fn execute<B: ServoBackend>(
    engine: &mut MotionEngine<'_, B>,
    cmd: &MotionCommand,
) -> Result<(), DriverError> {
    let default_delay = engine.step_delay();
    let delay = |ms: Option<u64>| ms.map(Duration::from_millis).unwrap_or(default_delay);

    match *cmd {
        MotionCommand::Motion { motion } => motion.run(engine),
        MotionCommand::SetAbsolute { servo, position } => {
            engine.set_absolute(servo, position, true)
        }
        MotionCommand::SmoothSet {
            servo,
            position,
            step_delay_ms,
        } => engine.smooth_set(servo, position, delay(step_delay_ms)),
        MotionCommand::RelativeToInitial {
            servo,
            offset,
            step_delay_ms,
        } => engine.set_single_relative_to_initial(servo, offset, delay(step_delay_ms)),
        MotionCommand::RelativeToSelf {
            servo,
            delta,
            step_delay_ms,
        } => engine.set_single_relative_to_self(servo, delta, delay(step_delay_ms)),
    }
}

/// Start the thread that owns the calibration, backend and motion engine
///
/// The thread reports a `ServoState` after initialization and after every
/// command, and exits once the command sender is dropped.
pub fn spawn_motion_thread<B: ServoBackend + Send + 'static>(
    calibration: Calibration,
    backend: B,
    step_delay: Duration,
    skip_init: bool,
) -> (Sender<MotionCommand>, Receiver<ServoState>, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<MotionCommand>();
    let (state_tx, state_rx) = mpsc::channel::<ServoState>();

    let handle = std::thread::spawn(move || {
        let mut engine = MotionEngine::new(&calibration, backend).with_step_delay(step_delay);

        if skip_init {
            info!("Skipping servo initialization");
        } else if let Err(e) = engine.initialize(SERVO_SETUP_DELAY) {
            error!("Servo initialization failed: {}", e);
        }
        if state_tx.send(ServoState::from(&engine)).is_err() {
            return;
        }

        while let Ok(cmd) = cmd_rx.recv() {
            if let Err(e) = execute(&mut engine, &cmd) {
                error!("Command {:?} failed: {}", cmd, e);
            }
            if state_tx.send(ServoState::from(&engine)).is_err() {
                break;
            }
        }
        info!("Motion thread stopped");
    });

    (cmd_tx, state_rx, handle)
}

pub struct Runtime {
    commands: Sender<MotionCommand>,
    states: Receiver<ServoState>,
    health: RuntimeHealth,
    motion_thread_alive: bool,
}

impl Runtime {
    /// Starts out `Moving` until the motion thread reports initialization done
    pub fn new(commands: Sender<MotionCommand>, states: Receiver<ServoState>) -> Self {
        Self {
            commands,
            states,
            health: RuntimeHealth::Moving,
            motion_thread_alive: true,
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn motion_thread_alive(&self) -> bool {
        self.motion_thread_alive
    }

    /// Hand a command to the motion thread, unless one is already running
    pub fn on_command(&mut self, cmd: MotionCommand) -> bool {
        if self.health == RuntimeHealth::Moving {
            warn!("Motion in progress, dropping command: {:?}", cmd);
            return false;
        }

        info!("Received command: {:?}", cmd);
        if self.commands.send(cmd).is_err() {
            self.motion_thread_alive = false;
            return false;
        }
        self.health = RuntimeHealth::Moving;
        true
    }

    /// Collect finished motions, returning the most recent servo state
    pub fn poll_states(&mut self) -> Option<ServoState> {
        let mut latest = None;
        loop {
            match self.states.try_recv() {
                Ok(state) => {
                    self.health = RuntimeHealth::Idle;
                    latest = Some(state);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.motion_thread_alive = false;
                    break;
                }
            }
        }
        latest
    }
}

pub async fn run(options: RuntimeOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let calibration = match &options.calibration {
        Some(path) => Calibration::load(path)?,
        None => Calibration::default(),
    };
    let backend = open_backend(options.backend, &options.port, &calibration)?;
    let (cmd_tx, state_rx, _motion_thread) =
        spawn_motion_thread(calibration, backend, options.step_delay, options.skip_init);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_MOTION).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE_SERVOS).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(cmd_tx, state_rx);
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms per step",
        LOOP_HZ,
        options.step_delay.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_MOTION);
    info!("Publishing to: {}, {}", TOPIC_STATE_SERVOS, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking)
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<MotionCommand>(&payload) {
                Ok(cmd) => {
                    runtime.on_command(cmd);
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Publish servo state once a motion has finished
        if let Some(state) = runtime.poll_states() {
            let state_json = serde_json::to_string(&state)?;
            pub_state.put(state_json).await?;
        }

        if !runtime.motion_thread_alive() {
            return Err("Motion thread stopped unexpectedly".into());
        }

        // 3. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}
