use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use antdroid_runtime::config::{SERVO_PORT, SERVO_WAIT_TIME};
use antdroid_runtime::runtime::{BackendKind, RuntimeOptions};

/// Servo runtime for the Antdroid hexapod
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Servo output backend
    #[arg(long, value_enum, default_value_t = BackendKind::Batched)]
    backend: BackendKind,

    /// Serial port of the PWM bridge
    #[arg(long, default_value = SERVO_PORT)]
    port: String,

    /// JSON calibration file (defaults to the built-in tables)
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Delay between one-degree steps, in milliseconds
    #[arg(long, default_value_t = SERVO_WAIT_TIME.as_millis() as u64)]
    step_delay_ms: u64,

    /// Don't drive the servos to their initial offsets on startup
    #[arg(long)]
    skip_init: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    let options = RuntimeOptions {
        backend: args.backend,
        port: args.port,
        calibration: args.calibration,
        step_delay: Duration::from_millis(args.step_delay_ms),
        skip_init: args.skip_init,
    };

    if let Err(e) = antdroid_runtime::runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
