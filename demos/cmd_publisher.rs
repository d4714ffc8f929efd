// Keyboard console: 1-4 run a motion, Q quits
use antdroid_runtime::config::TOPIC_CMD_MOTION;
use antdroid_runtime::gait::Motion;
use antdroid_runtime::messages::MotionCommand;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::info;

const MOTION_KEYS: [(char, Motion); 4] = [
    ('1', Motion::PrepareForStand),
    ('2', Motion::TouchGround),
    ('3', Motion::UpTouchGround),
    ('4', Motion::PushUpright),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_MOTION).await?;

    for (key, motion) in MOTION_KEYS {
        info!("{} = {:?}", key, motion);
    }
    info!("Q = quit");

    enable_raw_mode()?;
    let result = run_console(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_console(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Char(c) => {
                if let Some(&(_, motion)) = MOTION_KEYS.iter().find(|(key, _)| *key == c) {
                    let cmd = MotionCommand::Motion { motion };
                    info!("Sending {:?}", motion);
                    publisher.put(serde_json::to_string(&cmd)?).await?;
                }
            }
            _ => {}
        }
    }

    Ok(())
}
