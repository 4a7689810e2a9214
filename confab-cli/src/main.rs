//! Confab terminal front-end.
//!
//! A deliberately thin render layer: it subscribes to the engine's event
//! channels and prints, and forwards typed lines as one-shot text messages.
//! All session/audio logic lives in `confab-core`.

mod settings;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use confab_core::capture::device::list_input_devices;
use confab_core::{
    ConfabError, Engine, Role, SessionStatus, StatusEvent, TranscriptEvent, Turn, TurnEvent,
};
use settings::{default_settings_path, load_settings};

const HELP: &str = "\
commands:
  /voice     start a voice session
  /stop      end the voice session
  /devices   list audio input devices
  /clear     erase conversation history
  /quit      exit
anything else is sent as a text message";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("confab_core=warn,confab_cli=warn")),
        )
        .init();

    let settings_path = default_settings_path();
    let settings = load_settings(&settings_path);
    let config = settings.session_config().map_err(|e| {
        anyhow::anyhow!("{e} (settings file: {})", settings_path.display())
    })?;

    let engine = Arc::new(Engine::new(config));

    println!("confab — type a message, or /help for commands");
    for turn in engine.history() {
        print_turn(&turn);
    }

    spawn_printers(&engine);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "/help" => println!("{HELP}"),
            "/voice" => {
                if let Err(e) = engine.start_session().await {
                    println!("! could not start voice session: {e}");
                }
            }
            "/stop" => engine.stop_session(),
            "/devices" => {
                for d in list_input_devices() {
                    println!(
                        "  {}{}",
                        d.name,
                        if d.is_default { "  (default)" } else { "" }
                    );
                }
            }
            "/clear" => {
                engine.clear_history();
                println!("history cleared");
            }
            "/quit" => break,
            message => match engine.send_text(message).await {
                Ok(()) => {}
                Err(ConfabError::RequestInFlight) => {
                    println!("! still waiting on the previous reply");
                }
                Err(e) => warn!("send failed: {e}"),
            },
        }
    }

    engine.stop_session();
    Ok(())
}

fn spawn_printers(engine: &Arc<Engine>) {
    let mut status_rx = engine.subscribe_status();
    tokio::spawn(async move {
        while let Ok(StatusEvent { status, detail }) = status_rx.recv().await {
            let label = match status {
                SessionStatus::Idle => "idle",
                SessionStatus::Connecting => "connecting…",
                SessionStatus::Active => "voice session active",
                SessionStatus::Offline => "offline",
                SessionStatus::AccessDenied => "access denied",
            };
            match detail {
                Some(detail) => println!("[{label}] {detail}"),
                None => println!("[{label}]"),
            }
        }
    });

    let mut transcript_rx = engine.subscribe_transcripts();
    tokio::spawn(async move {
        while let Ok(TranscriptEvent { channel, text }) = transcript_rx.recv().await {
            if !text.is_empty() {
                println!("  ({channel:?}) {text}");
            }
        }
    });

    let mut turn_rx = engine.subscribe_turns();
    tokio::spawn(async move {
        while let Ok(TurnEvent { turn }) = turn_rx.recv().await {
            print_turn(&turn);
        }
    });
}

fn print_turn(turn: &Turn) {
    let who = match turn.role {
        Role::User => "you",
        Role::Agent => "agent",
    };
    println!("{who}> {}", turn.text);
}
