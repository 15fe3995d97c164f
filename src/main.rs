// Relay a WAV recording to a conversation server
//
// Plays the input file through a recording session in batch or streaming mode:
// 1. Start recording from the WAV file (paced in real time)
// 2. Stop after --duration seconds (or when the file ends)
// 3. Batch: submit the reviewed recording / Streaming: wait for the verdict
// 4. Follow `continue` directives for up to --rounds recordings
//
// Usage: voice-relay --input tests/fixtures/hello.wav --mode streaming --duration 5

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{info, Level};

use voice_relay::{
    BatchUploader, Config, RecordingSession, SessionCommand, SessionSnapshot, SessionState,
    StreamingChannel, TransportClient, TransportMode, WavFileSource,
};

#[derive(Parser)]
#[command(name = "voice-relay")]
#[command(about = "Relay recorded speech to a conversation server")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/voice-relay")]
    config: String,

    /// WAV file used as the audio source
    #[arg(short, long)]
    input: PathBuf,

    /// Transport mode, overrides the configuration (batch | streaming)
    #[arg(short, long)]
    mode: Option<TransportMode>,

    /// Seconds to record before stopping
    #[arg(short, long, default_value = "5")]
    duration: u64,

    /// Maximum recordings to make while the server asks for more
    #[arg(short, long, default_value = "3")]
    rounds: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;
    let mode = args.mode.unwrap_or(cfg.recording.mode);

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Transport mode: {}", mode);

    let source = WavFileSource::open(&args.input, cfg.chunk_duration())
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let wav = source.info();
    info!(
        "Input: {} ({:.1}s, {} Hz, {} channel(s))",
        args.input.display(),
        wav.duration_seconds,
        wav.sample_rate,
        wav.channels
    );

    let transport: Box<dyn TransportClient> = match mode {
        TransportMode::Batch => {
            let uploader = BatchUploader::new(cfg.batch_config())?;
            info!("Uploading recordings to {}", uploader.endpoint());
            Box::new(uploader)
        }
        TransportMode::Streaming => {
            let channel = StreamingChannel::websocket(cfg.streaming_config());
            channel
                .connect()
                .await
                .with_context(|| format!("Failed to connect to {}", channel.url()))?;
            info!("Streaming to {}", channel.url());
            Box::new(channel)
        }
    };

    let mut session = RecordingSession::new(cfg.session_config(), Box::new(source), transport);

    let (commands, rx) = mpsc::channel(8);
    let driver = tokio::spawn(drive(session.observe(), commands, args.duration, args.rounds));

    session.run(rx).await;
    driver.abort();

    let outcome = session.snapshot();
    session.close().await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if outcome.state == SessionState::Error {
        bail!("Session ended in error: {:?}", outcome.fault);
    }
    Ok(())
}

/// Issue commands in reaction to session snapshots
async fn drive(
    mut snapshots: watch::Receiver<SessionSnapshot>,
    commands: mpsc::Sender<SessionCommand>,
    duration: u64,
    rounds: u32,
) {
    if commands.send(SessionCommand::Start).await.is_err() {
        return;
    }

    let mut round = 1;
    let mut last_state = None;

    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        let state_changed = last_state.replace(snapshot.state) != Some(snapshot.state);

        let command = match snapshot.state {
            SessionState::Recording => {
                (snapshot.elapsed_seconds >= duration).then_some(SessionCommand::Stop)
            }
            // Recording could not be started
            SessionState::Idle | SessionState::AutoPending if snapshot.fault.is_some() => {
                Some(SessionCommand::Shutdown)
            }
            SessionState::Idle => None,
            _ if !state_changed => None,
            SessionState::Reviewing => Some(SessionCommand::Submit),
            SessionState::AutoPending if round < rounds => {
                round += 1;
                info!("Server asked for more, starting recording {}/{}", round, rounds);
                Some(SessionCommand::Start)
            }
            SessionState::AutoPending => Some(SessionCommand::Shutdown),
            state if state.is_terminal() => Some(SessionCommand::Shutdown),
            _ => None,
        };

        if let Some(command) = command {
            if commands.send(command).await.is_err() {
                break;
            }
        }
    }
}
