//! transcription-relay binary entry point.
//!
//! Usage:
//!   transcription-relay publish --session-id <uuid> "hello world"
//!   transcription-relay replay
//!   transcription-relay watch --interval-seconds 30
//!   transcription-relay status

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use transcription_outbox::{JsonObject, PublishRequest, PublisherConfig, TranscriptionPublisher};
use uuid::Uuid;

/// Exit code when the event was written to the WAL but not delivered.
const EXIT_BACKLOGGED: u8 = 2;

/// Durable publisher of completed transcriptions to Bloodbank.
#[derive(Parser, Debug)]
#[command(name = "transcription-relay")]
#[command(about = "Publishes completed transcriptions to Bloodbank with a write-ahead log")]
struct Cli {
    /// JSON config file (camelCase keys).
    #[arg(long, global = true, env = "BLOODBANK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Append structured JSONL logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// WAL location, overriding config and environment.
    #[arg(long, global = true)]
    wal_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish one transcription (exit 0 delivered, 2 backlogged).
    Publish(PublishArgs),
    /// Deliver the WAL backlog once and print the report.
    Replay,
    /// Replay on startup and then on every interval until interrupted.
    Watch {
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
        interval_seconds: u64,
    },
    /// Show WAL path, pending entries and bus availability.
    Status,
}

#[derive(Args, Debug)]
struct PublishArgs {
    #[arg(long)]
    session_id: Uuid,

    /// Producing service (defaults to whisperlivekit).
    #[arg(long)]
    source: Option<String>,

    /// Intended consumer, if any.
    #[arg(long)]
    target: Option<String>,

    /// JSON object describing the audio.
    #[arg(long, value_parser = parse_json_object)]
    audio_metadata: Option<JsonObject>,

    /// JSON object with free-form context.
    #[arg(long, value_parser = parse_json_object)]
    context: Option<JsonObject>,

    /// Transcribed text.
    text: String,
}

impl PublishArgs {
    fn into_request(self) -> PublishRequest {
        PublishRequest {
            text: self.text,
            session_id: self.session_id,
            source: self.source,
            target: self.target,
            audio_metadata: self.audio_metadata,
            context: self.context,
        }
    }
}

fn parse_json_object(raw: &str) -> Result<JsonObject, String> {
    match serde_json::from_str(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(err) => Err(format!("invalid JSON: {err}")),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<PublisherConfig> {
    let mut config =
        PublisherConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(wal_path) = &cli.wal_path {
        config.wal_path = wal_path.clone();
        config.validate()?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    observability::init_with_config(observability::LogConfig {
        service_name: "transcription-relay".into(),
        default_level: cli.log_level.clone(),
        log_path: cli.log_file.clone(),
        ..Default::default()
    })
    .context("failed to initialize logging")?;

    let config = load_config(&cli)?;
    info!(
        wal_path = %config.wal_path.display(),
        enable_wal = config.enable_wal,
        max_retries = config.max_retries,
        "Configuration loaded"
    );

    let publisher = TranscriptionPublisher::with_bloodbank_cli(&config);

    match cli.command {
        Command::Publish(args) => publish(&publisher, args).await,
        Command::Replay => replay(&publisher).await,
        Command::Watch { interval_seconds } => {
            watch(&publisher, Duration::from_secs(interval_seconds)).await
        }
        Command::Status => status(&publisher).await,
    }
}

async fn publish(publisher: &TranscriptionPublisher, args: PublishArgs) -> anyhow::Result<ExitCode> {
    if publisher.publish(args.into_request()).await {
        println!("delivered");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("backlogged: {}", publisher.wal_path().display());
        Ok(ExitCode::from(EXIT_BACKLOGGED))
    }
}

async fn replay(publisher: &TranscriptionPublisher) -> anyhow::Result<ExitCode> {
    let report = publisher.replay_report().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

async fn watch(publisher: &TranscriptionPublisher, interval: Duration) -> anyhow::Result<ExitCode> {
    info!(interval_secs = interval.as_secs(), "Watching WAL backlog");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !publisher.reprobe().await {
                    warn!("Bloodbank unavailable, backlog stays in WAL");
                    continue;
                }
                match publisher.replay_report().await {
                    Ok(report) if report.delivered > 0 || report.retained() > 0 => info!(
                        delivered = report.delivered,
                        delivery_failed = report.delivery_failed,
                        corrupt = report.corrupt,
                        "Replay pass finished"
                    ),
                    Ok(_) => {}
                    Err(err) => error!(error = %err, "Replay pass failed"),
                }
            }
            _ = &mut shutdown => {
                info!("Received shutdown signal, exiting...");
                return Ok(ExitCode::SUCCESS);
            }
        }
    }
}

async fn status(publisher: &TranscriptionPublisher) -> anyhow::Result<ExitCode> {
    let pending = publisher.pending_count().await?;
    let available = publisher.reprobe().await;

    println!("wal_path: {}", publisher.wal_path().display());
    println!("pending: {pending}");
    println!(
        "bus: {}",
        if available { "available" } else { "unavailable" }
    );
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_publish_with_metadata() {
        let cli = Cli::try_parse_from([
            "transcription-relay",
            "--wal-path",
            "/tmp/wal.jsonl",
            "publish",
            "--session-id",
            "6f1c0d1e-8a7b-4c4f-9a53-2f0f7f1c2b3a",
            "--source",
            "svc",
            "--audio-metadata",
            r#"{"duration_ms": 1250}"#,
            "Hello world",
        ])
        .unwrap();

        assert_eq!(cli.wal_path, Some(PathBuf::from("/tmp/wal.jsonl")));
        let Command::Publish(args) = cli.command else {
            panic!("expected publish");
        };
        let request = args.into_request();
        assert_eq!(request.text, "Hello world");
        assert_eq!(request.source.as_deref(), Some("svc"));
        assert_eq!(request.audio_metadata.unwrap()["duration_ms"], 1250);
        assert!(request.context.is_none());
    }

    #[test]
    fn rejects_non_object_metadata() {
        let result = Cli::try_parse_from([
            "transcription-relay",
            "publish",
            "--session-id",
            "6f1c0d1e-8a7b-4c4f-9a53-2f0f7f1c2b3a",
            "--context",
            "[1, 2]",
            "text",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_bad_session_id() {
        let result =
            Cli::try_parse_from(["transcription-relay", "publish", "--session-id", "nope", "x"]);
        assert!(result.is_err());
    }

    #[test]
    fn watch_interval_must_be_positive() {
        assert!(Cli::try_parse_from([
            "transcription-relay",
            "watch",
            "--interval-seconds",
            "0"
        ])
        .is_err());

        let cli = Cli::try_parse_from(["transcription-relay", "watch"]).unwrap();
        assert!(matches!(cli.command, Command::Watch { interval_seconds: 30 }));
    }
}
