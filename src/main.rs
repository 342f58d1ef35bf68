//! ASL Command Center: command-line front end.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::sync::broadcast::error::RecvError;

use aslcc_lib::app::{self, App, AppOptions};
use aslcc_lib::events::{EventBus, UiEvent};
use aslcc_lib::settings::{self, Settings};
use aslcc_lib::signs::{parse_response, SeenSigns};
use aslcc_lib::store::SessionStore;
use aslcc_lib::training::TrainingLog;

#[derive(Parser, Debug)]
#[command(name = "aslcc")]
#[command(about = "Recognise ASL signs from camera frames and turn them into commands")]
#[command(version)]
struct Args {
    /// Settings file (TOML)
    #[arg(short, long, env = "ASLCC_CONFIG")]
    config: Option<PathBuf>,

    /// Milliseconds between scans (overrides the settings file)
    #[arg(long, env = "ASLCC_INTERVAL_MS")]
    interval_ms: Option<u64>,

    /// Keep sessions in memory instead of syncing through the relay
    #[arg(long)]
    no_relay: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan continuously; type start / stop / status / quit on stdin
    Run {
        /// Wait for `start` instead of scanning right away
        #[arg(long)]
        paused: bool,
    },
    /// Parse a model reply from FILE (or stdin) and print the signs found
    Parse { file: Option<PathBuf> },
    /// Check the recognition server, ASL server, robot and relay
    Probe,
    /// List recent sessions, or the signs of one session
    History {
        session_id: Option<String>,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Manage collected training data
    Training {
        #[command(subcommand)]
        action: TrainingAction,
    },
}

#[derive(Subcommand, Debug)]
enum TrainingAction {
    /// Number of samples collected
    Stats,
    /// Write all samples to FILE as JSON
    Export { file: PathBuf },
    /// Delete all samples
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(settings::default_path);
    let mut settings = Settings::load(&config_path)
        .with_context(|| format!("Failed to load settings from {}", config_path.display()))?;
    settings.apply_env();

    let options = AppOptions {
        no_relay: args.no_relay,
        interval_ms: args.interval_ms,
    };

    match args.command.unwrap_or(Command::Run { paused: false }) {
        Command::Run { paused } => run(settings, options, paused).await,
        Command::Parse { file } => parse(file).await,
        Command::Probe => probe(&settings).await,
        Command::History { session_id, limit } => history(&settings, &options, session_id, limit).await,
        Command::Training { action } => training(&settings, &options, action).await,
    }
}

async fn run(settings: Settings, options: AppOptions, paused: bool) -> Result<()> {
    let app = App::build(settings, options)
        .await
        .context("Failed to start")?;
    let printer = tokio::spawn(print_events(app.events.clone()));
    app.announce();

    if !paused {
        app.controller.start().await;
    }

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let served = app
        .serve_console(BufReader::new(tokio::io::stdin()), interrupt)
        .await
        .context("Failed to read stdin");

    app.shutdown().await;
    printer.abort();
    served
}

async fn print_events(events: EventBus) {
    let mut rx = events.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => print_event(&event),
            Err(RecvError::Lagged(n)) => log::warn!("Dropped {} UI events", n),
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &UiEvent) {
    match event {
        UiEvent::Status { kind, message } => log::debug!("[{kind:?}] {message}"),
        UiEvent::RawOutput { text, fallback } => {
            log::debug!("raw output{}: {}", if *fallback { " (fallback)" } else { "" }, text)
        }
        UiEvent::SignsRecognized { signs, .. } => {
            for sign in signs {
                println!("sign: {} [{}] {}", sign.name, sign.confidence, sign.description);
            }
        }
        UiEvent::Notification { level, message, .. } => println!("({level:?}) {message}"),
        UiEvent::SessionStarted { session_id } => println!("session {session_id} started"),
        UiEvent::SessionEnded {
            session_id,
            item_count,
        } => println!("session {session_id} ended, {item_count} signs"),
    }
}

async fn parse(file: Option<PathBuf>) -> Result<()> {
    let text = match file {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::AsyncReadExt::read_to_string(&mut tokio::io::stdin(), &mut buf)
                .await
                .context("Failed to read stdin")?;
            buf
        }
    };
    let summary = parse_response(&text, &mut SeenSigns::new());
    if summary.signs.is_empty() {
        println!("no signs");
    }
    for sign in &summary.signs {
        println!("{}\t{}\t{}", sign.name, sign.confidence, sign.description);
    }
    Ok(())
}

async fn probe(settings: &Settings) -> Result<()> {
    for health in app::probe_services(settings).await {
        println!(
            "{:<12} {:<40} {}",
            health.name,
            health.url,
            if health.available { "ok" } else { "unavailable" }
        );
    }
    Ok(())
}

async fn history(
    settings: &Settings,
    options: &AppOptions,
    session_id: Option<String>,
    limit: usize,
) -> Result<()> {
    let (store, relay) = app::connect_store(settings, options.no_relay).await;
    let result = print_history(&store, session_id, limit).await;
    if let Some(relay) = relay {
        relay.close().await;
    }
    result
}

async fn print_history(store: &SessionStore, session_id: Option<String>, limit: usize) -> Result<()> {
    match session_id {
        Some(id) => {
            let signs = store
                .session_signs(&id)
                .await
                .with_context(|| format!("Failed to read signs of {id}"))?;
            if signs.is_empty() {
                println!("no signs recorded for {id}");
            }
            for sign in signs {
                let at = chrono::DateTime::from_timestamp_millis(sign.timestamp)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default();
                println!("{at}  {} [{}] {}", sign.name, sign.confidence, sign.description);
            }
        }
        None => {
            let sessions = store
                .recent_sessions(limit)
                .await
                .context("Failed to read sessions")?;
            if sessions.is_empty() {
                println!("no sessions");
            }
            for s in sessions {
                let duration = s
                    .duration_secs()
                    .map(|d| format!("{d}s"))
                    .unwrap_or_else(|| "open".into());
                println!("{}  {:>3} signs  {}", s.id, s.item_count, duration);
            }
        }
    }
    Ok(())
}

async fn training(settings: &Settings, options: &AppOptions, action: TrainingAction) -> Result<()> {
    let (store, relay) = app::connect_store(settings, options.no_relay).await;
    let log = app::build_training(settings, store);
    let result = run_training(&log, action).await;
    if let Some(relay) = relay {
        relay.close().await;
    }
    result
}

async fn run_training(log: &TrainingLog, action: TrainingAction) -> Result<()> {
    match action {
        TrainingAction::Stats => {
            let stats = log.stats().await?;
            println!("{} signs collected ({})", stats.count, stats.quality);
        }
        TrainingAction::Export { file } => {
            let n = log.export(&file).await?;
            if n == 0 {
                println!("No training data to export");
            } else {
                println!("Exported {n} samples to {}", file.display());
            }
        }
        TrainingAction::Clear => {
            let n = log.clear().await?;
            println!("Training data cleared ({n} samples)");
        }
    }
    Ok(())
}
