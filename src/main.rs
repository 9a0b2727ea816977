//! shadow-tail - Near real-time tailing of agent rollout sessions.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shadow_tail::config::{ConfigLoader, ShadowConfig};
use shadow_tail::display;
use shadow_tail::persist::{BlobStore, SqliteBlobStore};
use shadow_tail::store::{SessionStore, StoreEvent};
use shadow_tail::watcher::{RolloutWatcher, DEFAULT_SETTLE_DELAY};

#[derive(Parser)]
#[command(
    name = "shadow-tail",
    about = "Tail and index agent rollout sessions",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the agent home directory.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Include archived sessions.
    #[arg(long, global = true)]
    archived: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List sessions, most recently updated first.
    Sessions,
    /// Print the events of one session.
    Events {
        /// Session key (the session directory).
        key: String,
        /// Only show events carrying this tag.
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Watch for new events and print them until interrupted.
    Tail,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<ShadowConfig, Box<dyn std::error::Error>> {
    let loader = cli
        .config
        .clone()
        .map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let mut config = loader.load()?;
    if let Some(root) = &cli.root {
        config.root.clone_from(root);
    }
    if cli.archived {
        config.include_archived = true;
    }
    Ok(config)
}

async fn open_store(config: &ShadowConfig) -> Result<Arc<SessionStore>, Box<dyn std::error::Error>> {
    let blobs: Arc<dyn BlobStore> =
        Arc::new(SqliteBlobStore::open(config.resolved_state_path()).await?);
    let store = SessionStore::open(config.store_config(), blobs).await?;
    Ok(Arc::new(store))
}

async fn list_sessions(store: &SessionStore) {
    let sessions = store.get_sessions().await;
    if sessions.is_empty() {
        eprintln!("No sessions found");
    }
    for info in &sessions {
        display::print_session(info);
    }
}

async fn print_events(
    store: &SessionStore,
    key: &str,
    tag: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    store.warm_session(key).await?;
    for event in store.get_events(key).await {
        if tag.map_or(true, |tag| event.has_tag(tag)) {
            display::print_event(&event);
        }
    }
    store.stop().await?;
    Ok(())
}

async fn tail(store: Arc<SessionStore>) -> Result<(), Box<dyn std::error::Error>> {
    let locator = store.locator().await;
    let roots = locator.watch_roots();
    if roots.is_empty() {
        return Err(format!("No session directories under {}", locator.root.display()).into());
    }
    let (watcher, notifications) =
        RolloutWatcher::new(&roots, locator.naming.clone(), DEFAULT_SETTLE_DELAY)?;

    let cancel = CancellationToken::new();
    let mut updates = store.subscribe();
    let mut printed = HashSet::new();
    let driver = {
        let store = store.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { store.run(notifications, cancel).await })
    };
    tracing::info!(roots = roots.len(), "Tailing rollout sessions");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => match update {
                Ok(StoreEvent::EventsAppended { session_key, count }) => {
                    tracing::debug!(session = %session_key, count, "Events appended");
                    for event in store.get_events(&session_key).await {
                        if printed.insert(event.id.clone()) {
                            display::print_event(&event);
                        }
                    }
                }
                Ok(StoreEvent::PollFailed { path, attempts, error }) => {
                    display::print_poll_failure(&path, attempts, &error);
                }
                Ok(StoreEvent::SessionsChanged) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Display fell behind store updates");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    cancel.cancel();
    driver.await?;
    drop(watcher);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli)?;
    tracing::debug!(root = %config.resolved_root().display(), "Loaded configuration");
    let store = open_store(&config).await?;

    match cli.command {
        Commands::Sessions => {
            list_sessions(&store).await;
            store.stop().await?;
        }
        Commands::Events { key, tag } => print_events(&store, &key, tag.as_deref()).await?,
        Commands::Tail => tail(store).await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
