use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use aqiwatch::app::App;
use aqiwatch::aqi::{FetchClient, Snapshot};
use aqiwatch::bridge::{self, Host, LogShell, SecretSource, TOKEN_SECRET};
use aqiwatch::config::Config;
use aqiwatch::monitor::{BackoffScheduler, Deduplicator, LoopCommand, PollLoop, StationFeed};
use aqiwatch::storage::PreferenceStore;
use aqiwatch::{headless, ui};

/// How long shutdown waits for the poll loop and the host to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Get the config directory path (~/.config/aqiwatch/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("aqiwatch"))
}

/// Create `dir` if needed and restrict it to the current user on Unix.
fn ensure_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
        tracing::info!(path = %dir.display(), "Created data directory");
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(dir, perms) {
                    tracing::warn!(
                        path = %dir.display(),
                        error = %e,
                        "Failed to set data directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %dir.display(),
                    error = %e,
                    "Failed to read data directory metadata"
                );
            }
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "aqiwatch", about = "Desktop air-quality monitor", version)]
struct Args {
    /// Config file (default: <data dir>/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run without the terminal readout, logging observations instead
    #[arg(long)]
    headless: bool,

    /// Fetch one observation, print it and exit
    #[arg(long)]
    once: bool,

    /// Directory for preferences and the last-seen record (default: ~/.config/aqiwatch)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.headless || args.once {
        "info"
    } else {
        "error"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let data_dir = match &args.data_dir {
        Some(dir) => dir.clone(),
        None => get_config_dir()?,
    };
    ensure_private_dir(&data_dir)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    tracing::debug!(?config, "Effective configuration");

    let http = reqwest::Client::builder()
        .user_agent(concat!("aqiwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let client = FetchClient::new(
        http,
        &config.feed_base_url,
        &config.station,
        config.fetch_timeout(),
    )
    .context("Invalid feed_base_url")?;

    let secrets = SecretSource::new().allow(TOKEN_SECRET, config.api_token.take());

    if args.once {
        return fetch_once(&client, &secrets).await;
    }

    // Host side
    let store = PreferenceStore::load(data_dir.join("preferences.json"));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (bridge, push_rx, port) = bridge::channel(16);
    let (tray_tx, tray_rx) = mpsc::channel(8);
    let host = Host::new(LogShell::new(shutdown_tx), store, secrets);
    let host_task = tokio::spawn(host.run(port, tray_rx));

    // Presentation side
    let prefs = bridge.load_preferences().await;
    let (prefs_tx, prefs_rx) = watch::channel(prefs);
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let router = bridge::spawn_push_router(push_rx, prefs_tx, cmd_tx.clone());

    let (event_tx, event_rx) = mpsc::channel(32);
    let source = Arc::new(StationFeed::new(client, bridge.clone(), TOKEN_SECRET));
    let poll = PollLoop::new(source, bridge.clone(), prefs_rx.clone(), event_tx)
        .with_interval(config.poll_interval())
        .with_backoff(BackoffScheduler::new(config.backoff_policy()))
        .with_dedup(Deduplicator::load(data_dir.join("last_seen.json")));
    let poll_task = tokio::spawn(poll.run(cmd_rx));

    if args.headless || !prefs.show_window_on_startup {
        headless::run(event_rx, shutdown_rx)
            .await
            .context("Failed to install signal handlers")?;
    } else {
        let mut app = App::new(prefs_rx);
        let controls = ui::Controls {
            commands: cmd_tx.clone(),
            bridge: bridge.clone(),
            tray: tray_tx.clone(),
        };
        ui::run(&mut app, controls, event_rx, shutdown_rx).await?;
    }

    // Stop the poll loop first so the host sees the bridge close.
    let _ = cmd_tx.send(LoopCommand::Shutdown).await;
    router.abort();
    match tokio::time::timeout(SHUTDOWN_GRACE, poll_task).await {
        Ok(Ok(state)) => tracing::debug!(
            phase = ?state.phase,
            failures = state.consecutive_failures,
            "Poll loop finished"
        ),
        Ok(Err(e)) => tracing::warn!(error = %e, "Poll loop task failed"),
        Err(_) => tracing::warn!("Poll loop did not stop in time"),
    }

    drop(bridge);
    drop(tray_tx);
    match tokio::time::timeout(SHUTDOWN_GRACE, host_task).await {
        Ok(Ok(exit)) => tracing::debug!(?exit, "Host finished"),
        Ok(Err(e)) => tracing::warn!(error = %e, "Host task failed"),
        Err(_) => tracing::warn!("Host did not stop in time"),
    }

    Ok(())
}

/// One fetch outside the poll loop, for scripts and checking a token.
async fn fetch_once(client: &FetchClient, secrets: &SecretSource) -> Result<()> {
    let token = SecretString::from(secrets.get(TOKEN_SECRET).unwrap_or_default());
    let observation = client
        .fetch(&token)
        .await
        .with_context(|| format!("Failed to fetch station {}", client.station()))?;
    let snapshot = Snapshot::new(observation);

    println!(
        "AQI {} ({}) at {}",
        snapshot.observation.index, snapshot.label, snapshot.observation.location
    );
    println!("Observed {}", snapshot.observation.observed_at.to_rfc3339());
    for (name, value) in &snapshot.observation.particulates {
        println!("  {:<6} {:>6.1}", name, value);
    }
    Ok(())
}
