//! Running without the terminal readout: observations go to the log.

use tokio::sync::{mpsc, watch};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use crate::monitor::MonitorEvent;

/// Logs monitor events until the host signals shutdown, the process is
/// interrupted, or the poll loop stops.
pub async fn run(
    mut events: mpsc::Receiver<MonitorEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        #[cfg(unix)]
        let sigterm_fut = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_fut = std::future::pending::<Option<()>>();

        tokio::select! {
            _ = sigterm_fut => {
                tracing::info!("Received SIGTERM, shutting down gracefully");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT, shutting down gracefully");
                break;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("Host requested shutdown");
                    break;
                }
            }
            event = events.recv() => match event {
                Some(event) => log_event(&event),
                None => {
                    tracing::warn!("Poll loop stopped");
                    break;
                }
            },
        }
    }
    Ok(())
}

pub fn log_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::FetchStarted(trigger) => {
            tracing::debug!(?trigger, "Fetching observation");
        }
        MonitorEvent::Updated {
            snapshot,
            next_poll,
        } => {
            tracing::info!(
                aqi = %snapshot.observation.index,
                category = %snapshot.label,
                location = %snapshot.observation.location,
                next_poll_secs = next_poll.as_secs(),
                "Current air quality"
            );
        }
        MonitorEvent::Failed {
            error,
            retry_in,
            consecutive_failures,
        } => {
            tracing::warn!(
                error = %error,
                failures = consecutive_failures,
                retry_in_secs = retry_in.map(|d| d.as_secs()),
                "No current reading"
            );
        }
    }
}
