//! Command implementations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use taskhub_core::{Config, ResultExt};
use taskhub_tracker::rbac::permissions as role_permissions;
use taskhub_tracker::{
    Accounts, Clock, GeneratorConfig, InMemoryTaskStore, NotificationHub, RecurrenceGenerator,
    Role, Snapshot, SystemClock, TaskStore, TracingTaskStore,
};
use taskhub_web::{AppState, create_app, run_server};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Run the API server and background workers until Ctrl+C.
pub async fn serve(config_path: Option<&Path>, bind: Option<String>) -> Result<()> {
    let config = load_config(config_path, bind)?;

    let snapshot = match &config.storage.snapshot_path {
        Some(path) => Snapshot::load(path)
            .await
            .with_context(|| format!("Failed to load snapshot from {}", path.display()))?,
        None => Snapshot::default(),
    };
    info!(
        tenants = snapshot.tenants.len(),
        users = snapshot.users.len(),
        tasks = snapshot.tasks.len(),
        "Store initialized"
    );

    let store: Arc<dyn TaskStore> = Arc::new(TracingTaskStore::new(
        InMemoryTaskStore::from_snapshot(snapshot),
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let hub = NotificationHub::new(store.clone());
    let state = AppState::new(store.clone(), hub.clone(), clock.clone(), &config.auth);
    let app = create_app(state.clone(), &config.server).context("Failed to build router")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = vec![spawn_session_sweeper(
        state.accounts.clone(),
        config.scheduler.tick_interval,
        shutdown_rx.clone(),
    )];
    if config.scheduler.enabled {
        let generator = RecurrenceGenerator::new(
            store.clone(),
            hub,
            clock,
            GeneratorConfig::from(&config.scheduler),
        );
        workers.push(Arc::new(generator).spawn(shutdown_rx));
    } else {
        info!("Recurrence generator disabled by configuration");
    }

    run_server(app, &config.server.bind_address, wait_for_shutdown())
        .await
        .context("Server failed")?;

    if shutdown_tx.send(true).is_err() {
        debug!("Background workers already stopped");
    }
    for worker in workers {
        worker.await.context("Background worker panicked")?;
    }

    if let Some(path) = &config.storage.snapshot_path {
        let snapshot = store.snapshot().await.context("Failed to snapshot store")?;
        snapshot
            .save(path)
            .await
            .with_context(|| format!("Failed to save snapshot to {}", path.display()))?;
        info!(path = %path.display(), "Snapshot saved");
    }

    info!("Taskhub shutdown complete");
    Ok(())
}

/// Load configuration and apply the `--bind` override, validating the result.
fn load_config(config_path: Option<&Path>, bind: Option<String>) -> Result<Config> {
    let mut config = Config::load(config_path).context("Failed to load configuration")?;
    if let Some(bind) = bind {
        config.server.bind_address = bind;
        config.validate().context("Invalid --bind override")?;
    }
    Ok(config)
}

/// Validate configuration and render the effective values as TOML.
pub fn check_config(config_path: Option<&Path>) -> Result<String> {
    let config = Config::load(config_path).context("Configuration is invalid")?;
    toml::to_string_pretty(&config).context("Failed to render configuration")
}

/// Render one role's permissions, or the whole matrix.
pub fn permissions(role: Option<&str>) -> Result<String> {
    let roles = match role {
        Some(name) => vec![name.parse::<Role>()?],
        None => Role::ALL.to_vec(),
    };
    let lines: Vec<String> = roles
        .into_iter()
        .map(|role| {
            let granted: Vec<&str> = role_permissions(role).iter().map(|p| p.as_str()).collect();
            format!("{role}: {}", granted.join(", "))
        })
        .collect();
    Ok(lines.join("\n"))
}

fn spawn_session_sweeper(
    accounts: Arc<Accounts>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = tokio::time::sleep(every) => {
                    let purged = accounts.purge_sessions().await;
                    if purged > 0 {
                        debug!(purged, "Expired sessions purged");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}

/// Write command output, logging rather than failing on a closed stdout.
pub fn emit(output: Result<String>) -> Result<()> {
    use std::io::Write;

    let text = output?;
    let _ = writeln!(std::io::stdout(), "{text}").warn_on_err("Failed to write command output");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::io::Write;

    #[test]
    fn test_check_config_renders_effective_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind_address = \"0.0.0.0:8080\"").unwrap();

        let rendered = check_config(Some(file.path())).unwrap();
        assert!(rendered.contains("0.0.0.0:8080"));
        assert!(rendered.contains("tick_interval_secs"));
    }

    #[test]
    fn test_check_config_reports_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\ntick_interval_secs = 0").unwrap();
        assert!(check_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_bind_override_is_validated() {
        let config = load_config(None, Some("0.0.0.0:9000".to_string())).unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:9000");
        assert!(load_config(None, Some("  ".to_string())).is_err());
    }

    #[test]
    fn test_permissions_for_one_role() {
        let out = permissions(Some("Manager")).unwrap();
        assert!(out.starts_with("manager:"));
        assert!(out.contains("recurrence:manage"));
        assert!(!out.contains("user:manage"));
    }

    #[test]
    fn test_permissions_matrix_lists_every_role() {
        let out = permissions(None).unwrap();
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn test_permissions_unknown_role() {
        assert!(permissions(Some("overlord")).is_err());
    }
}
