use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use common::notify::NotificationDispatcher;
use common::store::StoreClient;

use super::config::Config;
use super::notifier::NotificationCoordinator;
use super::state::State;

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Bring up a client service around the given store client and run until a
/// shutdown signal arrives.
pub async fn spawn_service(config: &Config, store: Arc<dyn StoreClient>) {
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.log_level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();

    register_panic_logger();
    report_build_info();

    let (graceful_waiter, shutdown_rx) = graceful_shutdown_blocker();

    // Create the notification channel first; the state holds the dispatcher
    // handed to every process it wires up
    let (notifications, notification_rx) = NotificationDispatcher::new();

    let state = match State::from_config(config, store, notifications).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!("error creating service state: {}", e);
            std::process::exit(3);
        }
    };

    let mut handles = Vec::new();

    // Spawn the notification delivery loop
    let coordinator = NotificationCoordinator::new(state.subscribers().clone());
    let coordinator_rx = shutdown_rx.clone();
    let coordinator_handle = tokio::spawn(async move {
        coordinator.run(notification_rx, coordinator_rx).await;
    });
    handles.push(coordinator_handle);

    let _ = graceful_waiter.await;

    if timeout(FINAL_SHUTDOWN_TIMEOUT, join_all(handles))
        .await
        .is_err()
    {
        tracing::error!(
            "Failed to shut down within {} seconds",
            FINAL_SHUTDOWN_TIMEOUT.as_secs()
        );
        std::process::exit(4);
    }
}

/// Install a panic hook that routes panics through tracing before the
/// process dies silently in a detached session.
fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| match panic.location() {
        Some(location) => {
            tracing::error!(
                message = %panic,
                panic.file = location.file(),
                panic.line = location.line(),
                "service panicked"
            );
        }
        None => tracing::error!(message = %panic, "service panicked"),
    }));
}

fn report_build_info() {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting burrow service"
    );
}

/// Wait for ctrl-c and broadcast it to every task holding the receiver.
fn graceful_shutdown_blocker() -> (tokio::task::JoinHandle<()>, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        let _ = tx.send(true);
    });
    (handle, rx)
}
