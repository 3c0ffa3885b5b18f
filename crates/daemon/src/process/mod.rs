pub mod utils;

use std::time::Duration;

use common::auth::Credentials;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

use crate::{MeshService, ServiceConfig};

/// Handle for gracefully shutting down the daemon service.
pub struct ShutdownHandle {
    graceful_waiter: tokio::task::JoinHandle<()>,
    service: MeshService,
    shutdown_tx: watch::Sender<()>,
}

impl ShutdownHandle {
    /// Block until the service shuts down (via signal or explicit shutdown).
    pub async fn wait(self) {
        shutdown_and_close(self.graceful_waiter, self.service).await;
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Initialize logging, panic handler, and build info reporting.
/// Returns guards that must be kept alive for the duration of the program.
fn init_logging(
    service_config: &ServiceConfig,
) -> Vec<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::fmt::format::FmtSpan;

    let mut guards = Vec::new();

    // Stdout layer
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);

    let stdout_env_filter = EnvFilter::builder()
        .with_default_directive(service_config.log_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(stdout_env_filter);

    // File layer (if log_dir is set)
    if let Some(log_dir) = &service_config.log_dir {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Failed to create log directory {:?}: {}",
                log_dir, e
            );
        }

        let file_appender = tracing_appender::rolling::daily(log_dir, "meshwire.log");
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guards.push(file_guard);

        let file_env_filter = EnvFilter::builder()
            .with_default_directive(service_config.log_level.into())
            .from_env_lossy();

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(file_env_filter);

        tracing_subscriber::registry()
            .with(stdout_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry().with(stdout_layer).init();
    }

    utils::register_panic_logger();
    utils::report_build_info();

    guards
}

/// Create the service from config, exiting on error.
async fn create_service(
    service_config: &ServiceConfig,
    credentials: Option<&Credentials>,
) -> MeshService {
    match MeshService::start(service_config, credentials).await {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("error starting mesh service: {}", e);
            std::process::exit(3);
        }
    }
}

/// Wait for the shutdown signal, then close transports with a timeout.
async fn shutdown_and_close(graceful_waiter: tokio::task::JoinHandle<()>, service: MeshService) {
    let _ = graceful_waiter.await;

    if timeout(FINAL_SHUTDOWN_TIMEOUT, service.shutdown())
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

/// Start the mesh service, returning it with its shutdown handle.
///
/// The returned `ShutdownHandle` must be kept alive; dropping it does not stop the service.
pub async fn start_service(
    service_config: &ServiceConfig,
    credentials: Option<&Credentials>,
) -> (MeshService, ShutdownHandle) {
    let (graceful_waiter, shutdown_tx) = utils::graceful_shutdown_blocker();
    let service = create_service(service_config, credentials).await;

    if let Some(cloud) = service.cloud() {
        // connect eagerly so relay problems show up at startup
        if let Err(e) = cloud.connect().await {
            tracing::warn!("relay not reachable yet: {}", e);
        }
    }

    tracing::info!(
        "Running: local bridge on {}",
        service.bridge().socket_path().display()
    );

    let handle = ShutdownHandle {
        graceful_waiter,
        service: service.clone(),
        shutdown_tx,
    };
    (service, handle)
}

/// Spawns the daemon: local bridge plus relay connection.
/// Blocks until shutdown signal is received. Use for CLI binary usage.
pub async fn spawn_service(service_config: &ServiceConfig, credentials: Option<&Credentials>) {
    let _guards = init_logging(service_config);
    let (_, handle) = start_service(service_config, credentials).await;
    handle.wait().await;
}
