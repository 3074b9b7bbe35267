//! Process wiring: binds the listeners, registers health and runs both servers
//! until the shutdown token fires.
use std::sync::Arc;

use eyre::{Result, WrapErr};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::Instrument;

use crate::{
    adapters::{ExtProcService, HealthService, http_health},
    config::ServerConfig,
    core::{HealthRegistry, MutationPipeline},
    ports::HeaderProcessor,
    tracing_setup,
    utils::ShutdownToken,
};

/// Bind the configured addresses and serve until shutdown.
///
/// The gRPC listener is mandatory: failing to bind it aborts startup. The HTTP
/// liveness listener is best effort and only logged when it cannot be bound.
pub async fn run(
    config: &ServerConfig,
    registry: Arc<HealthRegistry>,
    shutdown: ShutdownToken,
) -> Result<()> {
    let grpc_listener = TcpListener::bind(&config.grpc_listen_addr)
        .await
        .wrap_err_with(|| format!("Failed to bind gRPC listener on {}", config.grpc_listen_addr))?;

    let health_listener = match TcpListener::bind(&config.health_listen_addr).await {
        Ok(listener) => Some(listener),
        Err(e) => {
            tracing::error!(
                addr = %config.health_listen_addr,
                error = %e,
                "Failed to bind HTTP health listener; continuing without it"
            );
            None
        }
    };

    serve_with_listeners(config, grpc_listener, health_listener, registry, shutdown).await
}

/// Serve on already-bound listeners.
pub async fn serve_with_listeners(
    config: &ServerConfig,
    grpc_listener: TcpListener,
    health_listener: Option<TcpListener>,
    registry: Arc<HealthRegistry>,
    shutdown: ShutdownToken,
) -> Result<()> {
    let grpc_addr = grpc_listener
        .local_addr()
        .wrap_err("Failed to read gRPC listener address")?;
    let service_name = config.health.service_name.clone();

    registry.mark_serving(&service_name).await;

    let health_task = match health_listener {
        Some(listener) => {
            let addr = listener
                .local_addr()
                .wrap_err("Failed to read health listener address")?;
            let path = config.health.http_path.clone();
            let token = shutdown.clone();
            let span = tracing_setup::create_listener_span("http_health", addr);
            Some(tokio::spawn(
                async move {
                    let stop = async move {
                        token.wait_for_shutdown().await;
                    };
                    if let Err(e) = http_health::serve(listener, path, stop).await {
                        tracing::error!("HTTP health server stopped: {e:#}");
                    }
                }
                .instrument(span),
            ))
        }
        None => None,
    };

    let processor: Arc<dyn HeaderProcessor> =
        Arc::new(MutationPipeline::new(config.pipeline.clone()));

    let registry_on_stop = registry.clone();
    let name_on_stop = service_name.clone();
    let stop = async move {
        let reason = shutdown.wait_for_shutdown().await;
        tracing::info!("Stopping gRPC server ({reason:?}); draining open streams");
        registry_on_stop.mark_not_serving(&name_on_stop).await;
    };

    tracing::info!("ext_proc gRPC server listening on {grpc_addr}");
    let result = Server::builder()
        .add_service(ExtProcService::new(processor).into_server())
        .add_service(HealthService::new(registry.clone()).into_server())
        .serve_with_incoming_shutdown(TcpListenerStream::new(grpc_listener), stop)
        .instrument(tracing_setup::create_listener_span("grpc", grpc_addr))
        .await;

    registry.mark_not_serving(&service_name).await;

    if let Some(task) = health_task {
        // A failed gRPC server never fires the shutdown token the health server waits on.
        stop_health_task(task, result.is_err()).await;
    }

    tracing::info!("Sidecar stopped");
    result.wrap_err("gRPC server error")
}

async fn stop_health_task(task: JoinHandle<()>, abort: bool) {
    if abort {
        task.abort();
    }
    match task.await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => tracing::debug!("HTTP health task aborted"),
        Err(e) => tracing::warn!("HTTP health task panicked: {e}"),
    }
}
