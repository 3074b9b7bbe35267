//! extproc-sidecar - an Envoy external-processing (ext_proc) sidecar.
//!
//! The sidecar speaks the `envoy.service.ext_proc.v3.ExternalProcessor` bidirectional
//! gRPC protocol. For every request-headers event Envoy forwards, it evaluates a small,
//! fixed mutation pipeline and answers with header mutations or an immediate `401`.
//! Every other event kind is acknowledged with a pass-through reply so the proxy never
//! stalls waiting on the processor.
//!
//! # Pipeline
//! - Stamp every request with `x-processed-by` (configurable)
//! - Conditional headers for `/api/v1*` (version) and `/admin*` (elevated access)
//! - Reject `/protected*` requests that carry no `authorization` header
//! - Apply a JSON directive carried in the `instructions` header
//!   (`{"addHeaders": {...}, "removeHeaders": [...]}`)
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use extproc_sidecar::{HealthRegistry, config::ServerConfig, server, utils::GracefulShutdown};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = ServerConfig::default();
//! let shutdown = GracefulShutdown::new();
//! server::run(&config, Arc::new(HealthRegistry::new()), shutdown.shutdown_token()).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! Business logic lives in `core` and is free of gRPC types. `ports` holds the traits the
//! core depends on and `adapters` implements them on top of tonic and axum. `server` wires
//! the listeners together for the binary.
//!
//! # Health
//! Two probes are exposed: `grpc.health.v1.Health` on the gRPC port, backed by the
//! [`HealthRegistry`], and a plain HTTP liveness endpoint (`/health` by default) that
//! answers `200 OK` whenever the process is up.
//!
//! # Error Handling
//! Library errors are typed with `thiserror`; process-level code returns `eyre::Result<T>`
//! with context attached through `WrapErr`.

pub mod adapters;
pub mod config;
pub mod core;
pub mod ports;
pub mod proto;
pub mod server;
pub mod tracing_setup;
pub mod utils;

pub use crate::{
    adapters::{ExtProcService, HealthService},
    config::ServerConfig,
    core::{
        Directive, HealthRegistry, HeaderEntry, Mutation, MutationPipeline, MutationSet, Outcome,
        ServingStatus, StreamDispatcher,
    },
    ports::{HeaderProcessor, ProcessingStream, StreamError},
};
