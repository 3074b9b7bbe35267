//! Configuration data structures for the sidecar.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files and
//! to `EXTPROC__*` environment overrides. Every field has a default so the
//! processor runs without any configuration file at all.
use serde::{Deserialize, Serialize};

use crate::proto::EXT_PROC_SERVICE_NAME;

fn default_grpc_listen_addr() -> String {
    "0.0.0.0:9001".to_string()
}

fn default_health_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address of the ext_proc gRPC endpoint (also serves grpc.health.v1)
    #[serde(default = "default_grpc_listen_addr")]
    pub grpc_listen_addr: String,
    /// Address of the plaintext HTTP liveness endpoint
    #[serde(default = "default_health_listen_addr")]
    pub health_listen_addr: String,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_listen_addr: default_grpc_listen_addr(),
            health_listen_addr: default_health_listen_addr(),
            pipeline: PipelineConfig::default(),
            health: HealthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Header names and values used by the mutation pipeline.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Header appended to every request to identify this processor
    pub stamp_header: String,
    pub stamp_value: String,
    /// Header whose value carries a JSON directive
    pub directive_header: String,
    /// Header (usually the `:path` pseudo-header) holding the request path
    pub path_header: String,
    /// Header whose presence satisfies the `/protected` gate
    pub authorization_header: String,
    /// Remove the directive header from the upstream request once decoded
    pub strip_directive_header: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stamp_header: "x-processed-by".to_string(),
            stamp_value: "eag-extproc".to_string(),
            directive_header: "instructions".to_string(),
            path_header: ":path".to_string(),
            authorization_header: "authorization".to_string(),
            strip_directive_header: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HealthConfig {
    /// Service name registered with grpc.health.v1 next to the overall `""` entry
    pub service_name: String,
    /// Path of the HTTP liveness probe
    pub http_path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            service_name: EXT_PROC_SERVICE_NAME.to_string(),
            http_path: "/health".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// JSON output when true, pretty console output otherwise
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

/// Builder for ServerConfig, mostly used by tests and embedders
#[derive(Default)]
pub struct ServerConfigBuilder {
    grpc_listen_addr: Option<String>,
    health_listen_addr: Option<String>,
    pipeline: Option<PipelineConfig>,
    health: Option<HealthConfig>,
    logging: Option<LoggingConfig>,
}

impl ServerConfigBuilder {
    pub fn grpc_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.grpc_listen_addr = Some(addr.into());
        self
    }

    pub fn health_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.health_listen_addr = Some(addr.into());
        self
    }

    pub fn pipeline(mut self, config: PipelineConfig) -> Self {
        self.pipeline = Some(config);
        self
    }

    pub fn health(mut self, config: HealthConfig) -> Self {
        self.health = Some(config);
        self
    }

    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging = Some(config);
        self
    }

    pub fn build(self) -> ServerConfig {
        ServerConfig {
            grpc_listen_addr: self.grpc_listen_addr.unwrap_or_else(default_grpc_listen_addr),
            health_listen_addr: self
                .health_listen_addr
                .unwrap_or_else(default_health_listen_addr),
            pipeline: self.pipeline.unwrap_or_default(),
            health: self.health.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
        }
    }
}
