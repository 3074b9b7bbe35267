pub mod ext_proc;
pub mod grpc_health;
pub mod http_health;

/// Re-export commonly used types from adapters
pub use ext_proc::ExtProcService;
pub use grpc_health::HealthService;
