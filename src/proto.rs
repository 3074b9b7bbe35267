//! Generated protobuf and gRPC bindings.
//!
//! The module tree mirrors the protobuf package names so that the cross-package
//! references emitted by prost (`super::super::...`) resolve.
#![allow(clippy::all, missing_docs)]

pub mod envoy {
    pub mod config {
        pub mod core {
            pub mod v3 {
                tonic::include_proto!("envoy.config.core.v3");
            }
        }
    }

    pub mod r#type {
        pub mod v3 {
            tonic::include_proto!("envoy.r#type.v3");
        }
    }

    pub mod service {
        pub mod ext_proc {
            pub mod v3 {
                tonic::include_proto!("envoy.service.ext_proc.v3");
            }
        }
    }
}

pub mod grpc {
    pub mod health {
        pub mod v1 {
            tonic::include_proto!("grpc.health.v1");
        }
    }
}

/// Fully qualified gRPC service name of the external processor.
pub const EXT_PROC_SERVICE_NAME: &str = "envoy.service.ext_proc.v3.ExternalProcessor";
