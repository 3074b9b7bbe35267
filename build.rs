use std::{env, error::Error};

const PROTOS: &[&str] = &[
    "proto/envoy/service/ext_proc/v3/external_processor.proto",
    "proto/grpc/health/v1/health.proto",
];

fn main() -> Result<(), Box<dyn Error>> {
    // Fall back to the vendored compiler when the host has no protoc.
    if env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path()?;
        // SAFETY: build scripts are single-threaded at this point.
        unsafe { env::set_var("PROTOC", protoc) };
    }

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(PROTOS, &["proto"])?;

    for proto in PROTOS {
        println!("cargo:rerun-if-changed={proto}");
    }
    println!("cargo:rerun-if-changed=proto");
    Ok(())
}
