use std::{path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{Result, eyre::Context};
use extproc_sidecar::{
    config::{ServerConfig, ServerConfigValidator, loader},
    core::HealthRegistry,
    server, tracing_setup,
    utils::graceful_shutdown::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the ext_proc sidecar (default)
    Serve {
        /// Configuration file to use; a missing file means built-in defaults
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let config_path = match args.command {
        Some(Commands::Validate { config }) => return validate_config_command(&config),
        Some(Commands::Init { config }) => return init_config_command(&config).await,
        Some(Commands::Serve { config }) => config,
        None => args.config,
    };

    let config: ServerConfig = loader::load_config(&config_path)
        .await
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;

    tracing_setup::init_from_config(&config.logging).context("Failed to initialize tracing")?;

    if let Err(e) = ServerConfigValidator::validate(&config) {
        tracing::error!("Invalid configuration:\n{e}");
        return Err(e).context("Configuration validation failed");
    }

    tracing::info!(
        grpc = %config.grpc_listen_addr,
        health = %config.health_listen_addr,
        "Starting ext_proc sidecar"
    );

    let shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler.run_signal_handler().await {
            tracing::error!("Signal handler failed: {e}");
        }
    });

    let registry = Arc::new(HealthRegistry::new());
    server::run(&config, registry, shutdown.shutdown_token()).await
}

/// Validate a configuration file
fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    let config = match loader::load_config_strict(config_path) {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • gRPC Listen Address: {}", config.grpc_listen_addr);
            println!("   • Health Listen Address: {}", config.health_listen_addr);
            println!("   • Health Path: {}", config.health.http_path);
            println!("   • Directive Header: {}", config.pipeline.directive_header);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Verify listen address format (e.g., '0.0.0.0:9001')");
            println!("   • Use distinct ports for the gRPC and health listeners");
            println!("   • Header names must be lowercase");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# ext_proc sidecar configuration
# Every value can be overridden with EXTPROC__<SECTION>__<KEY>, e.g. EXTPROC__LOGGING__LEVEL=debug

# ext_proc gRPC endpoint (also serves grpc.health.v1)
grpc_listen_addr = "0.0.0.0:9001"

# Plaintext HTTP liveness endpoint
health_listen_addr = "0.0.0.0:8080"

[pipeline]
stamp_header = "x-processed-by"
stamp_value = "eag-extproc"
directive_header = "instructions"
path_header = ":path"
authorization_header = "authorization"
# Remove the directive header from the upstream request once applied
strip_directive_header = true

[health]
service_name = "envoy.service.ext_proc.v3.ExternalProcessor"
http_path = "/health"

[logging]
level = "info"
json = true
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'extproc-sidecar serve --config {config_path}' to start the sidecar");
    Ok(())
}
