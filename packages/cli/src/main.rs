// ABOUTME: relay binary: serve the tool server bridge, probe it, or print tool declarations
// ABOUTME: Owns process concerns only; all behavior lives in the library crates

use clap::{Parser, Subcommand};
use relay_cli::{tools, Config};
use relay_sandbox::{HttpSandboxProvider, SandboxConfig};
use relay_session::{SessionManager, SessionManagerConfig};
use relay_tunnel::{ProcessTunnelProvider, TunnelConfig, TunnelManager};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Relay - bridge a remote reasoning engine to a local code sandbox")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the session manager and tool server, then wait for ctrl-c
    Serve,
    /// Check whether a relay server is running on the configured port
    Status,
    /// Print the function-tool declarations as JSON
    Tools {
        /// Base URL to embed in the endpoint fields
        #[arg(long, default_value = "http://localhost:4090")]
        base_url: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Status => status(config).await,
        Commands::Tools { base_url } => {
            println!(
                "{}",
                serde_json::to_string_pretty(&tools::function_declarations(&base_url))
                    .unwrap_or_default()
            );
        }
    }
}

async fn serve(config: Config) {
    let provider = Arc::new(HttpSandboxProvider::new(
        &config.sandbox_url,
        config.sandbox_api_key.clone(),
    ));
    let tunnel = Arc::new(TunnelManager::new(
        TunnelConfig {
            external_url: config.tunnel_url.clone(),
            enabled: config.tunnel_enabled,
            auto_start: config.tunnel_autostart,
            command: config.tunnel_command.clone(),
        },
        Arc::new(ProcessTunnelProvider::new(config.tunnel_command.clone())),
    ));

    let sandbox_config = SandboxConfig {
        idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        max_duration: Duration::from_secs(config.max_duration_secs),
        ..SandboxConfig::default()
    };
    let manager = SessionManager::new(
        provider,
        tunnel,
        SessionManagerConfig {
            port: config.port,
            sandbox: sandbox_config,
        },
    );

    let info = match manager.get_or_create().await {
        Ok(info) => info,
        Err(e) => {
            error!("Failed to start session: {}", e);
            process::exit(1);
        }
    };
    manager.start_idle_sweep().await;

    info!("Session {} ready", info.session_id);
    info!("Local tool server: {}", info.local_url);
    info!("Public tool endpoint: {}", info.tunnel_url);
    println!(
        "{}",
        serde_json::to_string_pretty(&tools::function_declarations(&info.tunnel_url))
            .unwrap_or_default()
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
    manager.cleanup().await;
}

async fn status(config: Config) {
    let url = format!("http://localhost:{}/health", config.port);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_default();

    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            println!(
                "{}",
                serde_json::json!({
                    "running": true,
                    "url": format!("http://localhost:{}", config.port),
                })
            );
        }
        Ok(resp) => {
            println!(
                "{}",
                serde_json::json!({ "running": false, "status": resp.status().as_u16() })
            );
            process::exit(1);
        }
        Err(_) => {
            println!("{}", serde_json::json!({ "running": false }));
            process::exit(1);
        }
    }
}
