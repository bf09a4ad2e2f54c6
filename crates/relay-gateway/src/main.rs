//! Relay Gateway entry point
//!
//! Run with:
//! ```bash
//! cargo run -p relay-gateway
//! ```
//!
//! Configuration is loaded from environment variables; tokens are read from
//! the file named by `RELAY_TOKENS_FILE`, one per line.

use relay_common::{try_init_tracing_with_config, AppConfig, AppError, AppResult, TracingConfig};
use relay_gateway::events::{MessageCreateEvent, ReadyEvent, ReadyUser};
use relay_gateway::{
    DispatchEvent, DispatchTable, FleetReport, FleetSupervisor, GatewayConfig, HandlerResult,
};
use std::future::Future;
use std::path::Path;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env();

    // Initialize tracing
    let tracing_config = match &config {
        Ok(config) => TracingConfig::for_environment(config.app.env, config.app.log_json),
        Err(_) => TracingConfig::development(),
    };
    if let Err(e) = try_init_tracing_with_config(tracing_config) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    let result = match config {
        Ok(config) => run(config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        error!(error = %e, "Relay gateway failed");
        std::process::exit(e.exit_code());
    }
}

async fn run(config: AppConfig) -> AppResult<()> {
    info!(
        env = ?config.app.env,
        url = %config.gateway.url,
        max_reconnects = config.backoff.max_reconnects,
        "Starting Relay Gateway..."
    );

    rustls::crypto::ring::default_provider().install_default().ok();

    let tokens = load_tokens(&config.app.tokens_file).await?;
    info!(count = tokens.len(), "Tokens loaded");

    let gateway = GatewayConfig::from_settings(&config.gateway, &config.backoff);
    let fleet = FleetSupervisor::new(gateway, handlers(), tokens);
    fleet.start_all();

    let report = wait_for_fleet(&fleet, tokio::signal::ctrl_c()).await;

    for (client_id, status) in &report.clients {
        info!(client_id = %client_id, status = %status, "Client finished");
    }
    info!(summary = %report, "Relay gateway stopped");

    Ok(())
}

/// Wait for every client to stop, shutting the fleet down on `shutdown`
///
/// If the shutdown signal cannot be listened for, the fleet keeps running
/// until its clients stop on their own.
async fn wait_for_fleet(
    fleet: &FleetSupervisor,
    shutdown: impl Future<Output = std::io::Result<()>>,
) -> FleetReport {
    tokio::select! {
        report = fleet.join() => report,
        signal = shutdown => {
            match signal {
                Ok(()) => {
                    info!("Shutdown signal received");
                    fleet.shutdown();
                }
                Err(e) => {
                    warn!(error = %e, "Failed to listen for ctrl-c, running until all clients stop");
                }
            }
            fleet.join().await
        }
    }
}

/// Read one token per line, skipping blank lines and `#` comments
async fn load_tokens(path: &Path) -> AppResult<Vec<String>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::io(path, e))?;

    let tokens = parse_tokens(&contents);
    if tokens.is_empty() {
        return Err(AppError::NoTokens(path.to_path_buf()));
    }
    Ok(tokens)
}

fn parse_tokens(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn handlers() -> DispatchTable {
    DispatchTable::builder()
        .on("READY", on_ready)
        .on("MESSAGE_CREATE", on_message)
        .build()
}

async fn on_ready(event: DispatchEvent) -> HandlerResult {
    let ready: ReadyEvent = event.parse()?;
    let user = ready.user.as_ref();
    info!(
        client_id = %event.client_id,
        account_id = user.map_or("", |u| u.id.as_str()),
        username = %user.map(ReadyUser::tag).unwrap_or_default(),
        "Account ready"
    );
    Ok(())
}

async fn on_message(event: DispatchEvent) -> HandlerResult {
    let message: MessageCreateEvent = event.parse()?;
    info!(
        client_id = %event.client_id,
        channel_id = %message.channel_id,
        author = %message.author.username,
        content_len = message.content.len(),
        "Message received"
    );
    Ok(())
}
