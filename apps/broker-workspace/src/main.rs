//! Broker Workspace Binary
//!
//! Opens a paper session, assembles the subscriptions described by the
//! command-line flags and configuration files, then hands the workspace to
//! the interactive shell.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p broker-workspace -- -a -e AAPL,MSFT -q base.json overrides.json
//! ```
//!
//! Files are deep-merged left to right over the flags. Run with `--help` for
//! the full flag list.
//!
//! # Environment Variables
//!
//! - `WORKSPACE_REPL`: Force the shell on or off
//! - `WORKSPACE_FROZEN`: Force frozen market data on or off
//! - `WORKSPACE_METRICS`: Install the Prometheus recorder (default: false)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: broker-workspace)
//! - `RUST_LOG`: Log filter (default: broker_workspace=info,warn)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use broker_workspace::infrastructure::paper::PaperSession;
use broker_workspace::infrastructure::shell::Shell;
use broker_workspace::infrastructure::telemetry;
use broker_workspace::{AssemblyConfig, Cli, WorkspaceSettings, init_metrics, setup};
use tokio::io::BufReader;
use tokio::signal;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init()?;

    let settings = WorkspaceSettings::from_env();
    let metrics = if settings.metrics {
        Some(init_metrics().context("installing metrics recorder")?)
    } else {
        None
    };

    let mut config = cli.load().context("loading configuration")?;
    settings.apply(&mut config);
    log_config(&config, &cli.files);

    let session = PaperSession::new(config.paper.clone());
    let plan = config.plan();
    let (env, result) = setup(Arc::new(session), &plan).await;

    // An incomplete workspace is still worth inspecting.
    match &result {
        Ok(summary) => tracing::info!(run_id = %summary.run_id, "Workspace ready"),
        Err(error) => tracing::error!(error = %error, "Workspace assembled with errors"),
    }

    match config.prompt() {
        Some(prompt) => {
            let shell = Shell::new(&env, prompt).with_metrics(metrics);
            let stdin = BufReader::new(tokio::io::stdin());
            tokio::select! {
                result = shell.run(stdin, tokio::io::stdout()) => result?,
                () = await_shutdown() => env.close().await?,
            }
        }
        None => {
            tracing::info!("Shell disabled, streaming until interrupted");
            await_shutdown().await;
            env.close().await?;
        }
    }

    tracing::info!("Broker workspace stopped");
    Ok(())
}

fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the merged configuration.
fn log_config(config: &AssemblyConfig, files: &[PathBuf]) {
    let plan = config.plan();
    tracing::info!(
        files = ?files,
        securities = plan.securities.len(),
        curves = plan.curves.len(),
        option_chains = plan.option_chains.len(),
        frozen = plan.frozen,
        repl = config.prompt().is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        markets_open = config.paper.markets_open,
        opens_in_secs = ?config.paper.opens_in_secs,
        latency_ms = config.paper.latency_ms,
        "Paper session settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::warn!(error = %error, "Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::warn!(error = %error, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
