//! Switchboard CLI and REST API entry point.
//!
//! Binary name: `swbd`
//!
//! Parses CLI arguments, opens the quota/usage database, loads the provider
//! config, then dispatches to the command handler or starts the REST API.

mod cli;
mod http;
mod state;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap_complete::generate;
use tokio::sync::broadcast::error::RecvError;

use switchboard_infra::config::{build_clients, watch_config};
use switchboard_observe::tracing_setup::{filter_for_verbosity, init_tracing, shutdown_tracing};
use switchboard_types::event::OrchestratorEvent;

use cli::{Cli, Commands};
use state::{AppState, ConcreteOrchestrator};

/// Quiet period before a burst of config file writes triggers a reload.
const CONFIG_DEBOUNCE: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let otel = matches!(cli.command, Commands::Serve { otel: true, .. });
    init_tracing(otel, filter_for_verbosity(cli.verbose, cli.quiet))
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "swbd", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.config.clone()).await?;

    match cli.command {
        Commands::Submit {
            task_type,
            tokens,
            prompt,
            payload,
        } => {
            cli::submit::submit_task(&state, &task_type, tokens, prompt, payload, cli.json)
                .await?;
        }

        Commands::Quota => {
            cli::quota::show_quota(&state, cli.json).await?;
        }

        Commands::Usage { since_hours } => {
            cli::quota::show_usage(&state, since_hours, cli.json).await?;
        }

        Commands::Providers => {
            cli::provider::list_providers(&state, cli.json).await?;
        }

        Commands::Serve {
            port,
            host,
            no_watch,
            ..
        } => {
            serve(state, &host, port, no_watch, cli.quiet).await?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    shutdown_tracing();
    Ok(())
}

/// Run the REST API until Ctrl+C or SIGTERM.
///
/// Reservations left on disk by a previous process are released first. The
/// queue sweeper, config watcher and event logger run alongside the server.
async fn serve(
    state: AppState,
    host: &str,
    port: u16,
    no_watch: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let orchestrator = Arc::clone(&state.orchestrator);

    let released = orchestrator.ledger().release_stale_reservations().await?;
    if released > 0 && !quiet {
        println!(
            "  {} Released {} reservation{} left by a previous run",
            console::style("↺").yellow(),
            released,
            if released == 1 { "" } else { "s" }
        );
    }

    let sweeper = orchestrator.spawn_sweeper();
    let event_logger = tokio::spawn(log_events(Arc::clone(&orchestrator)));

    let _watcher = if no_watch {
        None
    } else {
        match watch_config(&state.config_path, CONFIG_DEBOUNCE) {
            Ok((watcher, mut configs)) => {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    while let Some(config) = configs.recv().await {
                        let clients = build_clients(&config);
                        if let Err(e) = orchestrator.reload(&config, clients) {
                            tracing::warn!(error = %e, "Config reload rejected");
                        }
                    }
                });
                Some(watcher)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable; use POST /api/v1/config/reload");
                None
            }
        }
    };

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    if !quiet {
        println!(
            "  {} Switchboard API listening on {}",
            console::style("⚡").bold(),
            console::style(format!("http://{addr}")).cyan()
        );
        println!(
            "  {} provider{} from {}",
            orchestrator.providers().len(),
            if orchestrator.providers().len() == 1 { "" } else { "s" },
            console::style(state.config_path.display()).dim()
        );
        println!("  {}", console::style("Press Ctrl+C to stop").dim());
    }

    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.shutdown();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Queue sweeper did not stop cleanly");
    }
    event_logger.abort();

    let pending = orchestrator.pending_tasks().len();
    if pending > 0 {
        tracing::warn!(pending, "Deferred tasks dropped at shutdown");
    }

    if !quiet {
        println!("\n  Server stopped.");
    }
    Ok(())
}

/// Log every orchestrator event until the bus closes.
async fn log_events(orchestrator: Arc<ConcreteOrchestrator>) {
    let mut events = orchestrator.subscribe();
    loop {
        match events.recv().await {
            Ok(event) => match &event {
                OrchestratorEvent::Rejected { task_id, code, reason } => {
                    tracing::warn!(task_id = %task_id, code = %code, reason = %reason, "Task rejected");
                }
                OrchestratorEvent::RegistryReloaded { provider_count } => {
                    tracing::info!(provider_count, "Provider registry reloaded");
                }
                other => {
                    tracing::debug!(event = ?other, "Orchestrator event");
                }
            },
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger lagged behind the bus");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
