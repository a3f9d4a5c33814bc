mod bootstrap;
mod cli;
mod collaborators;
mod command;
mod state;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ConfigCommand};
use collaborators::{NullAgentSessionFactory, NullChatPlatform};
use sg_domain::config::Config;
use sg_grants::GrantStore;
use sg_sessions::SessionManager;
use sg_store::Store;
use sg_workspace::WorkspaceManager;
use state::Core;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Doctor) => {
            let (config, config_path) = cli::load_config()?;
            let passed = cli::doctor::run(&config, &config_path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config()?;
            let valid = cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = cli::load_config()?;
            cli::config::show(&config);
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` command).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sg_gateway=debug")))
        .json()
        .init();
}

/// Start the gateway process with the given configuration: wire every
/// collaborator, recover from an unclean shutdown, spawn the background
/// sweeps, then block until a termination signal arrives.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("channel gateway starting");

    bootstrap::validate_or_bail(&config)?;

    // ── Durable store ────────────────────────────────────────────────
    std::fs::create_dir_all(&config.workspace.base_root)?;
    let store = Arc::new(Store::open(&config.workspace.store_path())?);
    tracing::info!(path = %config.workspace.store_path().display(), "durable store ready");

    // ── Grant store ──────────────────────────────────────────────────
    let grants = GrantStore::new(store.clone());
    tracing::info!("grant store ready");

    // ── Workspace manager ────────────────────────────────────────────
    let workspace = Arc::new(WorkspaceManager::new(
        config.policy.scm_bin.clone(),
        config.workspace.clone(),
        store.clone(),
    ));
    tracing::info!("workspace manager ready");

    bootstrap::recover_and_reconcile(&store, &workspace).await?;

    // ── Collaborators ────────────────────────────────────────────────
    let platform = Arc::new(NullChatPlatform);
    let factory = Arc::new(NullAgentSessionFactory);
    tracing::info!("coding-agent and chat-platform collaborators ready (null implementations)");

    // ── Session manager ──────────────────────────────────────────────
    let sessions = SessionManager::new(factory, platform.clone(), store.clone(), grants.clone(), workspace.clone());
    tracing::info!(default_model = %config.sessions.default_model, "session manager ready");

    let core = Arc::new(Core { config: config.clone(), store, grants, workspace, sessions, platform });

    bootstrap::spawn_sweeps(core.clone());

    tracing::info!("channel gateway ready");
    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining live sessions");

    let deadline = std::time::Duration::from_millis(core.config.sessions.shutdown_timeout_ms);
    let drained = tokio::time::timeout(deadline, async {
        while core.sessions.session_count() > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    })
    .await
    .is_ok();

    if drained {
        tracing::info!("all sessions drained, exiting");
    } else {
        tracing::warn!(
            remaining = core.sessions.session_count(),
            "shutdown deadline hit with sessions still live, exiting anyway"
        );
    }
    Ok(())
}

/// Block until SIGTERM or Ctrl-C (spec §5 "Shutdown").
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
