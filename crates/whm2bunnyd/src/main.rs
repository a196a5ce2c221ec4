//! # whm2bunnyd
//!
//! Daemon binary bridging WHM/cPanel domain-lifecycle webhooks to Bunny.net
//! DNS + CDN provisioning. This is a thin wiring layer: all provisioning
//! logic lives in `whm2bunny-core`, the Bunny client in
//! `whm2bunny-provider-bunny` and the Telegram transport in
//! `whm2bunny-notify-telegram`.
//!
//! Responsibilities:
//!
//! 1. Parse the CLI and load configuration from `WHM2BUNNY_*` env vars
//! 2. Initialize tracing
//! 3. Wire client → stores → notifier → provisioner → scheduler → server
//! 4. Spawn startup recovery once the listener accepts connections
//! 5. Drive the graceful shutdown sequence on SIGINT/SIGTERM/SIGQUIT

mod server;
mod settings;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use whm2bunny_core::config::Config;
use whm2bunny_core::traits::ChatTransport;
use whm2bunny_core::{Notifier, Provisioner, Scheduler, SnapshotStore, StateStore, Validator};
use whm2bunny_notify_telegram::TelegramTransport;
use whm2bunny_provider_bunny::BunnyClient;

/// Recovery starts this long after the listener is up
const RECOVERY_STARTUP_DELAY: Duration = Duration::from_secs(5);

/// Hard deadline for the whole shutdown sequence
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

/// Exit codes, following systemd conventions
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    /// Clean shutdown
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// WHM/cPanel → Bunny.net provisioning daemon
#[derive(Parser)]
#[command(name = "whm2bunnyd", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook HTTP server
    Serve,
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Print version information
    Version,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print a sample environment file
    Generate,
    /// Load and validate the configuration, exiting nonzero on failure
    Validate,
    /// Print the resolved configuration with secrets redacted
    Show,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("whm2bunnyd {}", env!("CARGO_PKG_VERSION"));
            DaemonExitCode::CleanShutdown.into()
        }
        Commands::Config { command } => run_config(command),
        Commands::Serve => run_serve(),
    }
}

fn run_config(command: ConfigCommands) -> ExitCode {
    match command {
        ConfigCommands::Generate => {
            println!("{}", settings::sample_env());
            DaemonExitCode::CleanShutdown.into()
        }
        ConfigCommands::Validate => match load_and_validate() {
            Ok(_) => {
                println!("configuration is valid");
                DaemonExitCode::CleanShutdown.into()
            }
            Err(err) => {
                eprintln!("configuration error: {err:#}");
                DaemonExitCode::ConfigError.into()
            }
        },
        ConfigCommands::Show => match load_and_validate() {
            Ok(config) => match settings::redacted_json(&config) {
                Ok(json) => {
                    println!("{json}");
                    DaemonExitCode::CleanShutdown.into()
                }
                Err(err) => {
                    eprintln!("failed to render configuration: {err:#}");
                    DaemonExitCode::RuntimeError.into()
                }
            },
            Err(err) => {
                eprintln!("configuration error: {err:#}");
                DaemonExitCode::ConfigError.into()
            }
        },
    }
}

fn load_and_validate() -> anyhow::Result<Config> {
    let config = settings::load()?;
    config.validate().context("configuration validation failed")?;
    Ok(config)
}

fn run_serve() -> ExitCode {
    let config = match load_and_validate() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            return DaemonExitCode::ConfigError.into();
        }
    };

    if let Err(err) = init_tracing(&config) {
        eprintln!("failed to initialize logging: {err:#}");
        return DaemonExitCode::ConfigError.into();
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to create tokio runtime");
            return DaemonExitCode::RuntimeError.into();
        }
    };

    match runtime.block_on(serve(config)) {
        Ok(()) => DaemonExitCode::CleanShutdown.into(),
        Err(err) => {
            error!("daemon error: {err:#}");
            DaemonExitCode::RuntimeError.into()
        }
    }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "starting whm2bunnyd");

    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());

    let client = Arc::new(
        BunnyClient::new(config.bunny.api_key.clone())?
            .with_base_url(config.bunny.base_url.clone())
            .with_retry_config(config.retry.clone()),
    );

    let state_store = Arc::new(
        StateStore::open(&config.state.path)
            .await
            .context("opening state store")?,
    );
    let snapshots = Arc::new(
        SnapshotStore::open(&config.state.snapshot_path)
            .await
            .context("opening snapshot store")?,
    );

    let transport: Option<Arc<dyn ChatTransport>> = if config.telegram.enabled {
        let telegram =
            TelegramTransport::new(config.telegram.bot_token.clone(), &config.telegram.chat_id)?;
        if let Err(err) = telegram.check().await {
            warn!(error = %err, "telegram credential probe failed, continuing anyway");
        }
        Some(Arc::new(telegram))
    } else {
        info!("telegram notifications disabled");
        None
    };

    let timezone = config
        .telegram
        .summary
        .timezone
        .parse()
        .unwrap_or(chrono_tz::Tz::UTC);
    let notifier = Arc::new(Notifier::new(
        transport,
        config.telegram.events.clone(),
        hostname.clone(),
        timezone,
    ));

    let provider: Arc<dyn whm2bunny_core::ProviderApi> = Arc::clone(&client) as Arc<dyn whm2bunny_core::ProviderApi>;

    let provisioner = Arc::new(Provisioner::new(
        Arc::clone(&provider),
        Arc::clone(&state_store),
        Arc::clone(&notifier),
        config.provision.clone(),
    ));

    let scheduler = Arc::new(Scheduler::new(
        provider,
        Arc::clone(&notifier),
        Arc::clone(&snapshots),
        config.telegram.summary.clone(),
        hostname,
    ));
    Arc::clone(&scheduler).start().await?;

    let app_state = Arc::new(server::AppState {
        provisioner: Arc::clone(&provisioner),
        state: Arc::clone(&state_store),
        validator: Validator::new(config.webhook.dns_checks),
        secret: config.webhook.secret.clone(),
        version: env!("CARGO_PKG_VERSION"),
        started_at: Instant::now(),
        debug: config.server.debug,
        checks: server::ReadyChecks::default(),
    });
    app_state.checks.set_provider(true);
    app_state.checks.set_notifier(true);
    app_state.checks.set_state(true);

    let router = server::router(Arc::clone(&app_state));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, debug = config.server.debug, "HTTP server listening");

    // Startup recovery: wait for the listener to settle, then walk the
    // unfinished records with pacing.
    let recovery = Arc::clone(&provisioner);
    tokio::spawn(async move {
        tokio::time::sleep(RECOVERY_STARTUP_DELAY).await;
        recovery.recover().await;
    });

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("shutdown signal received, stopping");

    let teardown = async {
        scheduler.stop().await;
        notifier.drain().await;
        if let Err(err) = state_store.sync().await {
            error!(error = %err, "failed to flush state store during shutdown");
        }
    };
    if tokio::time::timeout(SHUTDOWN_DEADLINE, teardown).await.is_err() {
        error!("shutdown deadline exceeded, forcing exit");
    }

    info!("whm2bunnyd stopped");
    Ok(())
}

/// Resolve when a termination signal arrives
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigquit = signal(SignalKind::quit()).expect("failed to install SIGQUIT handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigquit.recv() => info!("received SIGQUIT"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received CTRL-C");
}
