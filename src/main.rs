pub mod cli;
pub mod config;
pub mod controller;
pub mod state;
pub mod transport;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::cli::registry::{Arity, CommandError, CommandResult};
use crate::cli::{ControllerCli, SessionEnd};
use crate::config::{AppConfig, TransportKind};
use crate::controller::{ControllerHandle, ControllerSettings, EventCollector};
use crate::state::ControllerState;
use crate::transport::{LogTransport, MqttTransport, Transport};

/// Drives an emulated Switch controller from a gamepad and a command console
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Config file, defaults to <config dir>/padbridge/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the transport kind of the config file
    #[arg(short, long, value_enum)]
    transport: Option<TransportKind>,

    /// Overrides the log level of the config file
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    setup()?;
    let args = Args::parse();

    let explicit_path = args.config.is_some();
    let path = args.config.unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::ensure_default(&path)?;
    if let Some(kind) = args.transport {
        config.transport.kind = kind;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    config.validate()?;

    setup_logging(&config.log_level);
    if !explicit_path && dirs::config_dir().is_none() {
        warn!("Could not determine config directory, using {}", path.display());
    }
    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();
    let result = runtime.block_on(local.run_until(run_session(config)));

    // A pending stdin read would otherwise keep the runtime from shutting down
    runtime.shutdown_background();
    result
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_session(config: AppConfig) -> Result<()> {
    let transport = connect_transport(&config).await?;
    info!("Using {} transport", transport.name());

    let state = ControllerState::new(config.controller.kind, transport).into_shared();
    let session = CancellationToken::new();

    let settings = ControllerSettings::from(&config);
    let collector = settings.collector.clone();
    let controller = match ControllerHandle::spawn(
        settings,
        move || EventCollector::create(collector)?.initialize(),
        &state,
        session.clone(),
    )
    .await
    {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Gamepad input unavailable, continuing with the console only: {}", e);
            None
        }
    };

    let push_hold = Duration::from_millis(config.controller.push_hold_ms);
    let mut cli = ControllerCli::new(state, push_hold, std::io::stdout());
    cli.add_command(
        "wait",
        Arity::exactly(1),
        Some("wait <ms> - Pauses the chain for the given milliseconds."),
        wait,
    )?;

    let input = BufReader::new(tokio::io::stdin());
    match cli.run(input, &config.console.prompt, &session).await {
        SessionEnd::Exit => info!("Session closed by user"),
        SessionEnd::InputClosed => info!("Console input closed, ending session"),
        SessionEnd::Disconnected => warn!("Session ended, transport is no longer connected"),
    }
    if let Some(controller) = controller {
        debug!(
            "Gamepad pipeline at session end: polling {}, dispatching {}",
            controller.is_polling(),
            controller.is_dispatching()
        );
    }
    Ok(())
}

async fn wait(args: Vec<String>) -> CommandResult {
    let arg = args.first().map(String::as_str).unwrap_or_default();
    let ms: u64 = arg
        .parse()
        .map_err(|_| CommandError::InvalidArgument(format!("Unexpected duration \"{}\"", arg)))?;
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(None)
}

async fn connect_transport(config: &AppConfig) -> Result<Rc<dyn Transport>> {
    match config.transport.kind {
        TransportKind::Log => Ok(Rc::new(LogTransport::new())),
        TransportKind::Mqtt => {
            let transport = MqttTransport::connect(&config.transport.mqtt)
                .await
                .map_err(|e| eyre!("Failed to connect to MQTT broker: {}", e))?;
            Ok(Rc::new(transport))
        }
    }
}
