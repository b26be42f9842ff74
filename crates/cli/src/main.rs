mod config_commands;
mod key_commands;
mod runtime;
mod secret_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use custodian_config::{CustodianConfig, Severity, check_config};

#[derive(Parser)]
#[command(name = "custodian", about = "Custodian: envelope-encryption key vault")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./custodian.toml and
    /// ~/.config/custodian/).
    #[arg(long, global = true, env = "CUSTODIAN_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default when no subcommand is provided).
    Serve {
        /// Address to bind to (overrides config value).
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides config value).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Master key management.
    Keys {
        #[command(subcommand)]
        action: key_commands::KeysAction,
    },
    /// Finish migrating stored envelopes to the active master key.
    Rotate,
    /// Store and read owner secrets.
    Secrets {
        #[command(subcommand)]
        action: secret_commands::SecretsAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

/// Logs go to stderr; stdout is reserved for command output.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Validate config, open the vault, finish any pending rotation, then serve.
async fn serve(
    config: CustodianConfig,
    bind: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let errors: Vec<String> = check_config(&config)
        .into_iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| format!("{}: {}", d.path, d.message))
        .collect();
    if !errors.is_empty() {
        anyhow::bail!(
            "refusing to start with an invalid config:\n  {}",
            errors.join("\n  ")
        );
    }

    let vault = runtime::open_vault(&config).await?;

    if !vault.is_initialized().await? {
        warn!("no master key yet; /encrypt fails until `custodian keys add` is run");
    } else if config.vault.resume_rotation_on_start {
        let report = vault.resume_rotation().await?;
        if report.migrated > 0 || !report.is_complete() {
            key_commands::print_report(&report);
        }
    }

    let bind = bind.unwrap_or(config.server.bind);
    let port = port.unwrap_or(config.server.port);
    custodian_gateway::serve(vault, &bind, port).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "custodian starting");

    let config_path = cli.config.as_deref();

    match cli.command {
        None => serve(runtime::load_config(config_path)?, None, None).await,
        Some(Commands::Serve { bind, port }) => {
            serve(runtime::load_config(config_path)?, bind, port).await
        },
        Some(Commands::Keys { action }) => {
            key_commands::handle_keys(&runtime::load_config(config_path)?, action).await
        },
        Some(Commands::Rotate) => {
            key_commands::handle_rotate(&runtime::load_config(config_path)?).await
        },
        Some(Commands::Secrets { action }) => {
            secret_commands::handle_secrets(&runtime::load_config(config_path)?, action).await
        },
        Some(Commands::Config { action }) => config_commands::handle_config(config_path, action),
    }
}
