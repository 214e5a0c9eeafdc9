use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use timedial_core::config::Config;

mod chat;
mod doctor;
mod logging;

#[derive(Parser)]
#[command(
    name = "timedial",
    about = "Talk with figures from history, by text or by voice",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the backend proxy and serve the front-end
    Serve {
        /// Port to listen on (default: $PORT, then config, then 8080)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Chat with a persona in the terminal
    Chat {
        /// Persona id (omit to pick from the roster)
        #[arg(short, long)]
        persona: Option<String>,

        /// Route requests through a running backend proxy
        #[arg(long)]
        backend: Option<String>,
    },

    /// List the persona roster
    Personas,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose common issues
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path)?;

    logging::init(&config.logging.clone().unwrap_or_default(), cli.verbose);

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or_else(|| config.gateway_port());
            let (warnings, errors) = config.validate();
            for w in &warnings {
                tracing::warn!("{w}");
            }
            if !errors.is_empty() {
                anyhow::bail!("Invalid configuration: {}", errors.join("; "));
            }
            tracing::info!("Starting TimeDial gateway on port {port}");
            let state = Arc::new(timedial_gateway::GatewayState::from_config(Arc::new(config)));
            timedial_gateway::start_gateway(state, port).await?;
        }
        Commands::Chat { persona, backend } => {
            chat::run(config, persona, backend).await?;
        }
        Commands::Personas => {
            for p in config.roster().iter() {
                println!("{:<12} {:<24} {}", p.id, p.name, p.description());
            }
        }
        Commands::Doctor => {
            doctor::run(&config, &config_path).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("No config value at '{key}'"),
            },
            ConfigAction::Set { key, value } => {
                config.set_path(&key, &value)?;
                config.save(&config_path)?;
                println!("Set {key} in {}", config_path.display());
            }
        },
    }

    Ok(())
}
