mod api;
mod router;
mod sweep;

use clap::{Parser, Subcommand};
use dhikra_core::config;
use dhikra_core::traits::{IntentParser, Messenger};
use dhikra_gateway::WhatsAppGateway;
use dhikra_intent::IntentExtractor;
use dhikra_store::Store;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "dhikra",
    version,
    about = "Dhikra — WhatsApp second-brain assistant"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server.
    Start,
    /// Check configuration and storage health.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Start => {
            let cfg = config::load(&cli.config)?;

            if cfg.whatsapp.access_token.is_empty() {
                anyhow::bail!(
                    "WhatsApp access token is empty. Set it in config.toml or the \
                     DHIKRA_WHATSAPP_TOKEN env var."
                );
            }
            if cfg.whatsapp.verify_token.is_empty() {
                anyhow::bail!(
                    "WhatsApp verify token is empty. Set it in config.toml or the \
                     DHIKRA_VERIFY_TOKEN env var."
                );
            }

            let store = Store::new(&cfg.store.db_path).await?;
            let messenger: Arc<dyn Messenger> = Arc::new(WhatsAppGateway::new(&cfg.whatsapp));
            let parser: Arc<dyn IntentParser> = Arc::new(IntentExtractor::from_config(&cfg.ai)?);

            let command_router = Arc::new(router::Router::new(
                store.clone(),
                Arc::clone(&messenger),
                parser,
                cfg.app.clone(),
                cfg.sweep.clone(),
            ));

            let state = api::ApiState::new(
                command_router,
                store,
                messenger,
                cfg.sweep.clone(),
                cfg.app.utc_offset()?,
                cfg.whatsapp.verify_token.clone(),
                cfg.server.cron_secret.clone(),
            );

            println!("Dhikra — starting webhook server...");
            api::serve(&cfg.server, state).await?;
        }
        Commands::Status => {
            let cfg = config::load(&cli.config)?;
            println!("Dhikra — Status Check\n");
            println!("Config: {}", cli.config);
            println!("Model: {}", cfg.ai.model);
            println!(
                "WhatsApp: {}",
                if cfg.whatsapp.access_token.is_empty() {
                    "missing access token"
                } else {
                    "configured"
                }
            );
            println!(
                "Cron auth: {}",
                if cfg.server.cron_secret.is_empty() {
                    "disabled"
                } else {
                    "enabled"
                }
            );

            match Store::new(&cfg.store.db_path).await {
                Ok(_) => println!("Store: ok ({})", cfg.store.db_path),
                Err(e) => println!("Store: FAILED ({e})"),
            }
        }
    }

    Ok(())
}
