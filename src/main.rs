//! Bulk Sender CLI - main entry point
//!
//! Usage:
//!   bulk_sender run                 - start the paced sending loop
//!   bulk_sender status              - check gateway account status
//!   bulk_sender validate <number>   - validate a single number
//!   bulk_sender pending             - show what is still left to send

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use whatsify_bulk_sender::{normalize_number, Config, Dispatcher, SendState, WhatsifyClient};

#[derive(Parser)]
#[command(name = "bulk_sender")]
#[command(about = "WhatsApp Bulk Media Sender", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the paced sending loop (ctrl-c to stop)
    Run,

    /// Check gateway account status
    Status,

    /// Validate a single phone number against the gateway
    Validate {
        /// Phone number, with or without leading +
        number: String,
    },

    /// Show pending recipients (numbers file minus sent and excluded)
    Pending {
        /// How many pending numbers to print
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("bulk_sender=info".parse()?)
                .add_directive("whatsify_bulk_sender=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Run => run(config).await?,

        Commands::Status => {
            let client = client_from(&config)?;
            match client.account_status().await {
                Ok(data) => {
                    println!("{}", serde_json::to_string_pretty(&data)?);
                }
                Err(e) => {
                    error!(error = %e, "Account status check failed");
                    std::process::exit(1);
                }
            }
        }

        Commands::Validate { number } => {
            let client = client_from(&config)?;
            let normalized = normalize_number(&number);
            if client.validate_number(&number).await? {
                println!("{} is on WhatsApp", normalized);
            } else {
                println!("{} is NOT on WhatsApp", normalized);
            }
        }

        Commands::Pending { limit } => {
            let state = SendState::load(&config.sent_log, &config.failed_log)?;
            let pending = state.pending(&config.numbers_file)?;
            println!(
                "Sent: {} | Excluded: {} | Pending: {}",
                state.sent_count(),
                state.excluded_count(),
                pending.len()
            );
            for number in pending.iter().take(limit) {
                println!("{}", number);
            }
        }
    }

    Ok(())
}

fn client_from(config: &Config) -> Result<WhatsifyClient> {
    Ok(WhatsifyClient::new(
        &config.base_url,
        &config.api_secret,
        &config.account_id,
        config.timeout_secs,
    )?)
}

async fn run(config: Config) -> Result<()> {
    info!("WhatsApp Bulk Sender started");
    info!(
        numbers = %config.numbers_file.display(),
        media = %config.media_file.display(),
        min_delay = config.min_delay_secs,
        max_delay = config.max_delay_secs,
        "Configuration loaded"
    );

    let dispatcher = Dispatcher::from_config(&config)?;
    info!(
        sent = dispatcher.sent_count(),
        excluded = dispatcher.excluded_count(),
        "Send state restored"
    );

    if let Err(e) = dispatcher.preflight().await {
        error!(error = %e, "Startup check failed");
        std::process::exit(1);
    }

    tokio::select! {
        _ = dispatcher.run() => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("Shutting down");
        }
    }

    info!(
        sent = dispatcher.sent_count(),
        excluded = dispatcher.excluded_count(),
        "Final stats"
    );

    Ok(())
}
