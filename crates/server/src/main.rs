use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use taskmarket_core::{format_naira, naira};
use taskmarket_server::logging::init_logging;
use taskmarket_server::{AppState, Config};

#[derive(Parser)]
#[command(name = "taskmarket")]
#[command(about = "Taskmarket escrow and payouts service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve,
    /// Show the resolved configuration
    Config {
        /// Exit non-zero when the configuration is invalid
        #[arg(short, long)]
        validate: bool,
        /// Print as JSON (secrets redacted)
        #[arg(short, long)]
        json: bool,
    },
    /// Quote the fee for a withdrawal
    Quote {
        /// Amount in naira
        amount: i64,
        /// Treat the amount as kobo
        #[arg(short, long)]
        kobo: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = Config::load().context("failed to load configuration")?;
            init_logging(&config.log_filter, config.log_json)?;
            let state = AppState::new(config).context("failed to start marketplace")?;
            taskmarket_server::serve(state, shutdown_signal()).await?;
            Ok(())
        }
        Commands::Config { validate, json } => {
            let config = match Config::load() {
                Ok(config) => config,
                Err(e) if validate => bail!("configuration is invalid: {e}"),
                Err(e) => return Err(e).context("failed to load configuration"),
            };
            if json {
                println!("{}", config.to_json()?);
            } else {
                config.print_summary();
            }
            if validate {
                println!("Configuration is valid");
            }
            Ok(())
        }
        Commands::Quote { amount, kobo } => {
            let config = Config::load().context("failed to load configuration")?;
            let amount = if kobo { amount } else { naira(amount) };
            if amount < config.market.min_withdrawal {
                bail!(
                    "minimum withdrawal is {}",
                    format_naira(config.market.min_withdrawal)
                );
            }
            let quote = config.market.withdrawal_fees.quote(amount)?;
            println!("  Amount:  {}", format_naira(quote.amount));
            println!("  Fee:     {}", format_naira(quote.fee));
            println!("  Net:     {}", format_naira(quote.net_amount));
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
