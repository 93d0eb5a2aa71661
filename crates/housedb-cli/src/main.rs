mod query;
mod scrape;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::query::{run_inspect, run_show};
use crate::scrape::{run_scrape, ScrapeCommands};

#[derive(Debug, Parser)]
#[command(name = "housedb-cli")]
#[command(about = "Sold house price scraper and store")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Scrape sold prices into the database
    Scrape {
        #[command(subcommand)]
        command: ScrapeCommands,
    },
    /// Print stored properties and sales for a postcode
    Show {
        /// Postcode, with or without the inner space
        postcode: String,
        /// Include each property's full sale history
        #[arg(long)]
        sales: bool,
    },
    /// Decode a saved page and print what would be extracted, without a database
    Inspect {
        /// Path to a saved HTML page
        file: std::path::PathBuf,
        /// Treat the page as a property detail page instead of a listing
        #[arg(long)]
        detail: bool,
        /// Origin used to absolutize relative URLs
        #[arg(long)]
        base_url: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Token cancelled on the first Ctrl-C. In-flight scrapes stop at their next
/// cancellation point and report what they finished.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("received ctrl-c, cancelling scrape");
                trigger.cancel();
            }
            Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c"),
        }
    });
    token
}

async fn connect(config: &housedb_core::AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool_config = housedb_db::PoolConfig::from_app_config(config);
    housedb_db::connect_pool(&config.database_url, pool_config)
        .await
        .context("failed to connect to database")
}

/// Configuration for the commands that touch the network or the database;
/// tracing is initialised from its log level.
fn load_config() -> anyhow::Result<housedb_core::AppConfig> {
    let config = housedb_core::load_app_config()?;
    init_tracing(&config.log_level)?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Db { command }) => {
            let config = load_config()?;
            let pool = connect(&config).await?;
            match command {
                DbCommands::Ping => {
                    housedb_db::ping(&pool).await?;
                    println!("database ok");
                }
                DbCommands::Migrate => {
                    let applied = housedb_db::run_migrations(&pool).await?;
                    println!("applied {applied} migration(s)");
                }
            }
        }
        Some(Commands::Scrape { command }) => {
            let config = load_config()?;
            let cancel = cancel_on_ctrl_c();
            run_scrape(&config, command, &cancel).await?;
        }
        Some(Commands::Show { postcode, sales }) => {
            let config = load_config()?;
            let pool = connect(&config).await?;
            run_show(&pool, &postcode, sales).await?;
        }
        // Works on a local file: no database and no complete environment.
        Some(Commands::Inspect {
            file,
            detail,
            base_url,
        }) => {
            init_tracing("info")?;
            run_inspect(&file, detail, base_url.as_deref())?;
        }
        None => {
            Cli::command().print_help()?;
        }
    }

    Ok(())
}
