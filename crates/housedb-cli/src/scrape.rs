//! Scrape command handlers for the CLI.
//!
//! Reports are printed to stdout as JSON; progress goes to the tracing
//! output on stderr. Per-page and per-property failures are part of the
//! report, not process errors.

use clap::{Args, Subcommand};
use housedb_core::{AppConfig, PropertySink};
use housedb_db::PgStore;
use housedb_scraper::{
    scrape_area, scrape_postcode, scrape_property, AreaOptions, FetchConfig, PostcodeRequest,
    ScrapeMode, ScraperSession,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Sub-commands available under `scrape`.
#[derive(Debug, Subcommand)]
pub enum ScrapeCommands {
    /// Scrape the sold-price listing of one postcode
    Postcode {
        /// Postcode, with or without the inner space
        postcode: String,
        #[command(flatten)]
        options: ListingArgs,
    },
    /// Scrape many postcodes concurrently, skipping ones scraped recently
    Area {
        /// Postcodes to scrape
        #[arg(required = true, num_args = 1..)]
        postcodes: Vec<String>,
        #[command(flatten)]
        options: ListingArgs,
        /// Scrape even when stored data is fresher than the freshness window
        #[arg(long)]
        force: bool,
        /// Freshness window in days (defaults to HOUSEDB_SCRAPER_FRESHNESS_DAYS)
        #[arg(long)]
        freshness_days: Option<u32>,
    },
    /// Scrape a single property detail page
    Property {
        /// Absolute URL of the detail page
        url: String,
        /// Keep floorplan image URLs
        #[arg(long)]
        floorplans: bool,
        /// Merge the result into the database instead of only printing it
        #[arg(long)]
        save: bool,
    },
}

/// Flags shared by the listing-driven scrapes.
#[derive(Debug, Clone, Args)]
pub struct ListingArgs {
    /// Listing pages to walk at most
    #[arg(long, default_value_t = 1)]
    pub pages: u32,
    /// Visit at most this many property detail pages
    #[arg(long, conflicts_with = "detail_all")]
    pub detail: Option<usize>,
    /// Visit every property's detail page
    #[arg(long)]
    pub detail_all: bool,
    /// Keep floorplan image URLs (visits detail pages)
    #[arg(long)]
    pub floorplans: bool,
    /// Keep key features (visits detail pages)
    #[arg(long)]
    pub features: bool,
    /// Stop after this many properties (defaults to HOUSEDB_SCRAPER_MAX_PROPERTIES)
    #[arg(long)]
    pub max_properties: Option<usize>,
}

impl ListingArgs {
    pub(crate) fn mode(&self) -> ScrapeMode {
        match (self.detail, self.detail_all) {
            (_, true) => ScrapeMode::DetailAll,
            (Some(limit), false) => ScrapeMode::DetailLimited(limit),
            (None, false) => ScrapeMode::Fast,
        }
    }

    fn request(&self, postcode: &str, config: &AppConfig) -> PostcodeRequest {
        PostcodeRequest {
            postcode: postcode.to_string(),
            pages: self.pages,
            mode: self.mode(),
            want_floorplans: self.floorplans,
            want_features: self.features,
            max_properties: self.max_properties.unwrap_or(config.scraper_max_properties),
        }
    }
}

fn build_session(config: &AppConfig) -> anyhow::Result<ScraperSession> {
    ScraperSession::new(&config.source_base_url, FetchConfig::from_app_config(config))
        .map_err(|e| anyhow::anyhow!("failed to build scraper session: {e}"))
}

/// One independent session per configured slot; at least one.
fn build_sessions(config: &AppConfig) -> anyhow::Result<Vec<ScraperSession>> {
    (0..config.scraper_sessions.max(1))
        .map(|_| build_session(config))
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Dispatch one `scrape` sub-command.
///
/// # Errors
///
/// Returns an error if the session or database pool cannot be built, or if
/// the scrape fails as a whole (first listing page unreachable, store
/// unavailable, cancelled single-postcode scrape).
pub(crate) async fn run_scrape(
    config: &AppConfig,
    command: ScrapeCommands,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    match command {
        ScrapeCommands::Postcode { postcode, options } => {
            let store = PgStore::new(crate::connect(config).await?);
            let session = build_session(config)?;
            let request = options.request(&postcode, config);
            let report = scrape_postcode(&session, &store, &request, cancel).await?;
            tracing::info!(
                postcode = %report.postcode,
                scraped = report.scraped,
                failed = report.failed.len(),
                "postcode scrape finished"
            );
            print_json(&report)
        }
        ScrapeCommands::Area {
            postcodes,
            options,
            force,
            freshness_days,
        } => {
            let store = PgStore::new(crate::connect(config).await?);
            let sessions = build_sessions(config)?;
            let area = AreaOptions {
                pages: options.pages,
                mode: options.mode(),
                want_floorplans: options.floorplans,
                want_features: options.features,
                max_properties: options.max_properties.unwrap_or(config.scraper_max_properties),
                force,
                freshness_days: freshness_days.unwrap_or(config.scraper_freshness_days),
            };
            let report = scrape_area(&sessions, &store, &postcodes, &area, cancel).await?;
            if report.cancelled {
                tracing::warn!(
                    scraped = report.scraped.len(),
                    "area scrape cancelled, report is partial"
                );
            }
            print_json(&report)
        }
        ScrapeCommands::Property {
            url,
            floorplans,
            save,
        } => {
            let session = build_session(config)?;
            let candidate = scrape_property(&session, &url, floorplans, cancel).await?;
            if save {
                let store = PgStore::new(crate::connect(config).await?);
                let outcome = store.apply(&candidate).await?;
                tracing::info!(
                    property_id = outcome.property_id,
                    created = outcome.created,
                    sales_inserted = outcome.sales_inserted,
                    "saved property"
                );
            }
            print_json(&candidate)
        }
    }
}
