//! Concurrent batch over many postcodes.

use futures::stream::{self, StreamExt};
use housedb_core::normalize;
use housedb_core::{MergeError, PropertySink};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{scrape_postcode, FailedItem, PostcodeReport, PostcodeRequest, ScrapeMode};
use crate::error::ScrapeError;
use crate::fetch::ScraperSession;

#[derive(Debug, Clone)]
pub struct AreaOptions {
    pub pages: u32,
    pub mode: ScrapeMode,
    pub want_floorplans: bool,
    pub want_features: bool,
    pub max_properties: usize,
    /// Scrape even when the postcode's data is fresh.
    pub force: bool,
    pub freshness_days: u32,
}

impl Default for AreaOptions {
    fn default() -> Self {
        Self {
            pages: 1,
            mode: ScrapeMode::Fast,
            want_floorplans: false,
            want_features: false,
            max_properties: 50,
            force: false,
            freshness_days: 7,
        }
    }
}

impl AreaOptions {
    fn request(&self, postcode: &str) -> PostcodeRequest {
        PostcodeRequest {
            postcode: postcode.to_string(),
            pages: self.pages,
            mode: self.mode,
            want_floorplans: self.want_floorplans,
            want_features: self.want_features,
            max_properties: self.max_properties,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AreaReport {
    pub scraped: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<FailedItem>,
    pub total_properties: usize,
    /// Set when the batch stopped early; the lists hold what finished.
    pub cancelled: bool,
}

enum Outcome {
    Scraped(PostcodeReport),
    Skipped,
    Failed(ScrapeError),
}

/// Scrape every postcode with one sequential lane per session. Postcode `i`
/// goes to session `i % sessions.len()`; a session starts its next postcode
/// only after the previous one finished, so it keeps its own request pacing.
///
/// Postcodes with data newer than `freshness_days` are skipped unless
/// `force` is set. Per-postcode failures are collected; cancellation
/// returns the partial report with `cancelled` set.
///
/// # Errors
///
/// [`ScrapeError::InvalidRequest`] without sessions, and
/// [`ScrapeError::Merge`] when the sink becomes unavailable, which stops
/// the whole batch.
pub async fn scrape_area<S: PropertySink>(
    sessions: &[ScraperSession],
    sink: &S,
    postcodes: &[String],
    options: &AreaOptions,
    cancel: &CancellationToken,
) -> Result<AreaReport, ScrapeError> {
    if sessions.is_empty() {
        return Err(ScrapeError::InvalidRequest {
            reason: "at least one scraper session is required".to_string(),
        });
    }

    let mut unique: Vec<String> = Vec::with_capacity(postcodes.len());
    for postcode in postcodes {
        let formatted = normalize::format_postcode(postcode.trim());
        if !formatted.is_empty() && !unique.contains(&formatted) {
            unique.push(formatted);
        }
    }

    let batch = cancel.child_token();
    let lanes = sessions.iter().enumerate().map(|(lane, session)| {
        let batch = &batch;
        let assigned = unique.iter().skip(lane).step_by(sessions.len());
        Box::pin(stream::iter(assigned).then(move |postcode| async move {
            let outcome = scrape_one(session, sink, postcode, options, batch).await;
            (postcode, outcome)
        }))
    });
    let mut outcomes = stream::select_all(lanes);

    let mut report = AreaReport::default();
    while let Some((postcode, outcome)) = outcomes.next().await {
        match outcome {
            Outcome::Scraped(postcode_report) => {
                report.total_properties += postcode_report.scraped;
                report.failed.extend(postcode_report.failed);
                report.scraped.push(postcode.clone());
            }
            Outcome::Skipped => report.skipped.push(postcode.clone()),
            Outcome::Failed(ScrapeError::Cancelled) => report.cancelled = true,
            Outcome::Failed(e) if e.is_fatal() => {
                tracing::error!(%postcode, error = %e, "store unavailable, aborting batch");
                batch.cancel();
                return Err(e);
            }
            Outcome::Failed(e) => {
                tracing::warn!(%postcode, error = %e, "postcode failed");
                report.failed.push(FailedItem::new(postcode.clone(), &e));
            }
        }
    }

    report.cancelled |= cancel.is_cancelled();
    tracing::info!(
        scraped = report.scraped.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        total_properties = report.total_properties,
        cancelled = report.cancelled,
        "area scrape finished"
    );
    Ok(report)
}

async fn scrape_one<S: PropertySink>(
    session: &ScraperSession,
    sink: &S,
    postcode: &str,
    options: &AreaOptions,
    cancel: &CancellationToken,
) -> Outcome {
    if cancel.is_cancelled() {
        return Outcome::Failed(ScrapeError::Cancelled);
    }

    if !options.force && options.freshness_days > 0 {
        let max_age = chrono::Duration::days(i64::from(options.freshness_days));
        match sink.is_postcode_fresh(postcode, max_age).await {
            Ok(true) => {
                tracing::info!(postcode, "postcode data is fresh, skipping");
                return Outcome::Skipped;
            }
            Ok(false) => {}
            Err(e) => return Outcome::Failed(MergeError::StoreUnavailable(e).into()),
        }
    }

    match scrape_postcode(session, sink, &options.request(postcode), cancel).await {
        Ok(report) => Outcome::Scraped(report),
        Err(e) => Outcome::Failed(e),
    }
}
