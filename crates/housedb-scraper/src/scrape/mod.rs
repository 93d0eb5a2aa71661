//! Scrape orchestration: listing pages, detail pages, and the merge into a
//! [`PropertySink`].

mod area;

pub use area::{scrape_area, AreaOptions, AreaReport};

use housedb_core::normalize;
use housedb_core::{MergeError, PropertyCandidate, PropertySink};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::ScrapeError;
use crate::extract::{extract, property_from_html, Container, ExtractContext};
use crate::fetch::ScraperSession;
use crate::stream::{values_from_html, ResolvedValue};

/// How much of each property is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ScrapeMode {
    /// Listing pages only: one request per page, latest sale per property.
    #[default]
    Fast,
    /// Visit at most this many detail pages; the rest keep listing data.
    DetailLimited(usize),
    /// Visit every property's detail page.
    DetailAll,
}

#[derive(Debug, Clone)]
pub struct PostcodeRequest {
    pub postcode: String,
    /// Listing pages to walk at most.
    pub pages: u32,
    pub mode: ScrapeMode,
    pub want_floorplans: bool,
    pub want_features: bool,
    pub max_properties: usize,
}

impl PostcodeRequest {
    #[must_use]
    pub fn new(postcode: impl Into<String>) -> Self {
        Self {
            postcode: postcode.into(),
            pages: 1,
            mode: ScrapeMode::Fast,
            want_floorplans: false,
            want_features: false,
            max_properties: 50,
        }
    }

    /// Floorplans and key features only exist on detail pages, so asking
    /// for either in fast mode visits every detail page.
    #[must_use]
    pub fn effective_mode(&self) -> ScrapeMode {
        match self.mode {
            ScrapeMode::Fast if self.want_floorplans || self.want_features => ScrapeMode::DetailAll,
            mode => mode,
        }
    }
}

/// A page, property or postcode that could not be scraped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub id: String,
    pub reason: String,
}

impl FailedItem {
    #[must_use]
    pub fn new(id: impl Into<String>, err: &ScrapeError) -> Self {
        Self {
            id: id.into(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostcodeReport {
    pub postcode: String,
    /// Properties merged into the sink.
    pub scraped: usize,
    /// Listing pages that yielded data.
    pub pages: u32,
    pub detail_visits: usize,
    pub sales_inserted: usize,
    pub failed: Vec<FailedItem>,
}

/// `{base}/house-prices/{POSTCODE}.html`, with `?page=N` past the first page.
#[must_use]
pub fn listing_url(base_url: &str, postcode: &str, page: u32) -> String {
    let url = format!(
        "{}/house-prices/{}.html",
        base_url.trim_end_matches('/'),
        normalize::postcode_for_url(postcode)
    );
    if page > 1 {
        format!("{url}?page={page}")
    } else {
        url
    }
}

async fn fetch_values(
    session: &ScraperSession,
    url: &str,
    cancel: &CancellationToken,
) -> Result<Vec<ResolvedValue>, ScrapeError> {
    let html = session.fetch(url, cancel).await?;
    Ok(values_from_html(&html)?)
}

/// Scrape one postcode's listing pages (and detail pages, depending on the
/// mode) and merge every property found into `sink`.
///
/// A failure on a later listing page or on a single detail page is
/// reported in [`PostcodeReport::failed`] and the scrape carries on; a
/// property whose detail page failed is still merged from its listing data.
///
/// # Errors
///
/// - [`ScrapeError::InvalidRequest`]: blank postcode or zero `max_properties`.
/// - [`ScrapeError::Fetch`] / [`ScrapeError::Decode`] / [`ScrapeError::Resolve`]:
///   the first listing page could not be read.
/// - [`ScrapeError::NoData`]: the listing holds no properties.
/// - [`ScrapeError::Merge`]: the sink is unavailable.
/// - [`ScrapeError::Cancelled`]: `cancel` fired.
pub async fn scrape_postcode<S: PropertySink>(
    session: &ScraperSession,
    sink: &S,
    request: &PostcodeRequest,
    cancel: &CancellationToken,
) -> Result<PostcodeReport, ScrapeError> {
    let postcode = request.postcode.trim();
    if postcode.is_empty() {
        return Err(ScrapeError::InvalidRequest {
            reason: "postcode is empty".to_string(),
        });
    }
    if request.max_properties == 0 {
        return Err(ScrapeError::InvalidRequest {
            reason: "max_properties must be at least 1".to_string(),
        });
    }

    let mut report = PostcodeReport {
        postcode: normalize::format_postcode(postcode),
        ..PostcodeReport::default()
    };

    let candidates = listing_candidates(session, request, &mut report, cancel).await?;
    if candidates.is_empty() {
        return Err(ScrapeError::NoData {
            url: listing_url(session.base_url(), postcode, 1),
        });
    }

    let detail_budget = match request.effective_mode() {
        ScrapeMode::Fast => 0,
        ScrapeMode::DetailLimited(n) => n,
        ScrapeMode::DetailAll => usize::MAX,
    };

    for candidate in candidates {
        if cancel.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }

        let candidate = match candidate.url.clone() {
            Some(url) if report.detail_visits < detail_budget => {
                report.detail_visits += 1;
                match scrape_property(session, &url, request.want_floorplans, cancel).await {
                    Ok(mut detailed) => {
                        detailed.absorb(candidate);
                        detailed
                    }
                    Err(ScrapeError::Cancelled) => return Err(ScrapeError::Cancelled),
                    Err(e) => {
                        tracing::warn!(%url, error = %e, "detail page failed, keeping listing data");
                        report.failed.push(FailedItem::new(url, &e));
                        candidate
                    }
                }
            }
            _ => candidate,
        };

        match sink.apply(&candidate).await {
            Ok(outcome) => {
                report.scraped += 1;
                report.sales_inserted += outcome.sales_inserted;
            }
            Err(MergeError::InvalidCandidate { reason }) => {
                report.failed.push(FailedItem {
                    id: candidate.address.clone(),
                    reason,
                });
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(
        postcode = %report.postcode,
        scraped = report.scraped,
        pages = report.pages,
        detail_visits = report.detail_visits,
        failed = report.failed.len(),
        "postcode scraped"
    );
    Ok(report)
}

async fn listing_candidates(
    session: &ScraperSession,
    request: &PostcodeRequest,
    report: &mut PostcodeReport,
    cancel: &CancellationToken,
) -> Result<Vec<PropertyCandidate>, ScrapeError> {
    let ctx = ExtractContext {
        base_url: Some(session.base_url().to_string()),
        postcode_hint: Some(report.postcode.clone()),
    };
    let mut found: Vec<PropertyCandidate> = Vec::new();

    for page in 1..=request.pages.max(1) {
        let url = listing_url(session.base_url(), &request.postcode, page);
        let values = match fetch_values(session, &url, cancel).await {
            Ok(values) => values,
            Err(e) if page == 1 || e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(%url, error = %e, "listing page failed, stopping pagination");
                report.failed.push(FailedItem::new(url, &e));
                break;
            }
        };

        let mut page_candidates = extract(&values, Container::Listing, &ctx);
        page_candidates.retain(|c| !found.iter().any(|f| f.address == c.address));
        page_candidates.truncate(request.max_properties.saturating_sub(found.len()));
        tracing::info!(
            postcode = %report.postcode,
            page,
            properties = page_candidates.len(),
            "listing page extracted"
        );
        if page_candidates.is_empty() {
            break;
        }
        report.pages += 1;
        found.extend(page_candidates);
        if found.len() >= request.max_properties {
            break;
        }
    }
    Ok(found)
}

/// Property on a detail page: the stream's view, with gaps filled from the
/// page markup. Without a usable stream the markup alone is used. The
/// address is empty when neither source names one.
#[must_use]
pub fn detail_from_html(html: &str, ctx: &ExtractContext) -> PropertyCandidate {
    let from_stream = match values_from_html(html) {
        Ok(values) => extract(&values, Container::Detail, ctx).into_iter().next(),
        Err(e) => {
            tracing::debug!(error = %e, "no usable stream on detail page, reading markup");
            None
        }
    };
    let from_markup = property_from_html(html, ctx);
    match from_stream {
        Some(mut candidate) => {
            candidate.absorb(from_markup);
            candidate
        }
        None => from_markup,
    }
}

/// Fetch one property's detail page. Stream data is taken first and the
/// page markup fills whatever the stream left out.
///
/// # Errors
///
/// [`ScrapeError::NoData`] when neither source names an address, plus
/// fetch failures and [`ScrapeError::Cancelled`].
pub async fn scrape_property(
    session: &ScraperSession,
    url: &str,
    want_floorplans: bool,
    cancel: &CancellationToken,
) -> Result<PropertyCandidate, ScrapeError> {
    let html = session.fetch(url, cancel).await?;
    let ctx = ExtractContext {
        base_url: Some(session.base_url().to_string()),
        postcode_hint: None,
    };

    let mut candidate = detail_from_html(&html, &ctx);
    if candidate.address.trim().is_empty() {
        return Err(ScrapeError::NoData {
            url: url.to_string(),
        });
    }
    if candidate.url.is_none() {
        candidate.url = Some(url.to_string());
    }
    if !want_floorplans {
        candidate.floorplan_urls.clear();
    }
    Ok(candidate)
}
