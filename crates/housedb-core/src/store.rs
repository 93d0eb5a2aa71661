//! Persistence contract consumed by the merge engine and scrape drivers.
//!
//! [`PropertyStore`] is the key-lookup-and-write surface the merge engine
//! needs; backends implement it over whatever unit of work they use (a
//! Postgres transaction, a locked in-memory table set). [`PropertySink`] is
//! the coarser surface orchestration talks to: one call applies one
//! candidate atomically.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::merge::MergeError;
use crate::property::{PropertyCandidate, SaleCandidate};

/// Property fields as written to the store (a candidate minus its sales).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropertyRecord {
    pub address: String,
    pub postcode: Option<String>,
    pub property_type: Option<String>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub url: Option<String>,
    pub extra_features: Vec<String>,
    pub floorplan_urls: Vec<String>,
}

impl From<&PropertyCandidate> for PropertyRecord {
    fn from(candidate: &PropertyCandidate) -> Self {
        Self {
            address: candidate.address.clone(),
            postcode: candidate.postcode.clone(),
            property_type: candidate.property_type.clone(),
            bedrooms: candidate.bedrooms,
            bathrooms: candidate.bathrooms,
            url: candidate.url.clone(),
            extra_features: candidate.extra_features.clone(),
            floorplan_urls: candidate.floorplan_urls.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedProperty {
    pub id: i64,
    pub record: PropertyRecord,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistedSale {
    pub id: i64,
    pub property_id: i64,
    pub date_sold: String,
    pub price: String,
    pub price_numeric: Option<i64>,
    pub date_sold_iso: Option<NaiveDate>,
    pub price_change_pct: Option<String>,
    pub property_type: Option<String>,
    pub tenure: Option<String>,
}

impl PersistedSale {
    #[must_use]
    pub fn from_candidate(id: i64, property_id: i64, sale: &SaleCandidate) -> Self {
        Self {
            id,
            property_id,
            date_sold: sale.date_sold.clone(),
            price: sale.price.clone(),
            price_numeric: sale.price_numeric(),
            date_sold_iso: sale.date_sold_iso(),
            price_change_pct: sale.price_change_pct.clone(),
            property_type: sale.property_type.clone(),
            tenure: sale.tenure.clone(),
        }
    }
}

/// Outcome of an insert guarded by the `(property, date_sold, price)`
/// uniqueness rule. A duplicate is a normal result, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaleInsert {
    Inserted,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub property_id: i64,
    pub created: bool,
    pub sales_inserted: usize,
    pub sales_skipped: usize,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("property {0} does not exist")]
    MissingProperty(i64),
}

impl StoreError {
    pub fn unavailable(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Unavailable(Box::new(err))
    }
}

/// Unit-of-work view of the store used by [`crate::merge::apply`].
pub trait PropertyStore {
    fn find_by_address(
        &mut self,
        address: &str,
    ) -> impl Future<Output = Result<Option<PersistedProperty>, StoreError>> + Send;

    /// Insert or replace the record keyed by its address, refreshing its
    /// update timestamp.
    fn upsert_property(
        &mut self,
        record: &PropertyRecord,
    ) -> impl Future<Output = Result<PersistedProperty, StoreError>> + Send;

    /// Insert a sale unless one with the same identity already exists for
    /// the property. A duplicate must not undo earlier writes in the same
    /// unit of work.
    fn insert_sale_if_absent(
        &mut self,
        property_id: i64,
        sale: &SaleCandidate,
    ) -> impl Future<Output = Result<SaleInsert, StoreError>> + Send;
}

/// Shared handle the scrape drivers write through.
pub trait PropertySink: Send + Sync {
    /// Merge one candidate as a single bounded transaction.
    fn apply(
        &self,
        candidate: &PropertyCandidate,
    ) -> impl Future<Output = Result<ApplyOutcome, MergeError>> + Send;

    /// Whether any property with this postcode was written within `max_age`.
    fn is_postcode_fresh(
        &self,
        postcode: &str,
        max_age: chrono::Duration,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}
