use thiserror::Error;

use crate::property::PropertyCandidate;
use crate::store::{ApplyOutcome, PropertyRecord, PropertyStore, SaleInsert, StoreError};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("invalid candidate: {reason}")]
    InvalidCandidate { reason: String },

    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
}

/// Reconcile a freshly extracted candidate with the store.
///
/// The candidate is normalized first; an empty address is rejected before
/// the store is touched. An existing record keeps every field the new
/// candidate leaves empty. Each sale goes through
/// [`PropertyStore::insert_sale_if_absent`], so re-applying the same
/// candidate only ever counts its sales as skipped.
///
/// # Errors
///
/// Returns [`MergeError::InvalidCandidate`] for an empty address and
/// [`MergeError::StoreUnavailable`] when the store fails.
pub async fn apply<S>(store: &mut S, candidate: &PropertyCandidate) -> Result<ApplyOutcome, MergeError>
where
    S: PropertyStore + Send,
{
    let candidate = candidate.normalized();
    if candidate.address.is_empty() {
        return Err(MergeError::InvalidCandidate {
            reason: "address is empty".to_string(),
        });
    }

    let incoming = PropertyRecord::from(&candidate);
    let existing = store.find_by_address(&candidate.address).await?;
    let created = existing.is_none();
    let record = match existing {
        Some(persisted) => merge_record(persisted.record, incoming),
        None => incoming,
    };
    let persisted = store.upsert_property(&record).await?;

    let mut outcome = ApplyOutcome {
        property_id: persisted.id,
        created,
        sales_inserted: 0,
        sales_skipped: 0,
    };
    for sale in &candidate.sales {
        match store.insert_sale_if_absent(persisted.id, sale).await? {
            SaleInsert::Inserted => outcome.sales_inserted += 1,
            SaleInsert::AlreadyExists => outcome.sales_skipped += 1,
        }
    }

    tracing::debug!(
        address = %candidate.address,
        property_id = outcome.property_id,
        created = outcome.created,
        sales_inserted = outcome.sales_inserted,
        sales_skipped = outcome.sales_skipped,
        "merged property candidate"
    );
    Ok(outcome)
}

/// Field-by-field merge where a new value replaces the old one only when it
/// is present (lists: only when non-empty).
#[must_use]
pub fn merge_record(old: PropertyRecord, new: PropertyRecord) -> PropertyRecord {
    PropertyRecord {
        address: new.address,
        postcode: new.postcode.or(old.postcode),
        property_type: new.property_type.or(old.property_type),
        bedrooms: new.bedrooms.or(old.bedrooms),
        bathrooms: new.bathrooms.or(old.bathrooms),
        url: new.url.or(old.url),
        extra_features: prefer_non_empty(new.extra_features, old.extra_features),
        floorplan_urls: prefer_non_empty(new.floorplan_urls, old.floorplan_urls),
    }
}

fn prefer_non_empty(new: Vec<String>, old: Vec<String>) -> Vec<String> {
    if new.is_empty() {
        old
    } else {
        new
    }
}

#[cfg(test)]
#[path = "merge_test.rs"]
mod tests;
