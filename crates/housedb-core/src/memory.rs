//! In-process store used by tests and dry runs.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::merge::{self, MergeError};
use crate::normalize;
use crate::property::{PropertyCandidate, SaleCandidate};
use crate::store::{
    ApplyOutcome, PersistedProperty, PersistedSale, PropertyRecord, PropertySink, PropertyStore,
    SaleInsert, StoreError,
};

#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    properties: Vec<PersistedProperty>,
    sales: Vec<PersistedSale>,
    next_property_id: i64,
    next_sale_id: i64,
}

impl PropertyStore for MemoryTables {
    async fn find_by_address(
        &mut self,
        address: &str,
    ) -> Result<Option<PersistedProperty>, StoreError> {
        Ok(self
            .properties
            .iter()
            .find(|p| p.record.address == address)
            .cloned())
    }

    async fn upsert_property(
        &mut self,
        record: &PropertyRecord,
    ) -> Result<PersistedProperty, StoreError> {
        let now = Utc::now();
        if let Some(existing) = self
            .properties
            .iter_mut()
            .find(|p| p.record.address == record.address)
        {
            existing.record = record.clone();
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        self.next_property_id += 1;
        let persisted = PersistedProperty {
            id: self.next_property_id,
            record: record.clone(),
            updated_at: now,
        };
        self.properties.push(persisted.clone());
        Ok(persisted)
    }

    async fn insert_sale_if_absent(
        &mut self,
        property_id: i64,
        sale: &SaleCandidate,
    ) -> Result<SaleInsert, StoreError> {
        if !self.properties.iter().any(|p| p.id == property_id) {
            return Err(StoreError::MissingProperty(property_id));
        }
        let duplicate = self.sales.iter().any(|s| {
            s.property_id == property_id && s.date_sold == sale.date_sold && s.price == sale.price
        });
        if duplicate {
            return Ok(SaleInsert::AlreadyExists);
        }
        self.next_sale_id += 1;
        self.sales.push(PersistedSale::from_candidate(
            self.next_sale_id,
            property_id,
            sale,
        ));
        Ok(SaleInsert::Inserted)
    }
}

/// [`PropertySink`] over [`MemoryTables`]. Each `apply` holds the lock for
/// its whole merge and rolls the tables back if the merge fails.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn properties(&self) -> Vec<PersistedProperty> {
        self.tables.lock().await.properties.clone()
    }

    pub async fn property_by_address(&self, address: &str) -> Option<PersistedProperty> {
        let address = normalize::normalize_address(address);
        self.tables
            .lock()
            .await
            .properties
            .iter()
            .find(|p| p.record.address == address)
            .cloned()
    }

    pub async fn sales_for(&self, property_id: i64) -> Vec<PersistedSale> {
        self.tables
            .lock()
            .await
            .sales
            .iter()
            .filter(|s| s.property_id == property_id)
            .cloned()
            .collect()
    }

    pub async fn sale_count(&self) -> usize {
        self.tables.lock().await.sales.len()
    }

    /// Overwrite a property's update timestamp, for exercising freshness.
    pub async fn set_updated_at(&self, address: &str, at: DateTime<Utc>) -> bool {
        let address = normalize::normalize_address(address);
        let mut tables = self.tables.lock().await;
        match tables
            .properties
            .iter_mut()
            .find(|p| p.record.address == address)
        {
            Some(p) => {
                p.updated_at = at;
                true
            }
            None => false,
        }
    }
}

impl PropertySink for MemoryStore {
    async fn apply(&self, candidate: &PropertyCandidate) -> Result<ApplyOutcome, MergeError> {
        let mut tables = self.tables.lock().await;
        let snapshot = tables.clone();
        let result = merge::apply(&mut *tables, candidate).await;
        if result.is_err() {
            *tables = snapshot;
        }
        result
    }

    async fn is_postcode_fresh(
        &self,
        postcode: &str,
        max_age: chrono::Duration,
    ) -> Result<bool, StoreError> {
        let wanted = normalize::format_postcode(postcode);
        let cutoff = Utc::now() - max_age;
        let tables = self.tables.lock().await;
        let latest = tables
            .properties
            .iter()
            .filter(|p| p.record.postcode.as_deref() == Some(wanted.as_str()))
            .map(|p| p.updated_at)
            .max();
        Ok(latest.is_some_and(|at| at >= cutoff))
    }
}
