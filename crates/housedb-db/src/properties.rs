//! Database operations for the `properties` and `sales` tables, and the
//! Postgres implementation of the store contract.

use chrono::{DateTime, NaiveDate, Utc};
use housedb_core::merge::{self, MergeError};
use housedb_core::{
    ApplyOutcome, PersistedProperty, PropertyCandidate, PropertyRecord, PropertySink,
    PropertyStore, SaleCandidate, SaleInsert, StoreError,
};
use sqlx::{Acquire, PgConnection, PgPool, Postgres, Transaction};

use crate::DbError;

const UNIQUE_VIOLATION: &str = "23505";

const PROPERTY_COLUMNS: &str = "id, address, postcode, property_type, bedrooms, bathrooms, url, \
     extra_features, floorplan_urls, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `properties` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PropertyRow {
    pub id: i64,
    pub address: String,
    pub postcode: Option<String>,
    pub property_type: Option<String>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub url: Option<String>,
    pub extra_features: Vec<String>,
    pub floorplan_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PropertyRow {
    #[must_use]
    pub fn into_persisted(self) -> PersistedProperty {
        PersistedProperty {
            id: self.id,
            record: PropertyRecord {
                address: self.address,
                postcode: self.postcode,
                property_type: self.property_type,
                bedrooms: self.bedrooms.and_then(|n| u32::try_from(n).ok()),
                bathrooms: self.bathrooms.and_then(|n| u32::try_from(n).ok()),
                url: self.url,
                extra_features: self.extra_features,
                floorplan_urls: self.floorplan_urls,
            },
            updated_at: self.updated_at,
        }
    }
}

/// A row from the `sales` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SaleRow {
    pub id: i64,
    pub property_id: i64,
    pub date_sold: String,
    pub price: String,
    pub price_numeric: Option<i64>,
    pub date_sold_iso: Option<NaiveDate>,
    pub price_change_pct: Option<String>,
    pub property_type: Option<String>,
    pub tenure: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Insert a property row, or fold `record` into the row already stored under
/// its address. On conflict an absent scalar or an empty list keeps the stored
/// value, so a sparse write that lost an insert race cannot erase a fuller one.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the statement fails.
pub async fn upsert_property(
    conn: &mut PgConnection,
    record: &PropertyRecord,
) -> Result<PropertyRow, sqlx::Error> {
    sqlx::query_as::<_, PropertyRow>(&format!(
        "INSERT INTO properties \
           (address, postcode, property_type, bedrooms, bathrooms, url, extra_features, floorplan_urls) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (address) DO UPDATE SET \
           postcode       = COALESCE(EXCLUDED.postcode, properties.postcode), \
           property_type  = COALESCE(EXCLUDED.property_type, properties.property_type), \
           bedrooms       = COALESCE(EXCLUDED.bedrooms, properties.bedrooms), \
           bathrooms      = COALESCE(EXCLUDED.bathrooms, properties.bathrooms), \
           url            = COALESCE(EXCLUDED.url, properties.url), \
           extra_features = CASE WHEN cardinality(EXCLUDED.extra_features) > 0 \
                              THEN EXCLUDED.extra_features ELSE properties.extra_features END, \
           floorplan_urls = CASE WHEN cardinality(EXCLUDED.floorplan_urls) > 0 \
                              THEN EXCLUDED.floorplan_urls ELSE properties.floorplan_urls END, \
           updated_at     = NOW() \
         RETURNING {PROPERTY_COLUMNS}"
    ))
    .bind(&record.address)
    .bind(record.postcode.as_deref())
    .bind(record.property_type.as_deref())
    .bind(record.bedrooms.and_then(|n| i32::try_from(n).ok()))
    .bind(record.bathrooms.and_then(|n| i32::try_from(n).ok()))
    .bind(record.url.as_deref())
    .bind(&record.extra_features)
    .bind(&record.floorplan_urls)
    .fetch_one(conn)
    .await
}

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// Merge target backed by a Postgres pool. Each [`PropertySink::apply`]
/// runs in its own transaction; each sale insert inside it runs in a
/// savepoint so a duplicate never rolls back unrelated writes.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// One open transaction seen through the [`PropertyStore`] contract.
struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PropertyStore for PgUnitOfWork {
    async fn find_by_address(
        &mut self,
        address: &str,
    ) -> Result<Option<PersistedProperty>, StoreError> {
        let row = sqlx::query_as::<_, PropertyRow>(&format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties WHERE address = $1"
        ))
        .bind(address)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::unavailable)?;
        Ok(row.map(PropertyRow::into_persisted))
    }

    async fn upsert_property(
        &mut self,
        record: &PropertyRecord,
    ) -> Result<PersistedProperty, StoreError> {
        let row = upsert_property(&mut *self.tx, record)
            .await
            .map_err(StoreError::unavailable)?;
        Ok(row.into_persisted())
    }

    async fn insert_sale_if_absent(
        &mut self,
        property_id: i64,
        sale: &SaleCandidate,
    ) -> Result<SaleInsert, StoreError> {
        let mut savepoint = (&mut self.tx)
            .begin()
            .await
            .map_err(StoreError::unavailable)?;

        let inserted = sqlx::query(
            "INSERT INTO sales \
               (property_id, date_sold, price, price_numeric, date_sold_iso, \
                price_change_pct, property_type, tenure) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(property_id)
        .bind(&sale.date_sold)
        .bind(&sale.price)
        .bind(sale.price_numeric())
        .bind(sale.date_sold_iso())
        .bind(sale.price_change_pct.as_deref())
        .bind(sale.property_type.as_deref())
        .bind(sale.tenure.as_deref())
        .execute(&mut *savepoint)
        .await;

        match inserted {
            Ok(_) => {
                savepoint.commit().await.map_err(StoreError::unavailable)?;
                Ok(SaleInsert::Inserted)
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                savepoint.rollback().await.map_err(StoreError::unavailable)?;
                tracing::debug!(
                    property_id,
                    date_sold = %sale.date_sold,
                    price = %sale.price,
                    "sale already recorded"
                );
                Ok(SaleInsert::AlreadyExists)
            }
            Err(e) => Err(StoreError::unavailable(e)),
        }
    }
}

impl PropertySink for PgStore {
    async fn apply(&self, candidate: &PropertyCandidate) -> Result<ApplyOutcome, MergeError> {
        let tx = self.pool.begin().await.map_err(StoreError::unavailable)?;
        let mut unit = PgUnitOfWork { tx };
        // Dropping the unit on error rolls the transaction back.
        let outcome = merge::apply(&mut unit, candidate).await?;
        unit.tx.commit().await.map_err(StoreError::unavailable)?;
        Ok(outcome)
    }

    async fn is_postcode_fresh(
        &self,
        postcode: &str,
        max_age: chrono::Duration,
    ) -> Result<bool, StoreError> {
        let latest = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(updated_at) FROM properties WHERE postcode = $1",
        )
        .bind(housedb_core::normalize::format_postcode(postcode))
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::unavailable)?;
        Ok(latest.is_some_and(|at| at >= Utc::now() - max_age))
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Properties with the given postcode, most recently updated first.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn list_properties_by_postcode(
    pool: &PgPool,
    postcode: &str,
) -> Result<Vec<PropertyRow>, DbError> {
    Ok(sqlx::query_as::<_, PropertyRow>(&format!(
        "SELECT {PROPERTY_COLUMNS} FROM properties \
         WHERE postcode = $1 ORDER BY updated_at DESC, address"
    ))
    .bind(housedb_core::normalize::format_postcode(postcode))
    .fetch_all(pool)
    .await?)
}

/// Sale history of one property, newest first; undated sales last.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn list_sales(pool: &PgPool, property_id: i64) -> Result<Vec<SaleRow>, DbError> {
    Ok(sqlx::query_as::<_, SaleRow>(
        "SELECT id, property_id, date_sold, price, price_numeric, date_sold_iso, \
                price_change_pct, property_type, tenure, created_at \
         FROM sales WHERE property_id = $1 \
         ORDER BY date_sold_iso DESC NULLS LAST, id",
    )
    .bind(property_id)
    .fetch_all(pool)
    .await?)
}

/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn count_properties(pool: &PgPool) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM properties")
        .fetch_one(pool)
        .await?)
}
