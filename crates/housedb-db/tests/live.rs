//! Live integration tests for housedb-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/housedb-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use chrono::NaiveDate;
use housedb_core::{MergeError, PropertyCandidate, PropertyRecord, PropertySink, SaleCandidate};
use housedb_db::{
    count_properties, list_properties_by_postcode, list_sales, upsert_property, PgStore,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ADDRESS: &str = "1 High Street, London SW20 8NE";

fn sale(date: &str, price: &str) -> SaleCandidate {
    SaleCandidate {
        tenure: Some("Freehold".to_string()),
        ..SaleCandidate::new(date, price)
    }
}

fn candidate(sales: Vec<SaleCandidate>) -> PropertyCandidate {
    PropertyCandidate {
        property_type: Some("Terraced".to_string()),
        bedrooms: Some(3),
        sales,
        ..PropertyCandidate::new(ADDRESS)
    }
}

// ---------------------------------------------------------------------------
// Section 1: Create and re-apply
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn apply_creates_property_and_sale(pool: sqlx::PgPool) {
    let store = PgStore::new(pool.clone());

    let outcome = store
        .apply(&candidate(vec![sale("04 Nov 2023", "Â£450000")]))
        .await
        .expect("apply failed");

    assert!(outcome.created);
    assert_eq!(outcome.sales_inserted, 1);
    assert_eq!(outcome.sales_skipped, 0);

    let rows = list_properties_by_postcode(&pool, "sw208ne")
        .await
        .expect("list_properties_by_postcode failed");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, outcome.property_id);
    assert_eq!(rows[0].postcode.as_deref(), Some("SW20 8NE"));
    assert_eq!(rows[0].property_type.as_deref(), Some("TERRACED"));
    assert_eq!(rows[0].bedrooms, Some(3));

    let sales = list_sales(&pool, outcome.property_id)
        .await
        .expect("list_sales failed");
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].date_sold, "4 Nov 2023");
    assert_eq!(sales[0].price, "£450,000");
    assert_eq!(sales[0].price_numeric, Some(450_000));
    assert_eq!(sales[0].date_sold_iso, NaiveDate::from_ymd_opt(2023, 11, 4));
    assert_eq!(sales[0].tenure.as_deref(), Some("FREEHOLD"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn reapplying_same_candidate_inserts_nothing(pool: sqlx::PgPool) {
    let store = PgStore::new(pool.clone());
    let input = candidate(vec![sale("4 Nov 2023", "£450,000")]);

    let first = store.apply(&input).await.expect("first apply failed");
    let second = store.apply(&input).await.expect("second apply failed");

    assert_eq!(first.property_id, second.property_id);
    assert!(!second.created);
    assert_eq!(second.sales_inserted, 0);
    assert_eq!(second.sales_skipped, 1);
    assert_eq!(count_properties(&pool).await.unwrap(), 1);
    assert_eq!(list_sales(&pool, first.property_id).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn new_sale_is_added_next_to_existing_one(pool: sqlx::PgPool) {
    let store = PgStore::new(pool.clone());
    store
        .apply(&candidate(vec![sale("4 Nov 2023", "£450,000")]))
        .await
        .expect("first apply failed");

    // The known sale comes first so the duplicate path runs before the
    // insert in the same transaction.
    let outcome = store
        .apply(&candidate(vec![
            sale("4 Nov 2023", "£450,000"),
            sale("12 Jun 2015", "£300,000"),
        ]))
        .await
        .expect("second apply failed");

    assert_eq!(outcome.sales_inserted, 1);
    assert_eq!(outcome.sales_skipped, 1);

    let sales = list_sales(&pool, outcome.property_id).await.unwrap();
    let dates: Vec<&str> = sales.iter().map(|s| s.date_sold.as_str()).collect();
    assert_eq!(dates, vec!["4 Nov 2023", "12 Jun 2015"]);
}

// ---------------------------------------------------------------------------
// Section 2: Merge rules
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn missing_fields_do_not_erase_stored_values(pool: sqlx::PgPool) {
    let store = PgStore::new(pool.clone());
    store
        .apply(&PropertyCandidate {
            extra_features: vec!["Garden".to_string()],
            floorplan_urls: vec!["https://media.example/floorplan_1.png".to_string()],
            url: Some("https://www.example.co.uk/house-prices/details/abc".to_string()),
            ..candidate(vec![])
        })
        .await
        .expect("first apply failed");

    store
        .apply(&PropertyCandidate {
            bathrooms: Some(2),
            ..PropertyCandidate::new(ADDRESS)
        })
        .await
        .expect("second apply failed");

    let rows = list_properties_by_postcode(&pool, "SW20 8NE").await.unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.bedrooms, Some(3));
    assert_eq!(row.bathrooms, Some(2));
    assert_eq!(row.property_type.as_deref(), Some("TERRACED"));
    assert_eq!(row.extra_features, vec!["Garden".to_string()]);
    assert_eq!(row.floorplan_urls.len(), 1);
    assert!(row.url.is_some());
    assert!(row.updated_at >= row.created_at);
}

#[sqlx::test(migrations = "../../migrations")]
async fn sparse_insert_losing_the_race_keeps_stored_values(pool: sqlx::PgPool) {
    let store = PgStore::new(pool.clone());
    let full = store
        .apply(&PropertyCandidate {
            extra_features: vec!["Garden".to_string()],
            floorplan_urls: vec!["https://media.example/floorplan_1.png".to_string()],
            url: Some("https://www.example.co.uk/house-prices/details/abc".to_string()),
            ..candidate(vec![])
        })
        .await
        .expect("apply failed");

    // A concurrent writer that found no row and inserts a bare record lands
    // on the existing address.
    let sparse = PropertyRecord {
        address: ADDRESS.to_string(),
        postcode: None,
        property_type: None,
        bedrooms: None,
        bathrooms: Some(2),
        url: None,
        extra_features: Vec::new(),
        floorplan_urls: Vec::new(),
    };
    let mut conn = pool.acquire().await.expect("acquire failed");
    let row = upsert_property(&mut conn, &sparse)
        .await
        .expect("upsert failed");

    assert_eq!(row.id, full.property_id);
    assert_eq!(row.postcode.as_deref(), Some("SW20 8NE"));
    assert_eq!(row.property_type.as_deref(), Some("TERRACED"));
    assert_eq!(row.bedrooms, Some(3));
    assert_eq!(row.bathrooms, Some(2));
    assert_eq!(
        row.url.as_deref(),
        Some("https://www.example.co.uk/house-prices/details/abc")
    );
    assert_eq!(row.extra_features, vec!["Garden".to_string()]);
    assert_eq!(row.floorplan_urls.len(), 1);
    assert_eq!(count_properties(&pool).await.unwrap(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn blank_address_is_rejected_without_writing(pool: sqlx::PgPool) {
    let store = PgStore::new(pool.clone());

    let result = store
        .apply(&PropertyCandidate {
            sales: vec![sale("4 Nov 2023", "£450,000")],
            ..PropertyCandidate::new("   ")
        })
        .await;

    assert!(matches!(result, Err(MergeError::InvalidCandidate { .. })));
    assert_eq!(count_properties(&pool).await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Section 3: Freshness
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn postcode_freshness_follows_last_update(pool: sqlx::PgPool) {
    let store = PgStore::new(pool.clone());
    let week = chrono::Duration::days(7);

    assert!(!store.is_postcode_fresh("SW20 8NE", week).await.unwrap());

    store
        .apply(&candidate(vec![sale("4 Nov 2023", "£450,000")]))
        .await
        .expect("apply failed");
    assert!(store.is_postcode_fresh("sw208ne", week).await.unwrap());

    sqlx::query("UPDATE properties SET updated_at = NOW() - INTERVAL '30 days'")
        .execute(&pool)
        .await
        .expect("backdating failed");
    assert!(!store.is_postcode_fresh("SW20 8NE", week).await.unwrap());
}
