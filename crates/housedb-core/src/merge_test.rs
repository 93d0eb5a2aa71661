use super::*;
use crate::memory::MemoryStore;
use crate::property::SaleCandidate;
use crate::store::PropertySink;

fn candidate_with_sale(address: &str, date: &str, price: &str) -> PropertyCandidate {
    let mut candidate = PropertyCandidate::new(address);
    candidate.sales = vec![SaleCandidate::new(date, price)];
    candidate
}

#[tokio::test]
async fn first_apply_creates_property_and_sales() {
    let store = MemoryStore::new();
    let outcome = store
        .apply(&candidate_with_sale("1 Example St", "04 Nov 2023", "£450,000"))
        .await
        .unwrap();

    assert!(outcome.created);
    assert_eq!(outcome.sales_inserted, 1);
    assert_eq!(outcome.sales_skipped, 0);

    let sales = store.sales_for(outcome.property_id).await;
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].date_sold, "4 Nov 2023");
    assert_eq!(sales[0].price_numeric, Some(450_000));
}

#[tokio::test]
async fn apply_is_idempotent() {
    let store = MemoryStore::new();
    let candidate = candidate_with_sale("1 Example St", "1 Jan 2021", "£300,000");

    store.apply(&candidate).await.unwrap();
    let second = store.apply(&candidate).await.unwrap();

    assert!(!second.created);
    assert_eq!(second.sales_inserted, 0);
    assert_eq!(second.sales_skipped, 1);
    assert_eq!(store.sale_count().await, 1);
}

#[tokio::test]
async fn sequential_candidates_accumulate_distinct_sales() {
    let store = MemoryStore::new();
    store
        .apply(&candidate_with_sale("1 Example St", "1 Jan 2021", "£300,000"))
        .await
        .unwrap();
    let outcome = store
        .apply(&candidate_with_sale("1 Example St", "15 Jun 2023", "£450,000"))
        .await
        .unwrap();

    assert_eq!(store.properties().await.len(), 1);
    assert_eq!(store.sales_for(outcome.property_id).await.len(), 2);
}

#[tokio::test]
async fn merge_preserves_existing_fields() {
    let store = MemoryStore::new();
    let mut first = PropertyCandidate::new("1 Example St");
    first.bedrooms = Some(3);
    first.extra_features = vec!["Garden".to_string()];
    first.url = Some("https://example.com/p/1".to_string());
    store.apply(&first).await.unwrap();

    let mut second = PropertyCandidate::new("1 Example St");
    second.bathrooms = Some(2);
    store.apply(&second).await.unwrap();

    let persisted = store.property_by_address("1 Example St").await.unwrap();
    assert_eq!(persisted.record.bedrooms, Some(3));
    assert_eq!(persisted.record.bathrooms, Some(2));
    assert_eq!(persisted.record.extra_features, vec!["Garden".to_string()]);
    assert_eq!(
        persisted.record.url.as_deref(),
        Some("https://example.com/p/1")
    );
}

#[tokio::test]
async fn present_values_replace_old_ones() {
    let store = MemoryStore::new();
    let mut first = PropertyCandidate::new("1 Example St");
    first.bedrooms = Some(3);
    store.apply(&first).await.unwrap();

    let mut second = PropertyCandidate::new("1 Example St");
    second.bedrooms = Some(4);
    store.apply(&second).await.unwrap();

    let persisted = store.property_by_address("1 Example St").await.unwrap();
    assert_eq!(persisted.record.bedrooms, Some(4));
}

#[tokio::test]
async fn whitespace_variants_share_a_property() {
    let store = MemoryStore::new();
    store
        .apply(&PropertyCandidate::new("1  Example St "))
        .await
        .unwrap();
    let outcome = store
        .apply(&PropertyCandidate::new("1 Example St"))
        .await
        .unwrap();
    assert!(!outcome.created);
    assert_eq!(store.properties().await.len(), 1);
}

#[tokio::test]
async fn empty_address_is_rejected_without_writes() {
    let store = MemoryStore::new();
    let result = store
        .apply(&candidate_with_sale("   ", "1 Jan 2021", "£300,000"))
        .await;
    assert!(matches!(result, Err(MergeError::InvalidCandidate { .. })));
    assert!(store.properties().await.is_empty());
    assert_eq!(store.sale_count().await, 0);
}

#[tokio::test]
async fn freshness_follows_update_time() {
    let store = MemoryStore::new();
    store
        .apply(&PropertyCandidate::new("1 Example St, London SW20 8NE"))
        .await
        .unwrap();

    let week = chrono::Duration::days(7);
    assert!(store.is_postcode_fresh("sw208ne", week).await.unwrap());
    assert!(!store.is_postcode_fresh("SW19 1AA", week).await.unwrap());

    let stale = chrono::Utc::now() - chrono::Duration::days(30);
    assert!(
        store
            .set_updated_at("1 Example St, London SW20 8NE", stale)
            .await
    );
    assert!(!store.is_postcode_fresh("SW20 8NE", week).await.unwrap());
}

#[test]
fn merge_record_prefers_non_empty_lists() {
    let old = PropertyRecord {
        address: "1 Example St".to_string(),
        floorplan_urls: vec!["https://img/1.png".to_string()],
        extra_features: vec!["Garden".to_string()],
        ..PropertyRecord::default()
    };
    let new = PropertyRecord {
        address: "1 Example St".to_string(),
        extra_features: vec!["Loft".to_string()],
        ..PropertyRecord::default()
    };
    let merged = merge_record(old, new);
    assert_eq!(merged.floorplan_urls, vec!["https://img/1.png".to_string()]);
    assert_eq!(merged.extra_features, vec!["Loft".to_string()]);
}
