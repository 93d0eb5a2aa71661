//! End-to-end scrapes against a mocked site, merged into the in-memory
//! store.

use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use housedb_core::{MemoryStore, PropertyCandidate, PropertySink, SaleCandidate};
use housedb_scraper::{
    scrape_area, scrape_postcode, scrape_property, AreaOptions, FetchConfig, PostcodeRequest,
    ScrapeError, ScrapeMode, ScraperSession,
};

const LISTING_PATH: &str = "/house-prices/SW208NE.html";

fn test_session(server: &MockServer) -> ScraperSession {
    let config = FetchConfig {
        request_timeout: Duration::from_secs(5),
        retry_attempts: 0,
        backoff_base: Duration::ZERO,
        inter_request_delay: Duration::ZERO,
        ..FetchConfig::default()
    };
    ScraperSession::new(&server.uri(), config).expect("failed to build test session")
}

/// Wrap a stream root in the page markup the site serves.
fn stream_page(root: &Value, body: &str) -> String {
    let literal = serde_json::to_string(&root.to_string()).unwrap();
    format!(
        "<html><body>{body}<script>window.__reactRouterContext.streamController.enqueue({literal});</script></body></html>"
    )
}

fn listing_property(address: &str, date: &str, price: &str) -> Value {
    json!({
        "address": address,
        "bedrooms": 3,
        "detailUrl": format!("/house-prices/details/{}", address.split(' ').next().unwrap()),
        "transactions": [{"dateSold": date, "displayPrice": price, "tenure": "Freehold"}]
    })
}

fn listing(properties: &[Value]) -> String {
    stream_page(&json!([{"searchResult": {"properties": properties}}]), "")
}

async fn mount_listing(server: &MockServer, page: Option<&str>, body: String) {
    let mock = Mock::given(method("GET")).and(path(LISTING_PATH));
    let mock = match page {
        Some(n) => mock.and(query_param("page", n)),
        None => mock.and(query_param_is_missing("page")),
    };
    mock.respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fast_mode_walks_pages_until_empty() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        None,
        listing(&[
            listing_property("1 Example Road, London", "15 Jun 2023", "£450,000"),
            listing_property("2 Example Road, London", "1 Jan 2021", "£300,000"),
        ]),
    )
    .await;
    mount_listing(
        &server,
        Some("2"),
        listing(&[listing_property("3 Example Road, London", "3 Mar 2020", "£325,000")]),
    )
    .await;
    mount_listing(&server, Some("3"), listing(&[])).await;

    let store = MemoryStore::new();
    let request = PostcodeRequest {
        pages: 5,
        ..PostcodeRequest::new("SW20 8NE")
    };
    let report = scrape_postcode(&test_session(&server), &store, &request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.postcode, "SW20 8NE");
    assert_eq!(report.pages, 2);
    assert_eq!(report.scraped, 3);
    assert_eq!(report.detail_visits, 0);
    assert!(report.failed.is_empty());

    let stored = store
        .property_by_address("1 Example Road, London")
        .await
        .unwrap();
    assert_eq!(stored.record.postcode.as_deref(), Some("SW20 8NE"));
    assert_eq!(stored.record.bedrooms, Some(3));
    let sales = store.sales_for(stored.id).await;
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].price, "£450,000");
    assert_eq!(sales[0].tenure.as_deref(), Some("FREEHOLD"));
}

#[tokio::test]
async fn max_properties_stops_pagination() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        None,
        listing(&[
            listing_property("1 Example Road", "1 Jan 2021", "£1"),
            listing_property("2 Example Road", "1 Jan 2021", "£2"),
            listing_property("3 Example Road", "1 Jan 2021", "£3"),
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let request = PostcodeRequest {
        pages: 3,
        max_properties: 2,
        ..PostcodeRequest::new("SW208NE")
    };
    let report = scrape_postcode(&test_session(&server), &store, &request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.scraped, 2);
    assert_eq!(store.properties().await.len(), 2);
}

#[tokio::test]
async fn rescraping_does_not_duplicate_sales() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        None,
        listing(&[listing_property("1 Example Road", "15 Jun 2023", "£450,000")]),
    )
    .await;

    let session = test_session(&server);
    let store = MemoryStore::new();
    let request = PostcodeRequest::new("SW20 8NE");
    let cancel = CancellationToken::new();
    let first = scrape_postcode(&session, &store, &request, &cancel).await.unwrap();
    let second = scrape_postcode(&session, &store, &request, &cancel).await.unwrap();

    assert_eq!(first.sales_inserted, 1);
    assert_eq!(second.sales_inserted, 0);
    assert_eq!(store.sale_count().await, 1);
}

#[tokio::test]
async fn empty_listing_is_no_data() {
    let server = MockServer::start().await;
    mount_listing(&server, None, listing(&[])).await;

    let result = scrape_postcode(
        &test_session(&server),
        &MemoryStore::new(),
        &PostcodeRequest::new("SW20 8NE"),
        &CancellationToken::new(),
    )
    .await;
    assert!(matches!(result, Err(ScrapeError::NoData { .. })));
}

#[tokio::test]
async fn listing_without_stream_is_a_decode_error() {
    let server = MockServer::start().await;
    mount_listing(&server, None, "<html><h1>Maintenance</h1></html>".to_string()).await;

    let result = scrape_postcode(
        &test_session(&server),
        &MemoryStore::new(),
        &PostcodeRequest::new("SW20 8NE"),
        &CancellationToken::new(),
    )
    .await;
    assert!(matches!(result, Err(ScrapeError::Decode(_))));
}

const DETAIL_MARKUP: &str = r"
  <h1>1 Example Road, London SW20 8NE</h1>
  <h2>Key features</h2>
  <ul><li>South facing garden</li><li>Loft conversion</li></ul>
";

fn detail_page() -> String {
    stream_page(
        &json!([{"propertyDetails": {
            "address": "1 Example Road, London SW20 8NE",
            "bathrooms": 2,
            "propertyType": "Terraced",
            "transactions": [
                {"dateSold": "15 Jun 2023", "price": 450_000, "tenure": "Freehold"},
                {"dateSold": "01 Jan 2021", "price": "£300,000", "tenure": "Freehold"}
            ],
            "floorplans": [{"url": "/media/floorplan_1.png"}]
        }}]),
        DETAIL_MARKUP,
    )
}

#[tokio::test]
async fn detail_mode_merges_full_history_and_extras() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        None,
        listing(&[listing_property(
            "1 Example Road, London SW20 8NE",
            "15 Jun 2023",
            "£450,000",
        )]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/house-prices/details/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page()))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let request = PostcodeRequest {
        want_floorplans: true,
        ..PostcodeRequest::new("SW20 8NE")
    };
    let report = scrape_postcode(&test_session(&server), &store, &request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.detail_visits, 1);
    assert_eq!(report.scraped, 1);

    let stored = store
        .property_by_address("1 Example Road, London SW20 8NE")
        .await
        .unwrap();
    assert_eq!(stored.record.bedrooms, Some(3));
    assert_eq!(stored.record.bathrooms, Some(2));
    assert_eq!(stored.record.property_type.as_deref(), Some("TERRACED"));
    assert_eq!(
        stored.record.extra_features,
        vec!["South facing garden".to_string(), "Loft conversion".to_string()]
    );
    assert_eq!(
        stored.record.floorplan_urls,
        vec![format!("{}/media/floorplan_1.png", server.uri())]
    );
    let sales = store.sales_for(stored.id).await;
    assert_eq!(sales.len(), 2);
}

#[tokio::test]
async fn limited_detail_mode_keeps_listing_data_for_the_rest() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        None,
        listing(&[
            listing_property("1 Example Road, London SW20 8NE", "15 Jun 2023", "£450,000"),
            listing_property("2 Example Road, London SW20 8NE", "1 Jan 2021", "£300,000"),
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/house-prices/details/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/house-prices/details/2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let request = PostcodeRequest {
        mode: ScrapeMode::DetailLimited(1),
        ..PostcodeRequest::new("SW20 8NE")
    };
    let report = scrape_postcode(&test_session(&server), &store, &request, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.detail_visits, 1);
    assert_eq!(report.scraped, 2);
    // Floorplans were not asked for.
    let first = store
        .property_by_address("1 Example Road, London SW20 8NE")
        .await
        .unwrap();
    assert!(first.record.floorplan_urls.is_empty());
}

#[tokio::test]
async fn failed_detail_page_is_reported_and_listing_data_kept() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        None,
        listing(&[listing_property("1 Example Road", "15 Jun 2023", "£450,000")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/house-prices/details/1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let request = PostcodeRequest {
        mode: ScrapeMode::DetailAll,
        ..PostcodeRequest::new("SW20 8NE")
    };
    let report = scrape_postcode(&test_session(&server), &store, &request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.scraped, 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].id.ends_with("/house-prices/details/1"));
    assert_eq!(store.sale_count().await, 1);
}

#[tokio::test]
async fn property_page_without_stream_uses_markup() {
    let server = MockServer::start().await;
    let markup = r"<html><body>
      <h1>7 Example Road, London SW20 8NE</h1>
      <table>
        <tr><th>Date sold</th><th>Price change %</th><th>Price</th><th>Tenure</th></tr>
        <tr><td>04 Nov 2023</td><td>+10%</td><td>£450,000</td><td>Freehold</td></tr>
      </table>
      <img src='/media/floorplan.gif' alt='Floorplan'>
    </body></html>";
    Mock::given(method("GET"))
        .and(path("/house-prices/details/7"))
        .respond_with(ResponseTemplate::new(200).set_body_string(markup))
        .mount(&server)
        .await;

    let session = test_session(&server);
    let url = format!("{}/house-prices/details/7", server.uri());
    let candidate = scrape_property(&session, &url, true, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(candidate.address, "7 Example Road, London SW20 8NE");
    assert_eq!(candidate.postcode.as_deref(), Some("SW20 8NE"));
    assert_eq!(candidate.url.as_deref(), Some(url.as_str()));
    assert_eq!(candidate.sales.len(), 1);
    assert_eq!(candidate.sales[0].date_sold, "4 Nov 2023");
    assert_eq!(candidate.floorplan_urls.len(), 1);
}

#[tokio::test]
async fn property_page_without_address_is_no_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/house-prices/details/9"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let session = test_session(&server);
    let result = scrape_property(
        &session,
        &format!("{}/house-prices/details/9", server.uri()),
        false,
        &CancellationToken::new(),
    )
    .await;
    assert!(matches!(result, Err(ScrapeError::NoData { .. })));
}

#[tokio::test]
async fn area_scrape_skips_fresh_and_reports_failures() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        None,
        listing(&[listing_property("1 Example Road", "1 Jan 2021", "£300,000")]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/house-prices/SW208NF.html"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/house-prices/SW208NG.html"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let mut fresh = PropertyCandidate::new("9 Fresh Lane");
    fresh.postcode = Some("SW20 8NG".to_string());
    fresh.sales = vec![SaleCandidate::new("1 Jan 2020", "£1")];
    store.apply(&fresh).await.unwrap();

    let sessions = vec![test_session(&server), test_session(&server)];
    let postcodes = vec![
        "SW20 8NE".to_string(),
        "sw208nf".to_string(),
        "SW20 8NG".to_string(),
        "SW208NE".to_string(),
    ];
    let report = scrape_area(
        &sessions,
        &store,
        &postcodes,
        &AreaOptions::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.scraped, vec!["SW20 8NE".to_string()]);
    assert_eq!(report.skipped, vec!["SW20 8NG".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].id, "SW20 8NF");
    assert_eq!(report.total_properties, 1);
    assert!(!report.cancelled);
}

#[tokio::test]
async fn area_scrape_runs_one_postcode_at_a_time_per_session() {
    let server = MockServer::start().await;
    for (code, address, delay_ms) in [
        ("SW208NA", "1 Slow Road", 300),
        ("SW208NB", "2 Quick Road", 0),
        ("SW208NC", "3 Slow Road", 300),
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/house-prices/{code}.html")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(listing(&[listing_property(
                        address,
                        "1 Jan 2021",
                        "£300,000",
                    )]))
                    .set_delay(Duration::from_millis(delay_ms)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    // The first session owns both slow postcodes and must run them in turn.
    let sessions = vec![test_session(&server), test_session(&server)];
    let postcodes = vec![
        "SW20 8NA".to_string(),
        "SW20 8NB".to_string(),
        "SW20 8NC".to_string(),
    ];
    let started = std::time::Instant::now();
    let report = scrape_area(
        &sessions,
        &MemoryStore::new(),
        &postcodes,
        &AreaOptions::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(600));
    assert_eq!(
        report.scraped,
        vec![
            "SW20 8NB".to_string(),
            "SW20 8NA".to_string(),
            "SW20 8NC".to_string(),
        ]
    );
}

#[tokio::test]
async fn cancelled_area_scrape_returns_partial_report() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = scrape_area(
        &[test_session(&server)],
        &MemoryStore::new(),
        &["SW20 8NE".to_string()],
        &AreaOptions::default(),
        &cancel,
    )
    .await
    .unwrap();
    assert!(report.cancelled);
    assert!(report.scraped.is_empty());
}
