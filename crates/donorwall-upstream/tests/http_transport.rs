use std::time::Duration;

use donorwall_core::{Collection, Contact, Transaction};
use donorwall_upstream::{synthetic, FetchOutcome, UpstreamClient, UpstreamConfig};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> UpstreamConfig {
    UpstreamConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        timeout: Duration::from_secs(5),
        per_page: 100,
        user_agent: None,
    }
}

fn contacts_page(page: usize) -> serde_json::Value {
    let start = (page - 1) * 100;
    let data = (start..start + 100)
        .map(|i| json!({"id": i + 1, "first_name": "Donor", "last_name": format!("{}", i + 1)}))
        .collect::<Vec<_>>();
    json!({
        "data": data,
        "meta": {"current_page": page, "last_page": 3, "total": 300},
        "links": {"next": if page < 3 { json!(format!("/contacts?page={}", page + 1)) } else { json!(null) }}
    })
}

#[tokio::test]
async fn paginates_three_pages_with_bearer_auth() {
    let server = MockServer::start().await;
    for page in 1..=3 {
        Mock::given(method("GET"))
            .and(path("/contacts"))
            .and(query_param("page", page.to_string()))
            .and(query_param("per_page", "100"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(contacts_page(page)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = UpstreamClient::from_config(&config(&server)).expect("client");
    assert!(client.is_configured());

    let FetchOutcome::Live { records, pages, .. } = client.fetch::<Contact>().await else {
        panic!("expected live outcome");
    };
    assert_eq!(pages, 3);
    assert_eq!(records.len(), 300);
    assert_eq!(records.first().map(|c| c.id.as_str()), Some("1"));
    assert_eq!(records.last().map(|c| c.id.as_str()), Some("300"));
    let mut ids = records.iter().map(|c| c.id.clone()).collect::<Vec<_>>();
    ids.dedup();
    assert_eq!(ids.len(), 300);
}

#[tokio::test]
async fn non_success_status_falls_back_with_one_error_note() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transactions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = UpstreamClient::from_config(&config(&server)).expect("client");
    let outcome = client.fetch::<Transaction>().await;

    assert!(outcome.is_degraded());
    assert_eq!(outcome.records(), synthetic::transactions().as_slice());
    let note = outcome
        .error_note(Collection::Transactions)
        .expect("degraded fetch produces a note");
    assert!(note.contains("transactions"));
    assert!(note.contains("503"));
}

#[tokio::test]
async fn timeout_falls_back_to_synthetic() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/contacts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(contacts_page(1))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let mut cfg = config(&server);
    cfg.timeout = Duration::from_millis(50);
    let client = UpstreamClient::from_config(&cfg).expect("client");
    let outcome = client.fetch::<Contact>().await;

    assert!(outcome.is_degraded());
    assert_eq!(outcome.records().len(), synthetic::CONTACT_COUNT);
    let note = outcome.error_note(Collection::Contacts).expect("note");
    assert!(note.contains("timed out"), "{note}");
}

#[tokio::test]
async fn blank_credential_means_synthetic_mode() {
    let server = MockServer::start().await;
    let mut cfg = config(&server);
    cfg.api_key = Some("   ".to_string());
    let client = UpstreamClient::from_config(&cfg).expect("client");
    assert!(!client.is_configured());
    assert_eq!(
        client.fetch::<Contact>().await.records().len(),
        synthetic::CONTACT_COUNT
    );
}
