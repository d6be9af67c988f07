#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use errgate::classify::classify;
use errgate::error::{ConfigError, Error as GateError};
use errgate::probe::ProbeClient;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(base: &MockServer) -> ProbeClient {
    ProbeClient::new(
        Url::parse(&base.uri()).expect("valid mock url"),
        Some(SecretString::from("token")),
        Duration::from_secs(2),
        Duration::from_secs(1),
        true,
    )
    .expect("client")
}

#[tokio::test]
async fn successful_endpoint_reports_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/projects"))
        .and(header("authorization", "Bearer token"))
        .and(header_exists("x-correlation-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client(&server).probe("/api/v2/projects").await.expect("probe");
    assert!(outcome.is_none());
}

#[tokio::test]
async fn structured_error_body_snapshot() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "forbidden: not a project member"}
        })))
        .mount(&server)
        .await;

    let failure = client(&server)
        .probe("/api/v1/projects/abc")
        .await
        .expect("probe")
        .expect("failure");
    assert_eq!(failure.status, 403);
    assert_eq!(failure.error_key().as_str(), "/projects/abc|403");

    let classified = classify(&failure);
    insta::assert_json_snapshot!("forbidden_classified", classified);
}

#[tokio::test]
async fn plain_text_error_keeps_transport_message() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let failure = client(&server)
        .probe("/api/v2/seeds")
        .await
        .expect("probe")
        .expect("failure");
    assert_eq!(failure.body, Some(json!("upstream unavailable")));

    let classified = classify(&failure);
    assert_eq!(classified.code, 502);
    assert!(classified.message.starts_with("Http failure response for"));
    assert_eq!(classified.short_message.as_deref(), Some("Bad Gateway"));
}

#[tokio::test]
async fn timeouts_surface_as_status_zero() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)))
        .mount(&server)
        .await;

    let client = ProbeClient::new(
        Url::parse(&server.uri()).unwrap(),
        None,
        Duration::from_millis(300),
        Duration::from_millis(200),
        true,
    )
    .unwrap();

    let failure = client
        .probe("/api/v2/projects")
        .await
        .expect("probe")
        .expect("failure");
    assert_eq!(failure.status, 0);
    assert_eq!(failure.status_text.as_deref(), Some("Unknown Error"));
}

#[tokio::test]
async fn probe_all_keeps_endpoint_order() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/a"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(200)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/b"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/c"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let endpoints = vec![
        "/api/v2/a".to_string(),
        "/api/v2/b".to_string(),
        "/api/v2/c".to_string(),
    ];
    let results = client(&server).probe_all(&endpoints, 2).await;

    let statuses: Vec<Option<u16>> = results
        .into_iter()
        .map(|res| res.expect("probe").map(|failure| failure.status))
        .collect();
    assert_eq!(statuses, vec![Some(500), None, Some(404)]);
}

#[test]
fn plain_http_requires_insecure() {
    let err = ProbeClient::new(
        Url::parse("http://console.local").unwrap(),
        None,
        Duration::from_secs(1),
        Duration::from_secs(1),
        false,
    )
    .expect_err("http must be rejected");
    assert!(matches!(
        err,
        GateError::Config(ConfigError::InvalidField {
            field: "probe.base_url",
            ..
        })
    ));
}
