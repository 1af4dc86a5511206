//! Contract tests for HttpAuthorityClient against a mock authority.
//!
//! ## Endpoints Tested
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | POST   | `/validateDocument` | `submit_*` |
//! | GET    | `/documentStatus/{trackId}` | `status_*` |

#![cfg(feature = "dian")]

use std::time::Duration;

use fiscal_dian::core::*;
use fiscal_dian::dian::*;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn software() -> SoftwareIdentity {
    SoftwareIdentity::new("SW-1", "TK1")
}

fn client(server: &MockServer) -> HttpAuthorityClient {
    HttpAuthorityClient::new(DianConfig::local_mock(&server.uri()).unwrap()).unwrap()
}

// ── POST /validateDocument ───────────────────────────────────────────

#[tokio::test]
async fn submit_sends_document_and_identity_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validateDocument"))
        .and(header("software-id", "SW-1"))
        .and(header("technical-key", "TK1"))
        .and(header("content-type", "application/xml"))
        .and(body_string("<Invoice/>"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "SUCCESS",
            "message": "received",
            "trackId": "TRK-9"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server).submit(&software(), b"<Invoice/>").await.unwrap();
    assert_eq!(response.status, AuthorityStatus::Success);
    assert_eq!(response.track_id(), Some("TRK-9"));
    assert_eq!(response.message(), "received");
}

#[tokio::test]
async fn submit_classifies_server_errors_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validateDocument"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).submit(&software(), b"<Invoice/>").await.unwrap_err();
    match err {
        ClientError::Transient(e) => assert_eq!(e.http_status, Some(503)),
        other => panic!("expected transient, got {other:?}"),
    }
}

#[tokio::test]
async fn submit_classifies_throttling_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validateDocument"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = client(&server).submit(&software(), b"<Invoice/>").await.unwrap_err();
    assert!(matches!(err, ClientError::Transient(_)));
    assert!(FiscalError::from(err).kind().is_retryable());
}

#[tokio::test]
async fn submit_parses_rejection_codes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validateDocument"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "status": "ERROR",
            "message": "validation failed",
            "errors": [{ "code": "CUST-404", "message": "customer not found" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).submit(&software(), b"<Invoice/>").await.unwrap_err();
    let ClientError::Rejected(rejection) = err else {
        panic!("expected rejection");
    };
    assert_eq!(rejection.http_status, Some(400));
    assert_eq!(rejection.errors.len(), 1);
    assert_eq!(rejection.errors[0].code, "CUST-404");
    assert_eq!(rejection.errors[0].message, "customer not found");
}

#[tokio::test]
async fn submit_synthesizes_code_for_bare_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validateDocument"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let err = client(&server).submit(&software(), b"<Invoice/>").await.unwrap_err();
    let ClientError::Rejected(rejection) = err else {
        panic!("expected rejection");
    };
    assert_eq!(rejection.errors[0].code, "HTTP-403");
}

#[tokio::test]
async fn submit_treats_undecodable_success_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validateDocument"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .mount(&server)
        .await;

    let err = client(&server).submit(&software(), b"<Invoice/>").await.unwrap_err();
    assert!(matches!(err, ClientError::Transient(_)));
}

#[tokio::test]
async fn submit_reports_duplicate_with_original_track_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validateDocument"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "DUPLICATE",
            "trackId": "TRK-1"
        })))
        .mount(&server)
        .await;

    let response = client(&server).submit(&software(), b"<Invoice/>").await.unwrap();
    assert_eq!(response.status, AuthorityStatus::Duplicate);
    assert_eq!(response.track_id(), Some("TRK-1"));
}

#[tokio::test]
async fn submit_times_out_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validateDocument"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "status": "SUCCESS", "trackId": "T" }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let config = DianConfig::local_mock(&server.uri())
        .unwrap()
        .with_request_timeout(Duration::from_millis(50));
    let client = HttpAuthorityClient::new(config).unwrap();
    let err = client.submit(&software(), b"<Invoice/>").await.unwrap_err();
    assert!(matches!(err, ClientError::Transient(_)));
}

#[tokio::test]
async fn unreachable_authority_is_transient() {
    let config = DianConfig::local_mock("http://127.0.0.1:9").unwrap();
    let client = HttpAuthorityClient::new(config).unwrap();
    let err = client.submit(&software(), b"<Invoice/>").await.unwrap_err();
    assert!(matches!(err, ClientError::Transient(_)));
}

// ── GET /documentStatus/{trackId} ────────────────────────────────────

#[tokio::test]
async fn status_queries_track_id_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/documentStatus/TRK-9"))
        .and(header("software-id", "SW-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "PENDING"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server).status(&software(), "TRK-9").await.unwrap();
    assert_eq!(response.status, AuthorityStatus::Pending);
}

#[tokio::test]
async fn status_resolves_under_base_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/documentStatus/TRK-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "SUCCESS"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = DianConfig::local_mock(&format!("{}/api/v2", server.uri())).unwrap();
    let client = HttpAuthorityClient::new(config).unwrap();
    let response = client.status(&software(), "TRK-9").await.unwrap();
    assert_eq!(response.status, AuthorityStatus::Success);
}

#[tokio::test]
async fn status_unknown_values_are_not_final() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/documentStatus/TRK-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "IN_REVIEW"
        })))
        .mount(&server)
        .await;

    let response = client(&server).status(&software(), "TRK-9").await.unwrap();
    assert_eq!(response.status, AuthorityStatus::Unknown);
}
