use std::sync::{Arc, Once};

use audit_watcher::fetcher::build_client;
use audit_watcher::{
    AuditSource, AuthError, Credentials, DetailLookup, FetchConfig, ManagementClient, Notifier,
    TimeWindow, TokenProvider, WatcherError, WebhookNotifier,
};
use serde_json::json;
use tracing::info;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

const CLIENT_BASIC: &str = "Basic ZWRnZWNsaTplZGdlY2xpc2VjcmV0";

fn credentials() -> Credentials {
    Credentials {
        username: "me@example.com".into(),
        password: "s3cret".into(),
    }
}

fn tokens(server: &MockServer) -> Arc<TokenProvider> {
    let http = build_client(&FetchConfig::default()).unwrap();
    Arc::new(TokenProvider::new(http, &server.uri(), credentials(), 240))
}

async fn mount_password_grant(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header("authorization", CLIENT_BASIC))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=me%40example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn password_grant_token_is_cached() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-1",
            "refresh_token": "ref-1",
            "expires_in": 1799
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = tokens(&server);
    assert_eq!(provider.authorization_header().await.unwrap(), "Bearer tok-1");
    assert_eq!(provider.authorization_header().await.unwrap(), "Bearer tok-1");
}

#[tokio::test]
async fn expiring_token_is_refreshed() {
    init_tracing();
    let server = MockServer::start().await;
    mount_password_grant(
        &server,
        json!({ "access_token": "tok-1", "refresh_token": "ref-1", "expires_in": 60 }),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=ref-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok-2",
            "refresh_token": "ref-2",
            "expires_in": 1799
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = tokens(&server);
    assert_eq!(provider.authorization_header().await.unwrap(), "Bearer tok-1");
    assert_eq!(provider.authorization_header().await.unwrap(), "Bearer tok-2");
    assert_eq!(provider.authorization_header().await.unwrap(), "Bearer tok-2");
}

#[tokio::test]
async fn expiring_token_without_refresh_token_is_fatal() {
    init_tracing();
    let server = MockServer::start().await;
    mount_password_grant(&server, json!({ "access_token": "tok-1", "expires_in": 30 })).await;

    let provider = tokens(&server);
    provider.authorization_header().await.unwrap();
    let err = provider.authorization_header().await.unwrap_err();
    assert!(matches!(err, WatcherError::Auth(AuthError::NoRefreshToken)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn token_endpoint_rejection_is_fatal_but_outage_is_not() {
    init_tracing();
    let rejecting = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "unauthorized" })))
        .mount(&rejecting)
        .await;
    let err = tokens(&rejecting).authorization_header().await.unwrap_err();
    assert!(matches!(
        err,
        WatcherError::Auth(AuthError::CredentialsRejected { status: 401 })
    ));

    let down = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&down)
        .await;
    let err = tokens(&down).authorization_header().await.unwrap_err();
    assert!(!err.is_fatal());
}

async fn management(server: &MockServer) -> ManagementClient {
    mount_password_grant(
        server,
        json!({ "access_token": "tok-1", "refresh_token": "ref-1", "expires_in": 1799 }),
    )
    .await;
    let http = build_client(&FetchConfig::default()).unwrap();
    ManagementClient::new(http, &server.uri(), "acme", tokens(server))
}

#[tokio::test]
async fn audit_query_returns_records() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/audits/organizations/acme"))
        .and(header("authorization", "Bearer tok-1"))
        .and(query_param("expand", "true"))
        .and(query_param("startTime", "1000"))
        .and(query_param("endTime", "5000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "auditRecord": [{
                "operation": "DELETE",
                "requestUri": "/v1/organizations/acme/apis/jn_Open_Weather",
                "responseCode": "200",
                "timeStamp": 1449105541324_i64,
                "user": "DChiesa@apigee.com"
            }, {
                "operation": "CREATE",
                "requestUri": "/v1/organizations/acme/developers/",
                "responseCode": "201",
                "timeStamp": 1449105540108_i64,
                "user": "DChiesa@apigee.com",
                "request": "{\"email\":\"x@y.com\"}"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = management(&server).await;
    let fetch = client
        .fetch_audits(TimeWindow {
            start_ms: 1000,
            end_ms: 5000,
        })
        .await
        .unwrap();
    info!("fetched {:?}", fetch);

    assert!(fetch.is_success());
    let records = fetch.records.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].time_stamp, 1449105541324);
    assert_eq!(records[1].request.as_deref(), Some("{\"email\":\"x@y.com\"}"));
}

#[tokio::test]
async fn audit_query_failures_have_no_records() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/audits/organizations/acme"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/audits/organizations/acme"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = management(&server).await;
    let window = TimeWindow::ending_at(10_000, 5_000);

    let forbidden = client.fetch_audits(window).await.unwrap();
    assert_eq!(forbidden.status, 403);
    assert!(forbidden.records.is_none());

    let garbled = client.fetch_audits(window).await.unwrap();
    assert_eq!(garbled.status, 200);
    assert!(garbled.records.is_none());
}

#[tokio::test]
async fn report_display_name_lookup() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/o/acme/reports/r-1"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "r-1",
            "displayName": "Traffic by region"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/o/acme/reports/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = management(&server).await;
    assert_eq!(
        client.report_display_name("r-1").await.unwrap().as_deref(),
        Some("Traffic by region")
    );
    let err = client.report_display_name("gone").await.unwrap_err();
    assert!(matches!(err, WatcherError::DetailLookup(_)));
}

#[tokio::test]
async fn webhook_posts_json_with_bearer_token() {
    init_tracing();
    let server = MockServer::start().await;
    let payload = json!({ "text": "1 update has been made to org acme" });
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("authorization", "Bearer hook-secret"))
        .and(header("content-type", "application/json"))
        .and(body_json(payload.clone()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let http = build_client(&FetchConfig::default()).unwrap();
    let notifier = WebhookNotifier::new(
        http,
        &format!("{}/hook", server.uri()),
        Some("hook-secret".into()),
    );
    notifier.notify(&payload).await.unwrap();
}

#[tokio::test]
async fn webhook_error_status_is_a_notify_failure() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let http = build_client(&FetchConfig::default()).unwrap();
    let notifier = WebhookNotifier::new(http, &format!("{}/hook", server.uri()), None);
    let err = notifier.notify(&json!({ "text": "x" })).await.unwrap_err();
    assert!(matches!(err, WatcherError::Notify(_)));
    assert!(!err.is_fatal());
}
