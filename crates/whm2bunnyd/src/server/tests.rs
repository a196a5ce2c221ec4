//! Router tests: signature handling, payload validation, health and debug
//! surfaces, driven through `tower::ServiceExt::oneshot` without a socket.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::NaiveDate;
use tower::ServiceExt;

use whm2bunny_core::config::ProvisionConfig;
use whm2bunny_core::error::{Error, Result};
use whm2bunny_core::state::ProvisionStatus;
use whm2bunny_core::traits::{
    Certificate, DnsRecord, NewDnsRecord, NewPullZone, ProviderApi, PullZone, TrafficStats, Zone,
};
use whm2bunny_core::webhook::{sign, SIGNATURE_HEADER};
use whm2bunny_core::{Notifier, Provisioner, StateStore, Validator};

use super::{router, AppState, ReadyChecks};

const SECRET: &str = "test-webhook-secret-0123456789";

/// Provider stub where every operation succeeds immediately
struct StubProvider {
    zones: std::sync::Mutex<Vec<Zone>>,
    next_id: std::sync::atomic::AtomicI64,
}

impl StubProvider {
    fn new() -> Self {
        Self {
            zones: std::sync::Mutex::new(Vec::new()),
            next_id: std::sync::atomic::AtomicI64::new(1),
        }
    }

    fn id(&self) -> i64 {
        self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderApi for StubProvider {
    async fn create_zone(&self, domain: &str, _soa_email: &str) -> Result<Zone> {
        let zone = Zone {
            id: self.id(),
            domain: domain.to_string(),
        };
        self.zones.lock().unwrap().push(zone.clone());
        Ok(zone)
    }

    async fn zone_by_domain(&self, domain: &str) -> Result<Option<Zone>> {
        Ok(self
            .zones
            .lock()
            .unwrap()
            .iter()
            .find(|z| z.domain == domain)
            .cloned())
    }

    async fn zone_by_id(&self, id: i64) -> Result<Zone> {
        self.zones
            .lock()
            .unwrap()
            .iter()
            .find(|z| z.id == id)
            .cloned()
            .ok_or_else(|| Error::api(404, "zone not found"))
    }

    async fn delete_zone(&self, id: i64) -> Result<()> {
        self.zones.lock().unwrap().retain(|z| z.id != id);
        Ok(())
    }

    async fn list_records(&self, _zone_id: i64) -> Result<Vec<DnsRecord>> {
        Ok(Vec::new())
    }

    async fn add_record(&self, _zone_id: i64, record: &NewDnsRecord) -> Result<DnsRecord> {
        Ok(DnsRecord {
            id: self.id(),
            kind: record.kind,
            name: record.name.clone(),
            value: record.value.clone(),
            ttl: record.ttl,
            priority: record.priority,
        })
    }

    async fn update_record(
        &self,
        _zone_id: i64,
        _record_id: i64,
        _record: &NewDnsRecord,
    ) -> Result<()> {
        Ok(())
    }

    async fn delete_record(&self, _zone_id: i64, _record_id: i64) -> Result<()> {
        Ok(())
    }

    async fn create_pull_zone(&self, options: &NewPullZone) -> Result<PullZone> {
        Ok(PullZone {
            id: self.id(),
            name: options.name.clone(),
            origin_url: options.origin_url.clone(),
            hostnames: vec![format!("{}.bunnycdn.com", options.name)],
        })
    }

    async fn pull_zone_by_name(&self, _name: &str) -> Result<Option<PullZone>> {
        Ok(None)
    }

    async fn pull_zone_by_id(&self, id: i64) -> Result<PullZone> {
        Err(Error::api(404, format!("pull zone {id} not found")))
    }

    async fn list_pull_zones(&self) -> Result<Vec<PullZone>> {
        Ok(Vec::new())
    }

    async fn delete_pull_zone(&self, _id: i64) -> Result<()> {
        Ok(())
    }

    async fn add_hostname(&self, _id: i64, _hostname: &str) -> Result<()> {
        Ok(())
    }

    async fn purge_cache(&self, _id: i64) -> Result<()> {
        Ok(())
    }

    async fn certificate(&self, _id: i64) -> Result<Certificate> {
        Ok(Certificate {
            hostname: String::new(),
            issued: false,
        })
    }

    async fn pull_zone_stats(
        &self,
        _id: i64,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<TrafficStats> {
        Ok(TrafficStats::default())
    }

    fn provider_name(&self) -> &'static str {
        "stub"
    }
}

async fn test_state(dir: &tempfile::TempDir, debug: bool) -> Arc<AppState> {
    let provider: Arc<dyn ProviderApi> = Arc::new(StubProvider::new());
    let state = Arc::new(
        StateStore::open(dir.path().join("state.json"))
            .await
            .unwrap(),
    );
    let notifier = Arc::new(Notifier::disabled());
    let provisioner = Arc::new(Provisioner::new(
        provider,
        Arc::clone(&state),
        notifier,
        ProvisionConfig {
            origin_ip: "203.0.113.9".to_string(),
            soa_email: "hostmaster@example.com".to_string(),
            origin_shield_region: "SG".to_string(),
        },
    ));

    let app_state = Arc::new(AppState {
        provisioner,
        state,
        validator: Validator::new(false),
        secret: SECRET.to_string(),
        version: "0.0.0-test",
        started_at: Instant::now(),
        debug,
        checks: ReadyChecks::default(),
    });
    app_state.checks.set_provider(true);
    app_state.checks.set_notifier(true);
    app_state.checks.set_state(true);
    app_state
}

fn signed_hook(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/hook")
        .header(SIGNATURE_HEADER, sign(SECRET, body.as_bytes()))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll until the background pipeline task lands the record in a terminal
/// state
async fn wait_for_status(
    state: &Arc<AppState>,
    domain: &str,
    status: ProvisionStatus,
) -> bool {
    for _ in 0..200 {
        if let Some(record) = state.state.get_by_domain(domain).await {
            if record.status == status {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn non_post_hook_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(&dir, false).await);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/hook")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn missing_signature_is_unauthorized() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir, false).await;
    let app = router(Arc::clone(&state));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/hook")
                .body(Body::from(
                    r#"{"event":"account_created","domain":"example.com","user":"u1"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(state.state.get_by_domain("example.com").await.is_none());
}

#[tokio::test]
async fn wrong_signature_is_unauthorized() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir, false).await;
    let app = router(Arc::clone(&state));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/hook")
                .header(SIGNATURE_HEADER, "deadbeef")
                .body(Body::from(
                    r#"{"event":"account_created","domain":"example.com","user":"u1"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "unauthorized");
    assert!(state.state.get_by_domain("example.com").await.is_none());
}

#[tokio::test]
async fn valid_webhook_is_accepted_and_provisions() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir, false).await;
    let app = router(Arc::clone(&state));

    let response = app
        .oneshot(signed_hook(
            r#"{"event":"account_created","domain":"example.com","user":"u1"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert!(body["id"].as_str().is_some_and(|id| !id.is_empty()));

    assert!(wait_for_status(&state, "example.com", ProvisionStatus::Success).await);
}

#[tokio::test]
async fn duplicate_webhooks_create_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir, false).await;
    let app = router(Arc::clone(&state));

    let body = r#"{"event":"account_created","domain":"example.com","user":"u1"}"#;
    let first = app.clone().oneshot(signed_hook(body)).await.unwrap();
    let second = app.oneshot(signed_hook(body)).await.unwrap();

    assert_eq!(first.status(), StatusCode::ACCEPTED);
    assert_eq!(second.status(), StatusCode::ACCEPTED);

    // Distinct tracking ids per acknowledgment.
    let first_id = json_body(first).await["id"].as_str().unwrap().to_string();
    let second_id = json_body(second).await["id"].as_str().unwrap().to_string();
    assert_ne!(first_id, second_id);

    assert!(wait_for_status(&state, "example.com", ProvisionStatus::Success).await);
    assert_eq!(state.state.list_all().await.len(), 1);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(&dir, false).await);

    let response = app.oneshot(signed_hook("{not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid payload");
}

#[tokio::test]
async fn empty_body_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(&dir, false).await);

    let response = app.oneshot(signed_hook("")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_event_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(&dir, false).await);

    let response = app
        .oneshot(signed_hook(
            r#"{"event":"account_suspended","domain":"example.com","user":"u1"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subdomain_event_requires_parent_domain() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(&dir, false).await);

    let response = app
        .oneshot(signed_hook(
            r#"{"event":"subdomain_created","subdomain":"blog","user":"u1"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "validation failed");
}

#[tokio::test]
async fn health_ready_and_ping() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(&dir, false).await);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], "0.0.0-test");
    assert!(body["uptime"].is_number());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ready"], true);
    assert_eq!(body["checks"]["provider"], true);

    let response = app
        .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn readiness_reports_unready_collaborators() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir, false).await;
    state.checks.set_provider(false);
    let app = router(state);

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["ready"], false);
    assert_eq!(body["checks"]["provider"], false);
    assert_eq!(body["checks"]["state"], true);
}

#[tokio::test]
async fn debug_routes_absent_without_debug_flag() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(&dir, false).await);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/debug/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn debug_state_dumps_records() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir, true).await;
    state.state.create("example.com").await.unwrap();
    let app = router(Arc::clone(&state));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/debug/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["domain"], "example.com");
}

#[tokio::test]
async fn debug_retry_reenqueues_failed_record() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir, true).await;
    let record = state.state.create("example.com").await.unwrap();
    state.state.set_error(&record.id, "boom").await.unwrap();
    let app = router(Arc::clone(&state));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/debug/retry/{}", record.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    assert!(wait_for_status(&state, "example.com", ProvisionStatus::Success).await);
}

#[tokio::test]
async fn debug_retry_rejects_non_failed_records() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(&dir, true).await;
    let record = state.state.create("example.com").await.unwrap();
    let app = router(Arc::clone(&state));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/debug/retry/{}", record.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/debug/retry/no-such-id")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
