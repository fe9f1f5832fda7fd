use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::Message;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use super::*;
use crate::hub::FanoutHub;
use crate::scheduler::MockScheduler;
use crate::storage::{LogEvent, MockLogStore, MockRegistryStore};

struct TestApp {
    state: AppState,
    logs: Arc<MockLogStore>,
    scheduler: Arc<MockScheduler>,
}

fn test_app() -> TestApp {
    let logs = Arc::new(MockLogStore::new());
    let scheduler = Arc::new(MockScheduler::new());
    let state = AppState {
        registry: DeploymentRegistry::new(Arc::new(MockRegistryStore::new())),
        logs: logs.clone(),
        scheduler: scheduler.clone(),
        proxy: ProxyConfig::default(),
        proxy_port: 8000,
    };
    TestApp {
        state,
        logs,
        scheduler,
    }
}

async fn send(app: &TestApp, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = router(app.state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, value)
}

async fn create_project(app: &TestApp) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/project",
        Some(json!({"name": "site", "gitURL": "https://github.com/acme/site.git"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"]["project"].clone()
}

// ============================================================================
// Projects
// ============================================================================

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, _) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_create_project_returns_preview_url() {
    let app = test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/project",
        Some(json!({"name": "site", "gitURL": "https://github.com/acme/site.git"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    let project = &body["data"]["project"];
    let sub_domain = project["subDomain"].as_str().unwrap();
    assert_eq!(project["gitURL"], "https://github.com/acme/site.git");
    assert_eq!(
        body["data"]["url"],
        format!("http://{}.localhost:8000", sub_domain)
    );
}

#[tokio::test]
async fn test_create_project_with_requested_slug() {
    let app = test_app();
    let body = json!({"name": "site", "gitURL": "https://github.com/acme/site.git", "slug": "my-site"});

    let (status, created) = send(&app, "POST", "/project", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["data"]["project"]["subDomain"], "my-site");

    let (status, conflict) = send(&app, "POST", "/project", Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["code"], "SUBDOMAIN_TAKEN");
}

#[tokio::test]
async fn test_create_project_validation_errors() {
    let app = test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/project",
        Some(json!({"name": "", "gitURL": "ftp://example.com/repo"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["name", "gitURL"]);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/project")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = router(app.state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "BAD_REQUEST");
}

// ============================================================================
// Deployments
// ============================================================================

#[tokio::test]
async fn test_deploy_unknown_project() {
    let app = test_app();
    let (status, body) = send(&app, "POST", "/deploy", Some(json!({"projectId": "nope"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    assert!(app.scheduler.dispatched().await.is_empty());
}

#[tokio::test]
async fn test_deploy_dispatches_build() {
    let app = test_app();
    let project = create_project(&app).await;
    let project_id = project["id"].as_str().unwrap();

    let (status, body) = send(&app, "POST", "/deploy", Some(json!({"projectId": project_id}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");
    let deployment_id = body["data"]["deploymentId"].as_str().unwrap();

    let dispatched = app.scheduler.dispatched().await;
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].project_id, project_id);
    assert_eq!(dispatched[0].deployment_id, deployment_id);
    assert_eq!(dispatched[0].git_url, "https://github.com/acme/site.git");
}

#[tokio::test]
async fn test_second_deploy_conflicts_until_ready() {
    let app = test_app();
    let project = create_project(&app).await;
    let deploy = json!({"projectId": project["id"]});

    let (status, first) = send(&app, "POST", "/deploy", Some(deploy.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let deployment_id = first["data"]["deploymentId"].as_str().unwrap().to_string();

    let (status, conflict) = send(&app, "POST", "/deploy", Some(deploy.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(conflict["code"], "ACTIVE_DEPLOYMENT");

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/deployments/{}/status", deployment_id),
        Some(json!({"status": "READY"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["deployment"]["status"], "READY");

    let (status, _) = send(&app, "POST", "/deploy", Some(deploy)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.scheduler.dispatched().await.len(), 2);
}

#[tokio::test]
async fn test_failed_dispatch_marks_deployment_failed() {
    let app = test_app();
    let project = create_project(&app).await;
    let deploy = json!({"projectId": project["id"]});

    app.scheduler.set_fail_on_dispatch(true).await;
    let (status, body) = send(&app, "POST", "/deploy", Some(deploy.clone())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "DISPATCH_FAILED");

    // The failed deployment does not block the next one.
    app.scheduler.set_fail_on_dispatch(false).await;
    let (status, _) = send(&app, "POST", "/deploy", Some(deploy)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_dropped_deploy_request_still_fails_undispatched_deployment() {
    let app = test_app();
    let project = create_project(&app).await;
    let deploy = json!({"projectId": project["id"]});

    app.scheduler.set_fail_on_dispatch(true).await;
    app.scheduler
        .set_dispatch_delay(Duration::from_millis(200))
        .await;

    // Client gives up while the scheduler is still working.
    let dropped = tokio::time::timeout(
        Duration::from_millis(50),
        send(&app, "POST", "/deploy", Some(deploy.clone())),
    )
    .await;
    assert!(dropped.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;

    app.scheduler.set_fail_on_dispatch(false).await;
    app.scheduler.set_dispatch_delay(Duration::ZERO).await;
    let (status, body) = send(&app, "POST", "/deploy", Some(deploy)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn test_dropped_deploy_request_still_dispatches() {
    let app = test_app();
    let project = create_project(&app).await;
    let deploy = json!({"projectId": project["id"]});

    app.scheduler
        .set_dispatch_delay(Duration::from_millis(200))
        .await;
    let dropped = tokio::time::timeout(
        Duration::from_millis(50),
        send(&app, "POST", "/deploy", Some(deploy)),
    )
    .await;
    assert!(dropped.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(app.scheduler.dispatched().await.len(), 1);
}

#[tokio::test]
async fn test_status_update_errors() {
    let app = test_app();

    let (status, body) = send(
        &app,
        "PUT",
        "/deployments/missing/status",
        Some(json!({"status": "READY"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = send(
        &app,
        "PUT",
        "/deployments/missing/status",
        Some(json!({"status": "DONE"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"][0]["field"], "status");
}

// ============================================================================
// Logs
// ============================================================================

#[tokio::test]
async fn test_logs_newest_first() {
    let app = test_app();
    for (second, line) in [(1, "t1"), (3, "t3"), (2, "t2")] {
        app.logs
            .append(&LogEvent {
                event_id: Uuid::new_v4(),
                deployment_id: "dep-1".to_string(),
                project_id: None,
                log: line.to_string(),
                timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap(),
            })
            .await
            .unwrap();
    }

    let (status, body) = send(&app, "GET", "/logs/dep-1", None).await;

    assert_eq!(status, StatusCode::OK);
    let logs: Vec<&str> = body["logs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["log"].as_str().unwrap())
        .collect();
    assert_eq!(logs, vec!["t3", "t2", "t1"]);
    assert_eq!(body["logs"][0]["deploymentId"], "dep-1");
    assert!(body["logs"][0]["eventId"].is_string());
    assert!(body["logs"][0]["timestamp"].is_string());
}

#[tokio::test]
async fn test_logs_unknown_deployment_is_empty() {
    let app = test_app();
    let (status, body) = send(&app, "GET", "/logs/none", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logs"], json!([]));
}

#[tokio::test]
async fn test_logs_store_failure_is_internal_error() {
    struct Broken;

    #[async_trait::async_trait]
    impl LogStore for Broken {
        async fn append(&self, _: &LogEvent) -> crate::storage::Result<()> {
            Ok(())
        }
        async fn list_for_deployment(&self, _: &str) -> crate::storage::Result<Vec<LogEvent>> {
            Err(crate::storage::StorageError::Unavailable("down".to_string()))
        }
    }

    let mut app = test_app();
    app.state.logs = Arc::new(Broken);
    let (status, body) = send(&app, "GET", "/logs/dep-1", None).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "LOG_STORE_UNAVAILABLE");
    assert_eq!(body["message"], "Internal server error");
}

// ============================================================================
// Realtime
// ============================================================================

#[test]
fn test_client_message_parse() {
    let message: realtime::ClientMessage =
        serde_json::from_str(r#"{"type":"subscribe","deploymentId":"dep-1"}"#).unwrap();
    assert_eq!(
        message,
        realtime::ClientMessage::Subscribe {
            deployment_id: "dep-1".to_string()
        }
    );
    assert!(serde_json::from_str::<realtime::ClientMessage>(r#"{"type":"shout"}"#).is_err());
}

async fn next_message(rx: &mut futures::channel::mpsc::UnboundedReceiver<Message>) -> Message {
    tokio::time::timeout(Duration::from_secs(2), futures::StreamExt::next(rx))
        .await
        .expect("timed out")
        .expect("closed")
}

#[tokio::test]
async fn test_realtime_pump_subscribe_and_stream() {
    let hub = Arc::new(FanoutHub::default());
    let (client_tx, server_rx) = futures::channel::mpsc::unbounded::<Result<Message, axum::Error>>();
    let (server_tx, mut client_rx) = futures::channel::mpsc::unbounded::<Message>();

    let pump = tokio::spawn(realtime::pump(server_tx, server_rx, hub.clone()));

    client_tx
        .unbounded_send(Ok(Message::Text("garbage".to_string())))
        .unwrap();
    client_tx
        .unbounded_send(Ok(Message::Text(
            r#"{"type":"subscribe","deploymentId":"dep-1"}"#.to_string(),
        )))
        .unwrap();

    assert_eq!(next_message(&mut client_rx).await, Message::Text("Joined logs:dep-1".to_string()));

    hub.publish("dep-1", "cloning repository").await;
    assert_eq!(next_message(&mut client_rx).await, Message::Text("cloning repository".to_string()));

    // Closing the client side disconnects from the hub.
    drop(client_tx);
    tokio::time::timeout(Duration::from_secs(2), pump)
        .await
        .expect("pump did not stop")
        .unwrap();
    assert_eq!(hub.channel_count().await, 0);
}
