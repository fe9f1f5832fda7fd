use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use tokio::sync::Mutex;

use super::*;
use crate::config::HttpSchedulerConfig;

fn task() -> BuildTask {
    BuildTask {
        project_id: "proj-1".to_string(),
        deployment_id: "dep-1".to_string(),
        git_url: "https://github.com/acme/site.git".to_string(),
    }
}

type Received = Arc<Mutex<Vec<serde_json::Value>>>;

/// Start a runner stub that records bodies and answers with `status`/`reply`.
async fn runner(status: StatusCode, reply: serde_json::Value) -> (SocketAddr, Received) {
    let received: Received = Arc::default();
    let app = Router::new()
        .route(
            "/tasks",
            post(
                move |State(received): State<Received>, Json(body): Json<serde_json::Value>| {
                    let reply = reply.clone();
                    async move {
                        received.lock().await.push(body);
                        (status, Json(reply))
                    }
                },
            ),
        )
        .with_state(received.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, received)
}

fn http_config(addr: SocketAddr) -> HttpSchedulerConfig {
    HttpSchedulerConfig {
        endpoint: Some(format!("http://{}/tasks", addr)),
        timeout_ms: 2_000,
    }
}

#[tokio::test]
async fn test_noop_scheduler_returns_handle() {
    let handle = NoopScheduler.dispatch(&task()).await.unwrap();
    assert_eq!(handle.task_id, "noop-dep-1");
}

#[tokio::test]
async fn test_http_scheduler_posts_task() {
    let (addr, received) = runner(StatusCode::OK, serde_json::json!({"taskId": "run-42"})).await;
    let scheduler = HttpScheduler::new(&http_config(addr)).unwrap();

    let handle = scheduler.dispatch(&task()).await.unwrap();

    assert_eq!(handle.task_id, "run-42");
    let bodies = received.lock().await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["projectId"], "proj-1");
    assert_eq!(bodies[0]["deploymentId"], "dep-1");
    assert_eq!(bodies[0]["gitUrl"], "https://github.com/acme/site.git");
}

#[tokio::test]
async fn test_http_scheduler_falls_back_to_deployment_id() {
    let (addr, _) = runner(StatusCode::ACCEPTED, serde_json::json!({})).await;
    let scheduler = HttpScheduler::new(&http_config(addr)).unwrap();

    let handle = scheduler.dispatch(&task()).await.unwrap();
    assert_eq!(handle.task_id, "dep-1");
}

#[tokio::test]
async fn test_http_scheduler_error_status_is_rejected() {
    let (addr, received) = runner(
        StatusCode::SERVICE_UNAVAILABLE,
        serde_json::json!({"error": "busy"}),
    )
    .await;
    let scheduler = HttpScheduler::new(&http_config(addr)).unwrap();

    let err = scheduler.dispatch(&task()).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Rejected(ref m) if m.contains("503")));
    // Not retried.
    assert_eq!(received.lock().await.len(), 1);
}

#[tokio::test]
async fn test_http_scheduler_unreachable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let scheduler = HttpScheduler::new(&http_config(addr)).unwrap();
    let err = scheduler.dispatch(&task()).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Http(_)));
}

#[test]
fn test_http_scheduler_requires_endpoint() {
    let err = HttpScheduler::new(&HttpSchedulerConfig::default())
        .err()
        .expect("missing endpoint accepted");
    assert!(matches!(err, SchedulerError::Config(_)));
}

#[tokio::test]
async fn test_init_scheduler_noop_by_default() {
    let scheduler = init_scheduler(&SchedulerConfig::default()).await.unwrap();
    assert_eq!(scheduler.name(), "noop");
}

#[cfg(not(feature = "ecs"))]
#[tokio::test]
async fn test_init_scheduler_ecs_requires_feature() {
    let config = SchedulerConfig {
        scheduler_type: SchedulerType::Ecs,
        ..SchedulerConfig::default()
    };
    assert!(init_scheduler(&config).await.is_err());
}

#[tokio::test]
async fn test_mock_scheduler_records_and_fails() {
    let scheduler = MockScheduler::new();
    scheduler.dispatch(&task()).await.unwrap();
    assert_eq!(scheduler.dispatched().await, vec![task()]);

    scheduler.set_fail_on_dispatch(true).await;
    assert!(scheduler.dispatch(&task()).await.is_err());
    assert_eq!(scheduler.dispatched().await.len(), 1);
}
