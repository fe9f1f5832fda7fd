//! A project created through the API is served on its preview subdomain.
//!
//! Run with: cargo test --test proxy_routing
//!
//! Uses in-memory storage and a local artifact store stub.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, Method, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use shipyard::api::{self, AppState};
use shipyard::config::{Config, ProxyConfig};
use shipyard::proxy::{self, ProxyState};
use shipyard::registry::DeploymentRegistry;
use shipyard::scheduler::NoopScheduler;
use shipyard::storage::init_storage;

/// Serves `<key>` back as the body so the test can see which object was read.
async fn artifact_store() -> SocketAddr {
    let app = Router::new().fallback(|request: Request| async move {
        format!("object {}", request.uri().path())
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_created_project_is_served_on_its_subdomain() {
    let store_addr = artifact_store().await;

    let mut config = Config::for_test();
    config.proxy = ProxyConfig {
        artifact_base: format!("http://{}/__outputs", store_addr),
        root_domain: "preview.test".to_string(),
        connect_timeout_ms: 1_000,
        request_timeout_ms: 2_000,
    };
    let (logs, registry_store) = init_storage(&config.storage).await.unwrap();
    let registry = DeploymentRegistry::new(registry_store);

    let api = api::router(AppState {
        registry: registry.clone(),
        logs,
        scheduler: Arc::new(NoopScheduler),
        proxy: config.proxy.clone(),
        proxy_port: config.server.proxy_port,
    });
    let preview = proxy::router(Arc::new(ProxyState::new(registry, &config.proxy).unwrap()));

    let response = api
        .oneshot(
            axum::http::Request::builder()
                .method(Method::POST)
                .uri("/project")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"name": "Docs", "gitURL": "https://github.com/acme/docs.git", "slug": "docs"})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&text(response).await).unwrap();
    assert_eq!(body["data"]["url"], "http://docs.preview.test:8000");
    let project_id = body["data"]["project"]["id"].as_str().unwrap().to_string();

    for (path, object) in [("/", "index.html"), ("/css/site.css", "css/site.css")] {
        let response = preview
            .clone()
            .oneshot(
                axum::http::Request::builder()
                    .uri(path)
                    .header(header::HOST, "docs.preview.test:8000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            text(response).await,
            format!("object /__outputs/{}/{}", project_id, object)
        );
    }

    let response = preview
        .oneshot(
            axum::http::Request::builder()
                .uri("/")
                .header(header::HOST, "blog.preview.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
