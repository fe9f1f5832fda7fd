use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use super::*;
use crate::registry::{Deployment, DeploymentStatus, Project, RegistryError, RegistryStore};
use crate::storage::{LogEvent, LogStore, StorageError};

fn event_at(log: &str, seconds: i64) -> LogEvent {
    LogEvent {
        event_id: Uuid::new_v4(),
        deployment_id: "dep-1".to_string(),
        project_id: None,
        log: log.to_string(),
        timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds),
    }
}

#[tokio::test]
async fn test_mock_log_store_newest_first() {
    let store = MockLogStore::new();
    store.append(&event_at("t1", 1)).await.unwrap();
    store.append(&event_at("t3", 3)).await.unwrap();
    store.append(&event_at("t2", 2)).await.unwrap();

    let lines: Vec<String> = store
        .list_for_deployment("dep-1")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.log)
        .collect();
    assert_eq!(lines, vec!["t3", "t2", "t1"]);
}

#[tokio::test]
async fn test_mock_log_store_transient_failures() {
    let store = MockLogStore::new();
    store.fail_next_appends(2).await;

    assert!(matches!(
        store.append(&event_at("a", 1)).await,
        Err(StorageError::Unavailable(_))
    ));
    assert!(store.append(&event_at("a", 1)).await.is_err());
    store.append(&event_at("a", 1)).await.unwrap();

    assert_eq!(store.append_attempts().await, 3);
    assert_eq!(store.all().await.len(), 1);
}

#[tokio::test]
async fn test_mock_log_store_permanent_failure() {
    let store = MockLogStore::new();
    store.set_fail_on_append(true).await;
    assert!(store.append(&event_at("a", 1)).await.is_err());

    store.set_fail_on_append(false).await;
    assert!(store.append(&event_at("a", 1)).await.is_ok());
}

fn project(id: &str, sub_domain: &str) -> Project {
    Project {
        id: id.to_string(),
        name: "demo".to_string(),
        git_url: "https://x".to_string(),
        sub_domain: sub_domain.to_string(),
        created_at: Utc::now(),
    }
}

fn queued(id: &str, project_id: &str) -> Deployment {
    Deployment {
        id: id.to_string(),
        project_id: project_id.to_string(),
        status: DeploymentStatus::Queued,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_mock_registry_single_active_deployment() {
    let store = MockRegistryStore::new();
    store.insert_project(&project("p1", "foo")).await.unwrap();

    store.insert_deployment(&queued("d1", "p1")).await.unwrap();
    assert!(matches!(
        store.insert_deployment(&queued("d2", "p1")).await,
        Err(RegistryError::ActiveDeployment { .. })
    ));

    store.update_status("d1", DeploymentStatus::Ready).await.unwrap();
    store.insert_deployment(&queued("d2", "p1")).await.unwrap();
}

#[tokio::test]
async fn test_mock_registry_repeated_status_is_idempotent() {
    let store = MockRegistryStore::new();
    store.insert_project(&project("p1", "foo")).await.unwrap();
    store.insert_deployment(&queued("d1", "p1")).await.unwrap();

    store.update_status("d1", DeploymentStatus::InProgress).await.unwrap();
    store.update_status("d1", DeploymentStatus::InProgress).await.unwrap();
    store.update_status("d1", DeploymentStatus::Queued).await.unwrap();
    let d = store.update_status("d1", DeploymentStatus::Failed).await.unwrap();
    assert_eq!(d.status, DeploymentStatus::Failed);
}

#[tokio::test]
async fn test_mock_registry_lookup_counts() {
    let store = MockRegistryStore::new();
    store.insert_project(&project("p1", "foo")).await.unwrap();

    assert!(store.find_project_by_sub_domain("foo").await.unwrap().is_some());
    assert!(store.find_project_by_sub_domain("bar").await.unwrap().is_none());
    assert_eq!(store.lookup_count().await, 2);
}
