use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::{LogEvent, LogStore, Result, StorageError};

/// Mock log store that keeps events in memory.
///
/// Failures can be injected either permanently (`set_fail_on_append`) or for
/// the next N appends (`fail_next_appends`), which is how transient
/// persistence outages are simulated.
#[derive(Default)]
pub struct MockLogStore {
    events: RwLock<HashMap<String, Vec<LogEvent>>>,
    fail_on_append: RwLock<bool>,
    fail_next: RwLock<usize>,
    append_attempts: RwLock<usize>,
}

impl MockLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_append(&self, fail: bool) {
        *self.fail_on_append.write().await = fail;
    }

    pub async fn fail_next_appends(&self, count: usize) {
        *self.fail_next.write().await = count;
    }

    /// Number of append calls, successful or not.
    pub async fn append_attempts(&self) -> usize {
        *self.append_attempts.read().await
    }

    /// Every stored event, in insertion order.
    pub async fn all(&self) -> Vec<LogEvent> {
        let mut events: Vec<LogEvent> = self
            .events
            .read()
            .await
            .values()
            .flatten()
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp);
        events
    }
}

#[async_trait]
impl LogStore for MockLogStore {
    async fn append(&self, event: &LogEvent) -> Result<()> {
        *self.append_attempts.write().await += 1;

        if *self.fail_on_append.read().await {
            return Err(StorageError::Unavailable("injected failure".to_string()));
        }
        {
            let mut fail_next = self.fail_next.write().await;
            if *fail_next > 0 {
                *fail_next -= 1;
                return Err(StorageError::Unavailable("injected transient failure".to_string()));
            }
        }

        self.events
            .write()
            .await
            .entry(event.deployment_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn list_for_deployment(&self, deployment_id: &str) -> Result<Vec<LogEvent>> {
        let store = self.events.read().await;
        let mut events = store.get(deployment_id).cloned().unwrap_or_default();
        // Stable sort on reversed insertion order keeps ties newest-insert first.
        events.reverse();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(events)
    }
}
