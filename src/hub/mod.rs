//! Realtime fanout hub.
//!
//! In-process pub/sub keyed by deployment id, bridging the ingestion consumer
//! to live viewer connections.
//!
//! Each connection owns a bounded outbox. Publishing never waits: lines are
//! offered with `try_send`, and when a connection's outbox is full the line
//! being published is dropped for that connection only (drop-newest). A slow
//! viewer therefore loses lines instead of delaying the consumer or other
//! viewers.
//!
//! Locking: the channel index is an `RwLock` that publishers only read.
//! Each channel has its own `Mutex`, held for the duration of one publish, so
//! lines for one deployment are delivered in publish order while unrelated
//! deployments never contend.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Default per-connection outbox capacity.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Identifier of a viewer connection.
pub type ConnectionId = u64;

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

/// Errors that can occur during hub operations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("Outbox full, subscription to {deployment_id} not acknowledged")]
    OutboxFull {
        connection: ConnectionId,
        deployment_id: String,
    },
}

/// Name of the channel carrying a deployment's logs.
pub fn channel_name(deployment_id: &str) -> String {
    format!("logs:{}", deployment_id)
}

/// Message queued for a viewer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Subscription confirmation.
    Joined { deployment_id: Arc<str> },
    /// A published log line.
    Line { deployment_id: Arc<str>, line: Arc<str> },
}

impl Outbound {
    /// Wire text for the message.
    pub fn to_text(&self) -> String {
        match self {
            Outbound::Joined { deployment_id } => format!("Joined {}", channel_name(deployment_id)),
            Outbound::Line { line, .. } => line.to_string(),
        }
    }
}

/// Receiving end of a registered connection.
pub struct Connection {
    pub id: ConnectionId,
    pub outbox: mpsc::Receiver<Outbound>,
}

#[derive(Clone)]
struct Subscriber {
    id: ConnectionId,
    sender: mpsc::Sender<Outbound>,
    dropped: Arc<AtomicU64>,
}

/// What became of an offered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Offer {
    Queued,
    /// Outbox full; the message was dropped for this connection.
    Dropped,
    Closed,
}

impl Subscriber {
    /// Offer a message without waiting.
    fn offer(&self, message: Outbound) -> Offer {
        match self.sender.try_send(message) {
            Ok(()) => Offer::Queued,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    warn!(connection_id = self.id, dropped, "Viewer outbox full, dropping lines");
                }
                Offer::Dropped
            }
            Err(TrySendError::Closed(_)) => Offer::Closed,
        }
    }

    /// Queue a subscription acknowledgement. A full outbox is an error here
    /// rather than a silent drop.
    fn acknowledge(&self, deployment_id: &Arc<str>) -> Result<()> {
        match self.offer(Outbound::Joined {
            deployment_id: Arc::clone(deployment_id),
        }) {
            Offer::Dropped => Err(HubError::OutboxFull {
                connection: self.id,
                deployment_id: deployment_id.to_string(),
            }),
            Offer::Queued | Offer::Closed => Ok(()),
        }
    }
}

#[derive(Default)]
struct Channel {
    subscribers: Mutex<Vec<Subscriber>>,
}

struct ConnectionEntry {
    subscriber: Subscriber,
    deployments: HashSet<Arc<str>>,
}

/// Process-wide registry of live log channels.
pub struct FanoutHub {
    capacity: usize,
    next_id: AtomicU64,
    channels: RwLock<HashMap<Arc<str>, Arc<Channel>>>,
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}

impl FanoutHub {
    /// Create a hub whose connections buffer up to `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            channels: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a viewer connection.
    pub async fn connect(&self) -> Connection {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, outbox) = mpsc::channel(self.capacity);

        self.connections.write().await.insert(
            id,
            ConnectionEntry {
                subscriber: Subscriber {
                    id,
                    sender,
                    dropped: Arc::new(AtomicU64::new(0)),
                },
                deployments: HashSet::new(),
            },
        );

        debug!(connection_id = id, "Viewer connected");
        Connection { id, outbox }
    }

    /// Join a connection to a deployment's channel and acknowledge it.
    ///
    /// The acknowledgement is queued before any line published after this
    /// call returns. Subscribing twice is a no-op apart from a second ack.
    /// If the connection's outbox is full the ack cannot be queued, so the
    /// subscription is not made and `OutboxFull` is returned.
    pub async fn subscribe(&self, connection: ConnectionId, deployment_id: &str) -> Result<()> {
        let deployment: Arc<str> = Arc::from(deployment_id);

        let mut connections = self.connections.write().await;
        let entry = connections
            .get_mut(&connection)
            .ok_or(HubError::UnknownConnection(connection))?;
        if entry.deployments.contains(&deployment) {
            return entry.subscriber.acknowledge(&deployment);
        }

        // Channel creation and membership happen under the index write lock so
        // a concurrent removal of an empty channel cannot orphan this
        // subscriber. The channel lock keeps publishes out until the ack is
        // queued.
        {
            let mut channels = self.channels.write().await;
            let channel = channels
                .entry(Arc::clone(&deployment))
                .or_insert_with(|| Arc::new(Channel::default()))
                .clone();
            let mut subscribers = channel.subscribers.lock().await;
            if let Err(e) = entry.subscriber.acknowledge(&deployment) {
                if subscribers.is_empty() {
                    drop(subscribers);
                    channels.remove(&deployment);
                }
                return Err(e);
            }
            subscribers.push(entry.subscriber.clone());
        }
        entry.deployments.insert(Arc::clone(&deployment));
        drop(connections);

        info!(
            connection_id = connection,
            channel = %channel_name(&deployment),
            "Viewer subscribed"
        );
        Ok(())
    }

    /// Offer a line to every subscriber of the deployment.
    ///
    /// Returns the number of connections the line was offered to.
    #[tracing::instrument(name = "hub.publish", skip(self, line), level = "debug")]
    pub async fn publish(&self, deployment_id: &str, line: &str) -> usize {
        let channel = match self.channels.read().await.get(deployment_id) {
            Some(channel) => Arc::clone(channel),
            None => return 0,
        };

        let deployment: Arc<str> = Arc::from(deployment_id);
        let line: Arc<str> = Arc::from(line);

        let mut subscribers = channel.subscribers.lock().await;
        subscribers.retain(|s| {
            s.offer(Outbound::Line {
                deployment_id: Arc::clone(&deployment),
                line: Arc::clone(&line),
            }) != Offer::Closed
        });
        subscribers.len()
    }

    /// Remove a connection from every channel it joined.
    ///
    /// Channels left without subscribers are dropped from the index.
    pub async fn disconnect(&self, connection: ConnectionId) {
        let entry = match self.connections.write().await.remove(&connection) {
            Some(entry) => entry,
            None => return,
        };

        let mut channels = self.channels.write().await;
        for deployment in &entry.deployments {
            let empty = match channels.get(deployment) {
                Some(channel) => {
                    let mut subscribers = channel.subscribers.lock().await;
                    subscribers.retain(|s| s.id != connection);
                    subscribers.is_empty()
                }
                None => false,
            };
            if empty {
                channels.remove(deployment);
            }
        }

        debug!(
            connection_id = connection,
            dropped = entry.subscriber.dropped.load(Ordering::Relaxed),
            "Viewer disconnected"
        );
    }

    /// Lines dropped for a connection because its outbox was full.
    pub async fn dropped(&self, connection: ConnectionId) -> Option<u64> {
        self.connections
            .read()
            .await
            .get(&connection)
            .map(|e| e.subscriber.dropped.load(Ordering::Relaxed))
    }

    /// Number of live channels.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Number of subscribers on a deployment's channel.
    pub async fn subscriber_count(&self, deployment_id: &str) -> usize {
        let channel = match self.channels.read().await.get(deployment_id) {
            Some(channel) => Arc::clone(channel),
            None => return 0,
        };
        let count = channel.subscribers.lock().await.len();
        count
    }
}
