//! Event types and event bus for the migration core
//!
//! Events are facts published after a command's successful commit. They
//! fan out to zero or more independent subscribers; a subscriber
//! failing or lagging never affects the command that produced the
//! event.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Migration event types
///
/// Events are broadcast via [`EventBus`] and can be serialized for
/// transmission to a presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MigrationEvent {
    /// A project was created (or copied into existence)
    ProjectCreated {
        project_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A project and all of its descendants were deleted
    ProjectDeleted {
        project_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A data source was added to a project
    DataSourceAdded {
        data_source_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A data source (and its imports/rows) was deleted from a project
    ProjectDataSourceDeleted {
        project_id: Uuid,
        data_source_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast event bus
///
/// Thin wrapper over `tokio::sync::broadcast`: publishers never block,
/// each subscriber gets every event emitted after it subscribed, and
/// slow subscribers see `Lagged` rather than stalling the publisher.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<MigrationEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity.
    ///
    /// Capacity bounds how many events a slow subscriber may fall
    /// behind before it starts losing the oldest ones.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events.
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<MigrationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers.
    ///
    /// Returns the number of subscribers that received the event. Zero
    /// subscribers is a normal condition, not an error: events are
    /// post-commit notifications and nothing is required to listen.
    pub fn emit(&self, event: MigrationEvent) -> usize {
        match self.tx.send(event) {
            Ok(count) => count,
            Err(_) => {
                tracing::debug!("Event emitted with no subscribers");
                0
            }
        }
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
