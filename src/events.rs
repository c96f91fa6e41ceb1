//! Library lifecycle events.
//!
//! Library rows are written through the helpers here so that every change
//! is also published on the [`EventBus`]. Delivery is best effort: a
//! subscriber that lags behind loses events.

use std::fmt;

use tokio::sync::broadcast;
use tracing::debug;

use crate::db::DbPool;
use crate::db::models::Library;
use crate::db::queries::libraries;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryAction {
    Created,
    Updated,
    Deleted,
    Other(String),
}

impl LibraryAction {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "create" | "created" => LibraryAction::Created,
            "update" | "updated" => LibraryAction::Updated,
            "delete" | "deleted" => LibraryAction::Deleted,
            _ => LibraryAction::Other(name.to_string()),
        }
    }
}

impl fmt::Display for LibraryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryAction::Created => f.write_str("created"),
            LibraryAction::Updated => f.write_str("updated"),
            LibraryAction::Deleted => f.write_str("deleted"),
            LibraryAction::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEvent {
    pub action: LibraryAction,
    pub slug: String,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LibraryEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: LibraryEvent) {
        // No receivers is fine; nobody is listening yet.
        if self.sender.send(event.clone()).is_err() {
            debug!("No listeners for library event {} {}", event.action, event.slug);
        }
    }

    fn emit(&self, action: LibraryAction, slug: &str) {
        self.publish(LibraryEvent {
            action,
            slug: slug.to_string(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn create_library(db: &DbPool, bus: &EventBus, library: &Library) -> Result<(), sqlx::Error> {
    libraries::upsert(db, library).await?;
    bus.emit(LibraryAction::Created, &library.slug);
    Ok(())
}

pub async fn update_library(db: &DbPool, bus: &EventBus, library: &Library) -> Result<(), sqlx::Error> {
    libraries::upsert(db, library).await?;
    bus.emit(LibraryAction::Updated, &library.slug);
    Ok(())
}

/// Returns whether a row was removed; the event is only published then.
pub async fn delete_library(db: &DbPool, bus: &EventBus, slug: &str) -> Result<bool, sqlx::Error> {
    let removed = libraries::delete(db, slug).await?;
    if removed {
        bus.emit(LibraryAction::Deleted, slug);
    }
    Ok(removed)
}
