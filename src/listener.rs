//! Keeps the indexer registry in step with library lifecycle events.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db::queries::libraries;
use crate::events::{LibraryAction, LibraryEvent};
use crate::indexer::IndexerRegistry;

pub struct NotificationListener {
    registry: Arc<IndexerRegistry>,
}

impl NotificationListener {
    pub fn new(registry: Arc<IndexerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<IndexerRegistry> {
        &self.registry
    }

    /// Start an indexer for every library in the catalog. Libraries with an
    /// invalid schedule are logged and left out.
    pub async fn bootstrap(&self) -> Result<usize, sqlx::Error> {
        let all = libraries::list_all(&self.registry.context().db).await?;
        let mut started = 0;
        for library in all {
            let slug = library.slug.clone();
            match self.registry.start(library) {
                Ok(_) => started += 1,
                Err(e) => warn!("Library {slug} not scheduled: {e}"),
            }
        }
        info!("Started {started} library indexers");
        Ok(started)
    }

    pub async fn handle(&self, event: &LibraryEvent) {
        debug!("Library event: {} {}", event.action, event.slug);
        match &event.action {
            LibraryAction::Created => self.start_from_store(&event.slug, false).await,
            LibraryAction::Updated => self.start_from_store(&event.slug, true).await,
            LibraryAction::Deleted => {
                if !self.registry.remove(&event.slug) {
                    debug!("No indexer registered for deleted library {}", event.slug);
                }
            }
            LibraryAction::Other(name) => {
                info!("Ignoring library event {name:?} for {}", event.slug);
            }
        }
    }

    async fn start_from_store(&self, slug: &str, replace: bool) {
        let library = match libraries::get(&self.registry.context().db, slug).await {
            Ok(Some(library)) => library,
            Ok(None) => {
                warn!("Library {slug} not found in catalog");
                self.registry.remove(slug);
                return;
            }
            Err(e) => {
                warn!("Failed to load library {slug}: {e}");
                return;
            }
        };
        let result = if replace {
            self.registry.replace(library)
        } else {
            self.registry.start(library)
        };
        if let Err(e) = result {
            warn!("Library {slug} not scheduled: {e}");
            self.registry.remove(slug);
        }
    }

    /// Process events until `cancel` fires or the bus closes. Subscribe
    /// before calling [`bootstrap`](Self::bootstrap) so nothing is missed
    /// in between.
    pub async fn run(
        &self,
        mut events: broadcast::Receiver<LibraryEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(event) => self.handle(&event).await,
                Err(RecvError::Lagged(n)) => warn!("Library event listener missed {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Library event listener stopped");
    }
}
