use std::sync::Arc;

use crate::config::Config;
use crate::covers::CoverArtPipeline;
use crate::db::DbPool;
use crate::events::EventBus;
use crate::metadata::MetadataProvider;
use crate::notify::ChapterNotifier;

/// Everything an indexer needs, shared between all libraries.
#[derive(Clone)]
pub struct IndexContext {
    pub config: Arc<Config>,
    pub db: DbPool,
    pub covers: Arc<CoverArtPipeline>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub notifier: Arc<dyn ChapterNotifier>,
    pub events: EventBus,
}

impl IndexContext {
    pub fn new(
        config: Config,
        db: DbPool,
        covers: CoverArtPipeline,
        metadata: Arc<dyn MetadataProvider>,
        notifier: Arc<dyn ChapterNotifier>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            db,
            covers: Arc::new(covers),
            metadata,
            notifier,
            events: EventBus::new(),
        }
    }
}
