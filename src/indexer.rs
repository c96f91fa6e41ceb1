//! Per-library scan scheduling and the registry of running indexers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db::models::Library;
use crate::scanner::cleanup::{self, CleanupStats};
use crate::scanner::{FolderScanner, ScanError, ScanStats};
use crate::scheduler::{self, Schedule, ScheduleError};
use crate::state::IndexContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexerState {
    Idle = 0,
    Scheduled = 1,
    Running = 2,
    Stopped = 3,
}

impl IndexerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Scheduled,
            2 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// Result of one scan. `cleanup` is set when the scan ran to completion and
/// orphan removal was started in the background.
pub struct ScanOutcome {
    pub stats: ScanStats,
    pub cleanup: Option<JoinHandle<Result<CleanupStats, sqlx::Error>>>,
}

/// Clears the run flag when a scan ends, including by panic.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the recurring scan job of one library.
pub struct LibraryIndexer {
    ctx: IndexContext,
    library: Library,
    schedule: Schedule,
    running: AtomicBool,
    state: AtomicU8,
    cancel: CancellationToken,
    job: Mutex<Option<JoinHandle<()>>>,
}

impl LibraryIndexer {
    /// An empty library schedule falls back to `scanner.default_schedule`.
    pub fn new(ctx: IndexContext, library: Library) -> Result<Arc<Self>, ScheduleError> {
        let expr = if library.schedule.trim().is_empty() {
            ctx.config.scanner.default_schedule.clone()
        } else {
            library.schedule.clone()
        };
        let schedule = Schedule::parse(&expr)?;
        Ok(Arc::new(Self {
            ctx,
            library,
            schedule,
            running: AtomicBool::new(false),
            state: AtomicU8::new(IndexerState::Idle as u8),
            cancel: CancellationToken::new(),
            job: Mutex::new(None),
        }))
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn state(&self) -> IndexerState {
        IndexerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register the recurring job. Does nothing once stopped or when already
    /// scheduled.
    pub fn start(self: &Arc<Self>) {
        if self
            .state
            .compare_exchange(
                IndexerState::Idle as u8,
                IndexerState::Scheduled as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }
        info!("Library {} scheduled: {}", self.library.slug, self.schedule);

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    now = scheduler::wait_next_minute() => {
                        if this.schedule.matches(&now) {
                            this.trigger();
                        }
                    }
                }
            }
            debug!("Recurring job for {} ended", this.library.slug);
        });
        *self.job.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Fire one scheduled scan in the background. Dropped with a warning if
    /// a scan of this library is still running.
    pub fn trigger(self: &Arc<Self>) {
        if self.is_running() {
            warn!(
                "Scheduled scan of {} skipped: previous scan still running",
                self.library.slug
            );
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this.scan_once().await {
                Ok(_) => {}
                Err(ScanError::AlreadyRunning) => {
                    warn!(
                        "Scheduled scan of {} skipped: previous scan still running",
                        this.library.slug
                    );
                }
                Err(e) => warn!("Scheduled scan of {} failed: {e}", this.library.slug),
            }
        });
    }

    /// Run one scan now, unless one is already running for this library.
    pub async fn scan_once(&self) -> Result<ScanOutcome, ScanError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ScanError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        let previous = self.set_state_unless_stopped(IndexerState::Running);
        let stats = FolderScanner::new(&self.ctx)
            .scan(&self.library, &self.cancel)
            .await;
        let after = if previous == IndexerState::Scheduled {
            IndexerState::Scheduled
        } else {
            IndexerState::Idle
        };
        self.set_state_unless_stopped(after);

        let cleanup = if stats.cancelled {
            None
        } else {
            let db = self.ctx.db.clone();
            let library = self.library.clone();
            Some(tokio::spawn(async move {
                let result = cleanup::remove_orphans(&db, &library).await;
                if let Err(e) = &result {
                    warn!("Cleanup of {} failed: {e}", library.slug);
                }
                result
            }))
        };
        Ok(ScanOutcome { stats, cleanup })
    }

    /// Deregister the recurring job and cancel any running scan.
    ///
    /// Returns `false` if the indexer was already stopped.
    pub fn stop(&self) -> bool {
        if self.state.swap(IndexerState::Stopped as u8, Ordering::SeqCst)
            == IndexerState::Stopped as u8
        {
            return false;
        }
        self.cancel.cancel();
        if let Some(handle) = self.job.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        info!("Library indexer {} stopped", self.library.slug);
        true
    }

    fn set_state_unless_stopped(&self, next: IndexerState) -> IndexerState {
        let prev = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
                (s != IndexerState::Stopped as u8).then_some(next as u8)
            })
            .unwrap_or_else(|s| s);
        IndexerState::from_u8(prev)
    }
}

/// Active indexers by library slug.
pub struct IndexerRegistry {
    ctx: IndexContext,
    indexers: Mutex<HashMap<String, Arc<LibraryIndexer>>>,
}

impl IndexerRegistry {
    pub fn new(ctx: IndexContext) -> Self {
        Self {
            ctx,
            indexers: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &IndexContext {
        &self.ctx
    }

    /// Create and schedule an indexer for `library`. An indexer already
    /// registered under the same slug is stopped first.
    pub fn start(&self, library: Library) -> Result<Arc<LibraryIndexer>, ScheduleError> {
        let indexer = LibraryIndexer::new(self.ctx.clone(), library)?;
        indexer.start();
        let previous = self
            .lock()
            .insert(indexer.library().slug.clone(), Arc::clone(&indexer));
        if let Some(old) = previous {
            old.stop();
        }
        Ok(indexer)
    }

    /// Stop the indexer for `library.slug`, if any, and start a fresh one.
    pub fn replace(&self, library: Library) -> Result<Arc<LibraryIndexer>, ScheduleError> {
        if let Some(old) = self.lock().remove(&library.slug) {
            old.stop();
        }
        self.start(library)
    }

    pub fn remove(&self, slug: &str) -> bool {
        match self.lock().remove(slug) {
            Some(old) => {
                old.stop();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, slug: &str) -> Option<Arc<LibraryIndexer>> {
        self.lock().get(slug).cloned()
    }

    pub fn stop_all(&self) {
        let drained: Vec<_> = self.lock().drain().map(|(_, v)| v).collect();
        for indexer in drained {
            indexer.stop();
        }
    }

    pub fn slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.lock().keys().cloned().collect();
        slugs.sort();
        slugs
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<LibraryIndexer>>> {
        self.indexers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
