//! # Application State
//!
//! Shared state for the Axum application: the attachment manager (which
//! owns the database and projection cache), the exporter, configuration,
//! and the optional Postgres pool.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use evtag_attach::AttachmentManager;
use evtag_cache::{MemoryBackend, ProjectionCache};
use evtag_core::{Deadline, EvtagConfig};
use evtag_export::{Exporter, LogMailer, Mailer, MemoryObjectStorage, ObjectStorage};
use evtag_store::{BlobStore, Database, DocumentRenderer, MemoryBlobStore, PlainPdfRenderer};

/// Budget for one request's transaction.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(30);

/// Shared application state passed to all route handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub manager: AttachmentManager,
    pub exporter: Exporter,
    pub config: Arc<EvtagConfig>,
    pub pool: Option<PgPool>,
}

/// The pluggable collaborators behind an [`AppState`].
pub struct Backends {
    pub blobs: Arc<dyn BlobStore>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub storage: Arc<dyn ObjectStorage>,
    pub mailer: Arc<dyn Mailer>,
}

impl Backends {
    /// Everything in process; mail goes to the log.
    pub fn in_memory() -> Self {
        Self {
            blobs: Arc::new(MemoryBlobStore::new()),
            renderer: Arc::new(PlainPdfRenderer),
            storage: Arc::new(MemoryObjectStorage::new("https://files.invalid/")),
            mailer: Arc::new(LogMailer),
        }
    }
}

impl AppState {
    pub fn new(db: Arc<Database>, backends: Backends, config: EvtagConfig) -> Self {
        let config = Arc::new(config);
        let cache = Arc::new(ProjectionCache::new(
            Arc::new(MemoryBackend::new()),
            config.cache.ttl(),
        ));
        let manager = AttachmentManager::new(
            Arc::clone(&db),
            Arc::clone(&backends.blobs),
            Arc::clone(&backends.renderer),
            cache,
            Arc::clone(&config),
        );
        let exporter = Exporter::new(
            db,
            backends.blobs,
            backends.renderer,
            backends.storage,
            backends.mailer,
            config.export.clone(),
        );
        Self {
            manager,
            exporter,
            config,
            pool: None,
        }
    }

    /// An empty in-memory service with default configuration.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(Database::new()),
            Backends::in_memory(),
            EvtagConfig::default(),
        )
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn database(&self) -> &Arc<Database> {
        self.manager.database()
    }

    pub fn deadline(&self) -> Deadline {
        Deadline::after(REQUEST_DEADLINE)
    }
}
