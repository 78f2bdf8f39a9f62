//! Persistence for consents, case records, site content, audit log and analytics.
//!
//! Each table group sits behind a trait so the HTTP layer only sees
//! `Arc<dyn ...>` handles. [`PgStore`] implements all of them over one pool;
//! handler tests swap in in-memory fakes.

mod analytics;
mod audit;
mod cases;
mod consents;
mod content;

pub use analytics::{AnalyticsStore, AnalyticsSummary, DailyCount, LabelCount, NewEvent};
pub use audit::{AuditEntry, AuditOutcome, AuditRecord, AuditStore};
pub use cases::{dedupe_batch, CaseRecord, CaseStore, CaseUpdate, CaseUpsert};
pub use consents::{ConsentRecord, ConsentStore, NewConsent};
pub use content::{ContentEntry, ContentStore};

use sqlx::PgPool;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Store handles shared by every handler.
#[derive(Clone)]
pub struct Stores {
    pub consents: Arc<dyn ConsentStore>,
    pub cases: Arc<dyn CaseStore>,
    pub content: Arc<dyn ContentStore>,
    pub audit: Arc<dyn AuditStore>,
    pub analytics: Arc<dyn AnalyticsStore>,
}

impl Stores {
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            consents: store.clone(),
            cases: store.clone(),
            content: store.clone(),
            audit: store.clone(),
            analytics: store,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
