//! Cache-through enrichment: consult the lookup cache first, fall back to
//! the directory, and write successful lookups back.

use crate::db::{self, Pool};
use crate::directory::{DirectoryService, LookupError};
use crate::model::{normalize_call_sign, EnrichmentRecord};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct Enricher {
    pool: Pool,
    directory: Arc<dyn DirectoryService>,
    ttl: Duration,
}

impl Enricher {
    pub fn new(pool: Pool, directory: Arc<dyn DirectoryService>, ttl_hours: u64) -> Self {
        Self {
            pool,
            directory,
            ttl: Duration::hours(ttl_hours as i64),
        }
    }

    /// Freshness is enforced here at read time; a stale row is treated as
    /// absent and overwritten on the next successful lookup. "Not found"
    /// is never cached, so a transient absence cannot suppress a later
    /// successful lookup.
    ///
    /// Cache store failures are downgraded to warnings: a broken cache
    /// must not take enrichment down with it.
    #[instrument(skip(self))]
    pub async fn enrich(&self, call_sign: &str) -> Result<Option<EnrichmentRecord>, LookupError> {
        let call = normalize_call_sign(call_sign);
        let now = Utc::now();

        match db::cache_get(&self.pool, &call).await {
            Ok(Some(row)) if now - row.cached_at < self.ttl => {
                debug!(call = %call, "fresh cache hit");
                return Ok(Some(row.record));
            }
            Ok(_) => {}
            Err(err) => warn!(?err, call = %call, "cache read failed; falling through to lookup"),
        }

        let Some(record) = self.directory.lookup(&call).await? else {
            return Ok(None);
        };

        if let Err(err) = db::cache_upsert(&self.pool, &record, now).await {
            warn!(?err, call = %call, "failed to cache lookup result");
        }
        Ok(Some(record))
    }
}
