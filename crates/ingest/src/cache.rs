//! Request-scoped reference cache.
//!
//! Constructed fresh for every import run and passed explicitly through
//! the transformer -- never shared across runs, so a stale resolution in
//! one run can't contaminate the next. Negative results are cached too: a
//! code that resolved to nothing stays unknown for the rest of the run.

use std::collections::HashMap;

use async_trait::async_trait;
use finback_core::registry::RefKind;
use finback_core::types::DbId;
use tokio::sync::Mutex;

use crate::error::ImportError;

/// Resolves a cleaned human-readable code (scrip symbol, client code) to
/// an internal id. Implemented over Postgres in `finback-db`; tests use an
/// in-memory map.
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    async fn resolve(&self, kind: RefKind, code: &str) -> Result<Option<DbId>, ImportError>;
}

/// Per-run memo over a [`ReferenceLookup`].
///
/// The mutex is held only around map access, not across the underlying
/// lookup, so concurrent transforms for distinct codes still overlap their
/// I/O. Two concurrent misses for the same code may both hit the lookup;
/// both write the same value, which is harmless.
#[derive(Default)]
pub struct ReferenceCache {
    entries: Mutex<HashMap<(RefKind, String), Option<DbId>>>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(
        &self,
        lookup: &dyn ReferenceLookup,
        kind: RefKind,
        code: &str,
    ) -> Result<Option<DbId>, ImportError> {
        let cache_key = (kind, code.to_string());

        if let Some(cached) = self.entries.lock().await.get(&cache_key) {
            return Ok(*cached);
        }

        let resolved = lookup.resolve(kind, code).await?;
        self.entries.lock().await.insert(cache_key, resolved);
        Ok(resolved)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
