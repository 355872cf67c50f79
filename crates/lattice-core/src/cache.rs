//! Canonical request hashing and the render memo

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::render::{RenderRequest, RenderedGraph};

/// How many rendered graphs the memo keeps around.
pub const RENDER_CACHE_CAPACITY: usize = 16;

/// SHA-256 over the canonical JSON form of (defaultLens, detailLens,
/// selectedNodes sorted). Equal requests always hash equal.
pub fn request_hash(request: &RenderRequest) -> String {
    let mut canonical = request.clone();
    canonical.selected.sort();
    let bytes = serde_json::to_vec(&canonical).expect("lens request serialises");
    format!("{:x}", Sha256::digest(&bytes))
}

/// A memoised render, tagged with the module generation it was computed
/// against. A stale entry is never served as a memo hit, but it still
/// works as the "previous graph" side of a diff.
#[derive(Clone)]
pub struct CachedRender {
    pub generation: u64,
    pub graph: Arc<RenderedGraph>,
}

/// Bounded memo from request hash to rendered graph. Shared across
/// handlers; the lock is never held across an await point.
pub struct RenderCache {
    inner: Mutex<LruCache<String, CachedRender>>,
}

impl RenderCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("non-zero capacity");
        RenderCache {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The entry for `hash` regardless of generation.
    pub fn get(&self, hash: &str) -> Option<CachedRender> {
        self.inner.lock().ok()?.get(hash).cloned()
    }

    /// The entry for `hash` only if it was rendered against `generation`.
    pub fn get_current(&self, hash: &str, generation: u64) -> Option<Arc<RenderedGraph>> {
        self.get(hash)
            .filter(|entry| entry.generation == generation)
            .map(|entry| entry.graph)
    }

    pub fn insert(&self, hash: String, generation: u64, graph: Arc<RenderedGraph>) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(hash, CachedRender { generation, graph });
        }
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        RenderCache::new(RENDER_CACHE_CAPACITY)
    }
}
