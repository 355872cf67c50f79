//! The current module behind a read/write lock

use std::sync::Arc;

use tokio::sync::RwLock;

use lattice_core::Module;

/// Holds the canonical module. Readers take an `Arc` snapshot and never
/// block each other; writers swap the pointer atomically. The generation
/// counter lets caches tell stale renders from current ones.
pub struct ModuleHolder {
    inner: RwLock<(Arc<Module>, u64)>,
}

impl ModuleHolder {
    pub fn new(module: Module) -> Self {
        ModuleHolder {
            inner: RwLock::new((Arc::new(module), 0)),
        }
    }

    /// An immutable snapshot of the current module.
    pub async fn snapshot(&self) -> Arc<Module> {
        self.inner.read().await.0.clone()
    }

    /// Snapshot plus the generation it belongs to.
    pub async fn snapshot_with_generation(&self) -> (Arc<Module>, u64) {
        let guard = self.inner.read().await;
        (guard.0.clone(), guard.1)
    }

    /// Replace the module wholesale, bumping the generation.
    pub async fn replace(&self, module: Module) -> u64 {
        let mut guard = self.inner.write().await;
        guard.0 = Arc::new(module);
        guard.1 += 1;
        guard.1
    }
}
