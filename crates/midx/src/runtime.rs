//! Process-wide state: the window cache plus the pack registry.
//!
//! Both have process lifetime in normal use, reachable through
//! [`MidxRuntime::global`]. Everything also accepts an explicitly built
//! runtime, which is what tests do to get private caches with tight
//! limits. Teardown is plain drop; a runtime outliving its readers and
//! writers simply holds empty tables.

use std::sync::{Arc, OnceLock};

use midx_utils::NormalPath;

use crate::mwindow::MwindowCache;
use crate::registry::{PackFileRegistry, PackSource};
use crate::MidxError;

pub struct MidxRuntime {
    mwindow: Arc<MwindowCache>,
    packs: PackFileRegistry,
}

impl MidxRuntime {
    /// A runtime with default cache limits.
    pub fn new() -> Arc<Self> {
        Self::with_cache(MwindowCache::new())
    }

    /// A runtime over an explicitly configured window cache.
    pub fn with_cache(mwindow: Arc<MwindowCache>) -> Arc<Self> {
        Arc::new(Self {
            mwindow,
            packs: PackFileRegistry::default(),
        })
    }

    /// The process-wide runtime. Initialised once, on first use.
    pub fn global() -> &'static Arc<MidxRuntime> {
        static RUNTIME: OnceLock<Arc<MidxRuntime>> = OnceLock::new();
        RUNTIME.get_or_init(MidxRuntime::new)
    }

    pub fn mwindow(&self) -> &Arc<MwindowCache> {
        &self.mwindow
    }

    pub fn packs(&self) -> &PackFileRegistry {
        &self.packs
    }

    /// Open (or reference) the pack at `path` through the registry.
    pub fn open_pack(&self, path: &NormalPath) -> Result<Arc<PackSource>, MidxError> {
        self.packs.get(&self.mwindow, path)
    }

    /// Return a pack reference obtained from [`open_pack`](Self::open_pack).
    pub fn return_pack(&self, pack: Arc<PackSource>) -> Result<(), MidxError> {
        self.packs.put(pack)
    }
}
