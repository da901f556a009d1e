//! Process-wide table of open directories.
//!
//! A directory stays open for as long as at least one [`DirectoryLease`] on it is alive. Leases
//! are reference counted per path: cloning one increments the count, dropping one decrements it,
//! and the last drop closes the directory and removes it from the table.

use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::config::EngineConfig;
use crate::directory::DirectoryHandle;
use crate::io::IoProvider;
use crate::link::{DesktopLinks, LinkClassifier};
use crate::metadata::{MemoryMetadataStore, MetadataStore};

/// The collaborators every directory of a registry shares.
#[derive(Clone)]
pub struct EngineContext {
    /// Storage backend.
    pub io: Arc<dyn IoProvider>,
    /// Decides which files are links.
    pub links: Arc<dyn LinkClassifier>,
    /// Persistent per-file metadata.
    pub metadata: Arc<dyn MetadataStore>,
    /// Tunables.
    pub config: EngineConfig,
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EngineContext {
    /// A context over `io` with desktop-entry links, an in-memory metadata store and default
    /// settings.
    #[must_use]
    pub fn new(io: Arc<dyn IoProvider>) -> Self {
        let config = EngineConfig::default();
        Self {
            io,
            links: Arc::new(DesktopLinks::with_probe_bytes(
                config.link_probe_bytes.as_u64(),
            )),
            metadata: Arc::new(MemoryMetadataStore::new()),
            config,
        }
    }

    /// Replace the link classifier.
    #[must_use]
    pub fn with_links(mut self, links: Arc<dyn LinkClassifier>) -> Self {
        self.links = links;
        self
    }

    /// Replace the metadata store.
    #[must_use]
    pub fn with_metadata_store(mut self, metadata: Arc<dyn MetadataStore>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Replace the settings. The default link classifier picks up the new probe size.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        if config.link_probe_bytes != self.config.link_probe_bytes {
            self.links = Arc::new(DesktopLinks::with_probe_bytes(
                config.link_probe_bytes.as_u64(),
            ));
        }
        self.config = config;
        self
    }
}

struct OpenDirectory {
    handle: DirectoryHandle,
    leases: usize,
}

pub(crate) struct RegistryShared {
    ctx: EngineContext,
    open: Mutex<FxHashMap<PathBuf, OpenDirectory>>,
}

impl RegistryShared {
    pub(crate) fn lookup(&self, path: &Path) -> Option<DirectoryHandle> {
        self.open.lock().get(path).map(|d| d.handle.clone())
    }

    fn inc(&self, path: &Path) {
        if let Some(dir) = self.open.lock().get_mut(path) {
            dir.leases += 1;
        }
    }

    fn dec(&self, path: &Path) {
        let closed = {
            let mut open = self.open.lock();
            let Some(dir) = open.get_mut(path) else {
                return;
            };
            dir.leases = dir.leases.saturating_sub(1);
            if dir.leases > 0 {
                return;
            }
            open.remove(path)
        };
        if let Some(dir) = closed {
            tracing::debug!(dir = ?path, "Last lease released; closing directory.");
            dir.handle.close();
        }
    }
}

/// Opens directories and hands out leases on them.
///
/// Opening a path that is already open returns a lease on the same directory, so every observer
/// of a path shares one cache and one set of in-flight operations.
#[derive(Clone)]
pub struct DirectoryRegistry {
    shared: Arc<RegistryShared>,
}

impl fmt::Debug for DirectoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryRegistry")
            .field("open", &self.open_count())
            .finish_non_exhaustive()
    }
}

impl DirectoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                ctx,
                open: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// Lease the directory at `path`, opening it if needed.
    ///
    /// Opening spawns the directory's task, so this must be called inside a tokio runtime.
    #[must_use]
    pub fn open(&self, path: impl AsRef<Path>) -> DirectoryLease {
        let path = path.as_ref();
        let mut open = self.shared.open.lock();
        let handle = if let Some(dir) = open.get_mut(path) {
            dir.leases += 1;
            dir.handle.clone()
        } else {
            let handle = DirectoryHandle::spawn(
                Arc::from(path),
                self.shared.ctx.clone(),
                Arc::downgrade(&self.shared),
            );
            open.insert(
                path.to_path_buf(),
                OpenDirectory {
                    handle: handle.clone(),
                    leases: 1,
                },
            );
            handle
        };
        DirectoryLease {
            handle,
            registry: Arc::clone(&self.shared),
        }
    }

    /// The directory at `path`, if some lease currently keeps it open.
    #[must_use]
    pub fn lookup(&self, path: impl AsRef<Path>) -> Option<DirectoryHandle> {
        self.shared.lookup(path.as_ref())
    }

    /// Number of open directories.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.shared.open.lock().len()
    }

    /// The shared collaborators.
    #[must_use]
    pub fn context(&self) -> &EngineContext {
        &self.shared.ctx
    }
}

/// Keeps a directory open. Dereferences to its [`DirectoryHandle`].
pub struct DirectoryLease {
    handle: DirectoryHandle,
    registry: Arc<RegistryShared>,
}

impl fmt::Debug for DirectoryLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DirectoryLease")
            .field(&self.handle.path())
            .finish()
    }
}

impl DirectoryLease {
    /// A handle that does not keep the directory open.
    #[must_use]
    pub fn handle(&self) -> DirectoryHandle {
        self.handle.clone()
    }
}

impl Clone for DirectoryLease {
    fn clone(&self) -> Self {
        self.registry.inc(self.handle.path());
        Self {
            handle: self.handle.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl Drop for DirectoryLease {
    fn drop(&mut self) {
        self.registry.dec(self.handle.path());
    }
}

impl Deref for DirectoryLease {
    type Target = DirectoryHandle;

    fn deref(&self) -> &DirectoryHandle {
        &self.handle
    }
}
