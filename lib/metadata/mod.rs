//! Per-file key/value metadata.
//!
//! A [`MetadataStore`] is shared by every open directory. Until the store reports a directory as
//! loaded, writes for that directory are buffered in a [`PendingMetadata`] table and reads are
//! answered from it. When the load completes the table is replayed into the store under the same
//! lock readers take, so no read ever sees a half-applied table.

pub mod pending;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::io::Reply;
pub use pending::{MetadataKey, PendingMetadata, PendingValue};

/// Completion for [`MetadataStore::request_load`].
pub type LoadReply = Reply<io::Result<()>>;

/// Persistent metadata keyed by directory, file name and key.
///
/// Setters return whether anything changed. A value equal to the caller's default is stored as
/// the absence of a value.
pub trait MetadataStore: Send + Sync + 'static {
    /// Read a string value.
    fn get(&self, dir: &Path, file: &str, key: &str, default: Option<&str>) -> Option<String>;

    /// Read a list value.
    fn get_list(&self, dir: &Path, file: &str, list_key: &str, list_subkey: &str) -> Vec<String>;

    /// Write a string value.
    fn set(
        &self,
        dir: &Path,
        file: &str,
        key: &str,
        default: Option<&str>,
        value: Option<&str>,
    ) -> bool;

    /// Write a list value. An empty list removes it.
    fn set_list(
        &self,
        dir: &Path,
        file: &str,
        list_key: &str,
        list_subkey: &str,
        values: &[String],
    ) -> bool;

    /// Drop all metadata of a file.
    fn remove(&self, dir: &Path, file: &str);

    /// Move a file's metadata to a new name in the same directory.
    fn rename(&self, dir: &Path, old: &str, new: &str);

    /// Copy a file's metadata, replacing the destination's.
    fn copy(&self, src_dir: &Path, src_name: &str, dst_dir: &Path, dst_name: &str);

    /// Whether the directory's metadata has been loaded.
    fn is_loaded(&self, dir: &Path) -> bool;

    /// Start loading the directory's metadata; `done` fires once loading finished.
    fn request_load(&self, dir: &Path, done: LoadReply);
}

#[derive(Debug, Default, Clone)]
struct FileMetadata {
    values: BTreeMap<String, String>,
    lists: BTreeMap<(String, String), Vec<String>>,
}

impl FileMetadata {
    fn is_empty(&self) -> bool {
        self.values.is_empty() && self.lists.is_empty()
    }
}

#[derive(Debug, Default)]
struct DirMetadata {
    loaded: bool,
    files: FxHashMap<String, FileMetadata>,
}

/// A [`MetadataStore`] that keeps everything in memory.
///
/// Loads complete immediately unless the store was built with [`MemoryMetadataStore::deferred`],
/// in which case they wait for [`complete_loads`](MemoryMetadataStore::complete_loads).
#[derive(Default)]
pub struct MemoryMetadataStore {
    dirs: scc::HashMap<PathBuf, DirMetadata>,
    deferred: Option<Mutex<Vec<(PathBuf, LoadReply)>>>,
}

impl std::fmt::Debug for MemoryMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMetadataStore")
            .field("dirs", &self.dirs.len())
            .field("deferred", &self.deferred.is_some())
            .finish()
    }
}

impl MemoryMetadataStore {
    /// A store whose loads finish as soon as they are requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose loads finish only when [`complete_loads`](Self::complete_loads) is called.
    #[must_use]
    pub fn deferred() -> Self {
        Self {
            dirs: scc::HashMap::default(),
            deferred: Some(Mutex::new(Vec::new())),
        }
    }

    /// Finish every load requested so far. Returns how many completed.
    pub fn complete_loads(&self) -> usize {
        let waiting = self
            .deferred
            .as_ref()
            .map(|queue| std::mem::take(&mut *queue.lock()))
            .unwrap_or_default();
        let count = waiting.len();
        for (dir, done) in waiting {
            self.mark_loaded(&dir);
            done.send(Ok(()));
        }
        count
    }

    /// The value physically stored for a key, ignoring defaults.
    #[must_use]
    pub fn raw_value(&self, dir: &Path, file: &str, key: &str) -> Option<String> {
        self.dirs
            .read_sync(dir, |_, d| {
                d.files
                    .get(file)
                    .and_then(|meta| meta.values.get(key).cloned())
            })
            .flatten()
    }

    fn mark_loaded(&self, dir: &Path) {
        self.dirs.entry_sync(dir.to_path_buf()).or_default().get_mut().loaded = true;
    }

    fn with_file<R>(&self, dir: &Path, file: &str, f: impl FnOnce(&mut FileMetadata) -> R) -> R {
        let mut entry = self.dirs.entry_sync(dir.to_path_buf()).or_default();
        let files = &mut entry.get_mut().files;
        let meta = files.entry(file.to_owned()).or_default();
        let result = f(meta);
        if meta.is_empty() {
            files.remove(file);
        }
        result
    }

    fn snapshot(&self, dir: &Path, file: &str) -> Option<FileMetadata> {
        self.dirs
            .read_sync(dir, |_, d| d.files.get(file).cloned())
            .flatten()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn get(&self, dir: &Path, file: &str, key: &str, default: Option<&str>) -> Option<String> {
        self.raw_value(dir, file, key)
            .or_else(|| default.map(str::to_owned))
    }

    fn get_list(&self, dir: &Path, file: &str, list_key: &str, list_subkey: &str) -> Vec<String> {
        let key = (list_key.to_owned(), list_subkey.to_owned());
        self.snapshot(dir, file)
            .and_then(|meta| meta.lists.get(&key).cloned())
            .unwrap_or_default()
    }

    fn set(
        &self,
        dir: &Path,
        file: &str,
        key: &str,
        default: Option<&str>,
        value: Option<&str>,
    ) -> bool {
        if self.get(dir, file, key, default).as_deref() == value {
            return false;
        }
        let stored = if value == default { None } else { value };
        self.with_file(dir, file, |meta| match stored {
            Some(v) => {
                meta.values.insert(key.to_owned(), v.to_owned());
            }
            None => {
                meta.values.remove(key);
            }
        });
        true
    }

    fn set_list(
        &self,
        dir: &Path,
        file: &str,
        list_key: &str,
        list_subkey: &str,
        values: &[String],
    ) -> bool {
        if self.get_list(dir, file, list_key, list_subkey) == values {
            return false;
        }
        let key = (list_key.to_owned(), list_subkey.to_owned());
        self.with_file(dir, file, |meta| {
            if values.is_empty() {
                meta.lists.remove(&key);
            } else {
                meta.lists.insert(key, values.to_vec());
            }
        });
        true
    }

    fn remove(&self, dir: &Path, file: &str) {
        self.dirs.update_sync(dir, |_, d| d.files.remove(file));
    }

    fn rename(&self, dir: &Path, old: &str, new: &str) {
        self.dirs.update_sync(dir, |_, d| {
            d.files.remove(new);
            if let Some(meta) = d.files.remove(old) {
                d.files.insert(new.to_owned(), meta);
            }
        });
    }

    fn copy(&self, src_dir: &Path, src_name: &str, dst_dir: &Path, dst_name: &str) {
        let source = self.snapshot(src_dir, src_name);
        let mut entry = self.dirs.entry_sync(dst_dir.to_path_buf()).or_default();
        let files = &mut entry.get_mut().files;
        files.remove(dst_name);
        if let Some(meta) = source {
            files.insert(dst_name.to_owned(), meta);
        }
    }

    fn is_loaded(&self, dir: &Path) -> bool {
        self.dirs.read_sync(dir, |_, d| d.loaded).unwrap_or(false)
    }

    fn request_load(&self, dir: &Path, done: LoadReply) {
        match &self.deferred {
            Some(queue) => queue.lock().push((dir.to_path_buf(), done)),
            None => {
                self.mark_loaded(dir);
                done.send(Ok(()));
            }
        }
    }
}

struct MetadataState {
    loaded: bool,
    load_requested: bool,
    pending: PendingMetadata,
}

/// One directory's view of the shared store, with the buffering described in the module docs.
pub struct DirectoryMetadata {
    dir: Arc<Path>,
    store: Arc<dyn MetadataStore>,
    state: Mutex<MetadataState>,
}

impl std::fmt::Debug for DirectoryMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryMetadata")
            .field("dir", &self.dir)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

const TRUE_STR: &str = "true";
const FALSE_STR: &str = "false";

fn bool_str(value: bool) -> &'static str {
    if value { TRUE_STR } else { FALSE_STR }
}

impl DirectoryMetadata {
    /// Bind `dir` to `store`. Starts store-backed if the store already has the directory loaded.
    #[must_use]
    pub fn new(dir: Arc<Path>, store: Arc<dyn MetadataStore>) -> Self {
        let loaded = store.is_loaded(&dir);
        Self {
            dir,
            store,
            state: Mutex::new(MetadataState {
                loaded,
                load_requested: loaded,
                pending: PendingMetadata::default(),
            }),
        }
    }

    /// Whether reads and writes go straight to the store.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state.lock().loaded
    }

    /// Ask the store to load, unless already loaded or asked. Returns whether a request was made.
    pub(crate) fn request_load(&self, done: LoadReply) -> bool {
        {
            let mut state = self.state.lock();
            if state.loaded || state.load_requested {
                return false;
            }
            state.load_requested = true;
        }
        self.store.request_load(&self.dir, done);
        true
    }

    /// Switch to store-backed mode, replaying buffered writes first.
    pub(crate) fn finish_load(&self, result: io::Result<()>) {
        if let Err(e) = result {
            tracing::warn!(dir = ?self.dir, error = %e, "Metadata load failed; treating the store as empty.");
        }
        let mut state = self.state.lock();
        if state.loaded {
            return;
        }
        state.pending.drain_into(self.store.as_ref(), &self.dir);
        state.loaded = true;
    }

    /// Read a string value.
    #[must_use]
    pub fn get(&self, file: &str, key: &str, default: Option<&str>) -> Option<String> {
        let state = self.state.lock();
        if state.loaded {
            self.store.get(&self.dir, file, key, default)
        } else {
            state.pending.get(file, key, default)
        }
    }

    /// Read a list value.
    #[must_use]
    pub fn get_list(&self, file: &str, key: &str, subkey: &str) -> Vec<String> {
        let state = self.state.lock();
        if state.loaded {
            self.store.get_list(&self.dir, file, key, subkey)
        } else {
            state.pending.get_list(file, key, subkey)
        }
    }

    /// Write a string value. Returns whether anything changed.
    pub fn set(&self, file: &str, key: &str, default: Option<&str>, value: Option<&str>) -> bool {
        let mut state = self.state.lock();
        if state.loaded {
            self.store.set(&self.dir, file, key, default, value)
        } else {
            state.pending.set(file, key, default, value)
        }
    }

    /// Write a list value. Returns whether anything changed.
    pub fn set_list(&self, file: &str, key: &str, subkey: &str, values: &[String]) -> bool {
        let mut state = self.state.lock();
        if state.loaded {
            self.store.set_list(&self.dir, file, key, subkey, values)
        } else {
            state.pending.set_list(file, key, subkey, values)
        }
    }

    /// Read a boolean stored as `"true"`/`"false"`. Anything else yields `default`.
    #[must_use]
    pub fn get_bool(&self, file: &str, key: &str, default: bool) -> bool {
        let raw = self.get(file, key, Some(bool_str(default)));
        match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some(TRUE_STR) => true,
            Some(FALSE_STR) => false,
            Some(other) => {
                tracing::warn!(file, key, value = other, "Boolean metadata is neither true nor false.");
                default
            }
            None => default,
        }
    }

    /// Write a boolean.
    pub fn set_bool(&self, file: &str, key: &str, default: bool, value: bool) -> bool {
        self.set(file, key, Some(bool_str(default)), Some(bool_str(value)))
    }

    /// Read an integer. Values that do not start with a decimal integer yield `default`.
    #[must_use]
    pub fn get_int(&self, file: &str, key: &str, default: i64) -> i64 {
        let raw = self.get(file, key, Some(&default.to_string()));
        raw.as_deref()
            .and_then(|s| s.split_whitespace().next())
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    }

    /// Write an integer.
    pub fn set_int(&self, file: &str, key: &str, default: i64, value: i64) -> bool {
        self.set(
            file,
            key,
            Some(&default.to_string()),
            Some(&value.to_string()),
        )
    }

    /// Drop all metadata of `file`.
    pub fn remove(&self, file: &str) {
        let mut state = self.state.lock();
        if state.loaded {
            self.store.remove(&self.dir, file);
        } else {
            state.pending.remove(file);
        }
    }

    /// Move metadata from `old` to `new`, discarding what `new` had.
    pub fn rename(&self, old: &str, new: &str) {
        let mut state = self.state.lock();
        if state.loaded {
            self.store.rename(&self.dir, old, new);
        } else {
            state.pending.rename(old, new);
        }
    }

    /// Copy `src_name`'s metadata onto `dst_name` in `dst`.
    ///
    /// Store contents are copied by the store; writes still buffered in this directory are
    /// re-applied to the destination.
    pub fn copy_to(&self, src_name: &str, dst: &Self, dst_name: &str) {
        let buffered = self.state.lock().pending.file_changes(src_name);
        self.store.copy(&self.dir, src_name, &dst.dir, dst_name);
        if buffered.is_empty() {
            return;
        }
        let mut dst_state = dst.state.lock();
        for (key, value) in buffered {
            if dst_state.loaded {
                pending::apply_to_store(dst.store.as_ref(), &dst.dir, dst_name, &key, &value);
            } else {
                dst_state.pending.apply_change(dst_name, key, value);
            }
        }
    }
}
