//! Metadata writes buffered while a directory's store is not loaded yet.

use std::path::Path;

use rustc_hash::FxHashMap;

use super::MetadataStore;

/// Identifies one stored attribute of a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    /// A single string value.
    Value(String),
    /// A list value, addressed by list key and subkey.
    List(String, String),
}

/// A buffered write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingValue {
    /// A string write, remembering the default it was written against.
    Value {
        /// The caller's default at write time.
        default: Option<String>,
        /// The written value.
        value: Option<String>,
    },
    /// A list write.
    List(Vec<String>),
}

impl PendingValue {
    fn apply(&self, store: &dyn MetadataStore, dir: &Path, file: &str, key: &MetadataKey) {
        match (key, self) {
            (MetadataKey::Value(key), Self::Value { default, value }) => {
                store.set(dir, file, key, default.as_deref(), value.as_deref());
            }
            (MetadataKey::List(key, subkey), Self::List(values)) => {
                store.set_list(dir, file, key, subkey, values);
            }
            _ => tracing::warn!(file, key = ?key, "Buffered metadata has mismatched shape."),
        }
    }
}

type FileChanges = FxHashMap<MetadataKey, PendingValue>;

/// Per-file table of writes not yet applied to the store.
#[derive(Debug, Default)]
pub struct PendingMetadata {
    files: FxHashMap<String, FileChanges>,
}

impl PendingMetadata {
    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Read a string value, falling back to `default` when nothing was written or the written
    /// value equals the default it was written against.
    #[must_use]
    pub fn get(&self, file: &str, key: &str, default: Option<&str>) -> Option<String> {
        let written = self
            .files
            .get(file)
            .and_then(|changes| changes.get(&MetadataKey::Value(key.to_owned())));
        match written {
            Some(PendingValue::Value {
                default: written_default,
                value,
            }) if value != written_default => value.clone(),
            _ => default.map(str::to_owned),
        }
    }

    /// Read a list value. Empty when nothing was written.
    #[must_use]
    pub fn get_list(&self, file: &str, key: &str, subkey: &str) -> Vec<String> {
        self.files
            .get(file)
            .and_then(|changes| {
                changes.get(&MetadataKey::List(key.to_owned(), subkey.to_owned()))
            })
            .map_or_else(Vec::new, |value| match value {
                PendingValue::List(values) => values.clone(),
                PendingValue::Value { .. } => Vec::new(),
            })
    }

    /// Buffer a string write. Returns whether the buffered state changed.
    pub fn set(&mut self, file: &str, key: &str, default: Option<&str>, value: Option<&str>) -> bool {
        self.insert(
            file,
            MetadataKey::Value(key.to_owned()),
            PendingValue::Value {
                default: default.map(str::to_owned),
                value: value.map(str::to_owned),
            },
        )
    }

    /// Buffer a list write. Returns whether the buffered state changed.
    pub fn set_list(&mut self, file: &str, key: &str, subkey: &str, values: &[String]) -> bool {
        self.insert(
            file,
            MetadataKey::List(key.to_owned(), subkey.to_owned()),
            PendingValue::List(values.to_vec()),
        )
    }

    fn insert(&mut self, file: &str, key: MetadataKey, value: PendingValue) -> bool {
        let changes = self.files.entry(file.to_owned()).or_default();
        if changes.get(&key) == Some(&value) {
            return false;
        }
        changes.insert(key, value);
        true
    }

    /// Drop everything buffered for `file`.
    pub fn remove(&mut self, file: &str) -> bool {
        self.files.remove(file).is_some()
    }

    /// Move buffered writes from `old` to `new`, discarding whatever `new` had.
    pub fn rename(&mut self, old: &str, new: &str) {
        self.files.remove(new);
        if let Some(changes) = self.files.remove(old) {
            self.files.insert(new.to_owned(), changes);
        }
    }

    /// Buffered writes for one file, for copying them elsewhere.
    #[must_use]
    pub fn file_changes(&self, file: &str) -> Vec<(MetadataKey, PendingValue)> {
        self.files.get(file).map_or_else(Vec::new, |changes| {
            changes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
    }

    /// Replay every buffered write against `store` and empty the table.
    pub fn drain_into(&mut self, store: &dyn MetadataStore, dir: &Path) {
        for (file, changes) in self.files.drain() {
            for (key, value) in &changes {
                value.apply(store, dir, &file, key);
            }
        }
    }

    /// Buffer a write copied from another table.
    pub fn apply_change(&mut self, file: &str, key: MetadataKey, value: PendingValue) -> bool {
        self.insert(file, key, value)
    }
}

/// Apply one copied change directly to a loaded store.
pub fn apply_to_store(
    store: &dyn MetadataStore,
    dir: &Path,
    file: &str,
    key: &MetadataKey,
    value: &PendingValue,
) {
    value.apply(store, dir, file, key);
}

#[cfg(test)]
mod tests {
    use super::PendingMetadata;

    #[test]
    fn value_equal_to_its_default_reads_as_the_callers_default() {
        let mut table = PendingMetadata::default();
        assert!(table.set("a.txt", "icon", Some("plain"), Some("plain")));
        assert_eq!(
            table.get("a.txt", "icon", Some("fallback")).as_deref(),
            Some("fallback")
        );
    }

    #[test]
    fn repeated_identical_write_is_not_a_change() {
        let mut table = PendingMetadata::default();
        assert!(table.set("a.txt", "icon", None, Some("star")));
        assert!(!table.set("a.txt", "icon", None, Some("star")));
        assert!(table.set("a.txt", "icon", None, Some("moon")));
        assert_eq!(table.get("a.txt", "icon", None).as_deref(), Some("moon"));
    }

    #[test]
    fn rename_replaces_destination_entries() {
        let mut table = PendingMetadata::default();
        table.set("old", "k", None, Some("1"));
        table.set("new", "k", None, Some("2"));
        table.set("new", "other", None, Some("3"));
        table.rename("old", "new");
        assert_eq!(table.get("new", "k", None).as_deref(), Some("1"));
        assert_eq!(table.get("new", "other", None), None);
        assert_eq!(table.get("old", "k", None), None);
    }

    #[test]
    fn lists_are_kept_per_subkey() {
        let mut table = PendingMetadata::default();
        let tags = vec!["red".to_owned(), "blue".to_owned()];
        table.set_list("a", "keywords", "word", &tags);
        assert_eq!(table.get_list("a", "keywords", "word"), tags);
        assert!(table.get_list("a", "keywords", "other").is_empty());
    }
}
