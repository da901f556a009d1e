//! Cached per-file attribute state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::io::{FileInfo, FileType};
use crate::preview;

/// Stable identity of a record within its directory. Never reused.
pub(crate) type FileKey = u64;

/// Progress of a recursive count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeepCountStatus {
    /// No walk has started, or the last result was invalidated.
    #[default]
    NotStarted,
    /// A walk is accumulating.
    InProgress,
    /// The walk finished; the totals are final.
    Done,
}

/// Recursive totals below a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeepCounts {
    /// Subdirectories found.
    pub directories: u64,
    /// Non-directory entries found.
    pub files: u64,
    /// Directories that could not be listed.
    pub unreadable: u64,
    /// Sum of every known entry size, in bytes.
    pub total_size: u64,
}

/// Everything known about one entry of a directory.
///
/// Records handed to callers are snapshots; the directory keeps the live copy.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub(crate) key: FileKey,
    pub(crate) name: String,
    pub(crate) directory: Arc<Path>,
    pub(crate) is_self: bool,

    pub(crate) unconfirmed: bool,
    pub(crate) is_gone: bool,

    pub(crate) info: Option<FileInfo>,
    pub(crate) info_failed: bool,

    pub(crate) item_count: Option<u64>,
    pub(crate) got_item_count: bool,
    pub(crate) item_count_failed: bool,

    pub(crate) deep_counts: DeepCounts,
    pub(crate) deep_count_status: DeepCountStatus,

    pub(crate) preview_text: Option<String>,
    pub(crate) got_preview_text: bool,
    pub(crate) preview_failed: bool,

    pub(crate) activation_target: Option<String>,
    pub(crate) got_activation_target: bool,
    pub(crate) activation_failed: bool,
}

impl FileRecord {
    pub(crate) fn new(key: FileKey, name: String, directory: Arc<Path>) -> Self {
        Self {
            key,
            name,
            directory,
            is_self: false,
            unconfirmed: false,
            is_gone: false,
            info: None,
            info_failed: false,
            item_count: None,
            got_item_count: false,
            item_count_failed: false,
            deep_counts: DeepCounts::default(),
            deep_count_status: DeepCountStatus::NotStarted,
            preview_text: None,
            got_preview_text: false,
            preview_failed: false,
            activation_target: None,
            got_activation_target: false,
            activation_failed: false,
        }
    }

    pub(crate) fn new_self(key: FileKey, directory: Arc<Path>) -> Self {
        let name = directory.file_name().map_or_else(
            || directory.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        );
        Self {
            is_self: true,
            ..Self::new(key, name, directory)
        }
    }

    pub(crate) fn from_info(key: FileKey, info: FileInfo, directory: Arc<Path>) -> Self {
        Self {
            info: Some(info.clone()),
            ..Self::new(key, info.name, directory)
        }
    }

    /// Name of the entry inside its directory.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path of the entry.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        if self.is_self {
            self.directory.to_path_buf()
        } else {
            self.directory.join(&self.name)
        }
    }

    /// Whether this record stands for the observed directory itself.
    #[must_use]
    pub fn is_directory_itself(&self) -> bool {
        self.is_self
    }

    /// Whether the entry is known to no longer exist.
    #[must_use]
    pub fn is_gone(&self) -> bool {
        self.is_gone
    }

    /// Whether the last listing has not (yet) re-confirmed the entry.
    #[must_use]
    pub fn is_unconfirmed(&self) -> bool {
        self.unconfirmed
    }

    /// Stat-like info, once fetched.
    #[must_use]
    pub fn info(&self) -> Option<&FileInfo> {
        self.info.as_ref()
    }

    /// Whether fetching info failed for a reason other than the entry being gone.
    #[must_use]
    pub fn info_failed(&self) -> bool {
        self.info_failed
    }

    /// Kind of the entry, when known. The directory's own record is always a directory.
    #[must_use]
    pub fn file_type(&self) -> Option<FileType> {
        if self.is_self {
            return Some(FileType::Directory);
        }
        self.info.as_ref().map(|info| info.file_type)
    }

    /// Whether the entry is known to be a directory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.file_type() == Some(FileType::Directory)
    }

    /// Number of entries directly inside, once counted.
    #[must_use]
    pub fn item_count(&self) -> Option<u64> {
        self.item_count
    }

    /// Whether the item count is known.
    #[must_use]
    pub fn got_item_count(&self) -> bool {
        self.got_item_count
    }

    /// Whether counting items failed.
    #[must_use]
    pub fn item_count_failed(&self) -> bool {
        self.item_count_failed
    }

    /// Recursive totals. Only final when [`deep_count_status`](Self::deep_count_status) is
    /// [`DeepCountStatus::Done`].
    #[must_use]
    pub fn deep_counts(&self) -> DeepCounts {
        self.deep_counts
    }

    /// Progress of the recursive count.
    #[must_use]
    pub fn deep_count_status(&self) -> DeepCountStatus {
        self.deep_count_status
    }

    /// The text preview, if the file has printable content.
    #[must_use]
    pub fn preview_text(&self) -> Option<&str> {
        self.preview_text.as_deref()
    }

    /// Whether the preview has been resolved, successfully or not.
    #[must_use]
    pub fn got_preview_text(&self) -> bool {
        self.got_preview_text
    }

    /// Whether reading the preview failed.
    #[must_use]
    pub fn preview_failed(&self) -> bool {
        self.preview_failed
    }

    /// Where the link points, when the file is a link.
    #[must_use]
    pub fn activation_target(&self) -> Option<&str> {
        self.activation_target.as_deref()
    }

    /// Whether the activation target has been resolved.
    #[must_use]
    pub fn got_activation_target(&self) -> bool {
        self.got_activation_target
    }

    /// Whether the file is a link that could not be read.
    #[must_use]
    pub fn activation_failed(&self) -> bool {
        self.activation_failed
    }

    pub(crate) fn kind_settled(&self) -> bool {
        self.is_gone || self.is_self || self.info.is_some() || self.info_failed
    }

    pub(crate) fn lacks_info(&self) -> bool {
        !self.is_gone && self.info.is_none() && !self.info_failed
    }

    pub(crate) fn lacks_item_count(&self) -> bool {
        !self.is_gone && self.is_directory() && !self.got_item_count && !self.item_count_failed
    }

    pub(crate) fn lacks_deep_count(&self) -> bool {
        !self.is_gone && self.is_directory() && self.deep_count_status != DeepCountStatus::Done
    }

    pub(crate) fn lacks_preview(&self) -> bool {
        !self.is_gone
            && !self.got_preview_text
            && self.info.as_ref().is_some_and(preview::contains_text)
    }

    pub(crate) fn lacks_activation_target(&self) -> bool {
        !self.is_gone && !self.got_activation_target && self.info.is_some()
    }

    /// Clear every one-shot attribute so it is fetched again.
    pub(crate) fn invalidate(&mut self) {
        self.info_failed = false;
        self.reset_counts();
        self.preview_text = None;
        self.got_preview_text = false;
        self.preview_failed = false;
        self.activation_target = None;
        self.got_activation_target = false;
        self.activation_failed = false;
    }

    pub(crate) fn reset_counts(&mut self) {
        self.item_count = None;
        self.got_item_count = false;
        self.item_count_failed = false;
        self.deep_counts = DeepCounts::default();
        self.deep_count_status = DeepCountStatus::NotStarted;
    }

    /// Replace the cached info. Returns whether anything observable changed.
    pub(crate) fn update_info(&mut self, info: FileInfo) -> bool {
        let changed = self.info.as_ref() != Some(&info) || self.info_failed;
        self.info = Some(info);
        self.info_failed = false;
        changed
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::FileRecord;
    use crate::io::{FileInfo, FileType};

    fn dir() -> Arc<Path> {
        Arc::from(Path::new("/data"))
    }

    #[test]
    fn counts_only_apply_to_directories_with_known_kind() {
        let mut record = FileRecord::new(1, "unknown".into(), dir());
        assert!(!record.lacks_item_count());
        record.info = Some(FileInfo::new("unknown", FileType::Directory));
        assert!(record.lacks_item_count());
        assert!(record.lacks_deep_count());
        record.item_count_failed = true;
        assert!(!record.lacks_item_count());
    }

    #[test]
    fn self_record_is_a_directory_without_info() {
        let record = FileRecord::new_self(0, dir());
        assert!(record.is_directory());
        assert_eq!(record.name(), "data");
        assert_eq!(record.path(), Path::new("/data"));
    }

    #[test]
    fn gone_records_lack_nothing() {
        let mut record = FileRecord::from_info(
            3,
            FileInfo::new("a.txt", FileType::Regular),
            dir(),
        );
        assert!(record.lacks_preview());
        record.is_gone = true;
        assert!(!record.lacks_preview());
        assert!(!record.lacks_activation_target());
        assert!(!record.lacks_info());
    }

    #[test]
    fn invalidating_clears_failures_but_keeps_info() {
        let mut record =
            FileRecord::from_info(4, FileInfo::new("sub", FileType::Directory), dir());
        record.item_count_failed = true;
        record.preview_failed = true;
        record.got_activation_target = true;
        record.activation_failed = true;

        record.invalidate();

        assert!(record.info().is_some());
        assert!(!record.item_count_failed());
        assert!(!record.preview_failed());
        assert!(!record.activation_failed());
        assert!(record.lacks_item_count());
        assert!(record.lacks_activation_target());
    }
}
