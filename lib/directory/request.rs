//! Subscriptions, readiness and needy-file selection.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::file::{FileKey, FileRecord};
use super::state::DirectoryState;
use crate::attributes::AttributeSet;

/// What a subscription is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallbackTarget {
    /// Every entry of the directory.
    AllFiles,
    /// One entry, by name.
    File(String),
    /// The observed directory itself.
    Directory,
}

/// Identifies a subscriber. Callback and monitor identity is `(target, client)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

static NEXT_CLIENT: AtomicU64 = AtomicU64::new(1);

impl ClientId {
    /// Wrap a caller-chosen identifier.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// A process-unique identifier that no other `next()` call returns.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CLIENT.fetch_add(1, Ordering::Relaxed) | 1 << 63)
    }
}

/// What a fired callback receives.
#[derive(Debug, Clone)]
pub enum Ready {
    /// The single file the callback targeted.
    File(FileRecord),
    /// Every entry of the directory, for callbacks targeting [`CallbackTarget::AllFiles`].
    AllFiles(Vec<FileRecord>),
}

impl Ready {
    /// The records carried, whichever variant this is.
    #[must_use]
    pub fn into_files(self) -> Vec<FileRecord> {
        match self {
            Self::File(record) => vec![record],
            Self::AllFiles(records) => records,
        }
    }
}

/// A one-shot readiness callback.
pub type ReadyCallback = Box<dyn FnOnce(Ready) + Send>;

/// A resolved subscription target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Target {
    All,
    File(FileKey),
}

impl Target {
    fn covers(self, record: &FileRecord) -> bool {
        match self {
            Self::All => !record.is_self,
            Self::File(key) => key == record.key,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Monitor {
    pub(crate) target: Target,
    pub(crate) attrs: AttributeSet,
    pub(crate) client: ClientId,
}

pub(crate) struct PendingCallback {
    pub(crate) target: Target,
    pub(crate) attrs: AttributeSet,
    pub(crate) client: ClientId,
    pub(crate) callback: ReadyCallback,
}

impl fmt::Debug for PendingCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCallback")
            .field("target", &self.target)
            .field("attrs", &self.attrs)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

/// One resolvable attribute category, each with at most one operation in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Category {
    FileList,
    FileInfo,
    ItemCount,
    DeepCount,
    PreviewText,
    ActivationTarget,
}

impl Category {
    pub(crate) fn attr(self) -> AttributeSet {
        match self {
            Self::FileList => AttributeSet::FILE_LIST,
            Self::FileInfo => AttributeSet::FILE_INFO,
            Self::ItemCount => AttributeSet::ITEM_COUNT,
            Self::DeepCount => AttributeSet::DEEP_COUNT,
            Self::PreviewText => AttributeSet::PREVIEW_TEXT,
            Self::ActivationTarget => AttributeSet::ACTIVATION_TARGET,
        }
    }

    /// Whether the record is missing this category's value. Never true for the file list, which
    /// belongs to the directory rather than to a file.
    pub(crate) fn lacks(self, record: &FileRecord) -> bool {
        match self {
            Self::FileList => false,
            Self::FileInfo => record.lacks_info(),
            Self::ItemCount => record.lacks_item_count(),
            Self::DeepCount => record.lacks_deep_count(),
            Self::PreviewText => record.lacks_preview(),
            Self::ActivationTarget => record.lacks_activation_target(),
        }
    }
}

/// Whether `record` has a settled value for every per-file flag in `attrs`.
fn record_satisfies(record: &FileRecord, attrs: AttributeSet) -> bool {
    if record.is_gone {
        return true;
    }
    if attrs.contains(AttributeSet::FILE_INFO) && record.lacks_info() {
        return false;
    }
    let derived = attrs
        & (AttributeSet::ITEM_COUNT
            | AttributeSet::DEEP_COUNT
            | AttributeSet::PREVIEW_TEXT
            | AttributeSet::ACTIVATION_TARGET);
    if derived.is_empty() {
        return true;
    }
    if !record.kind_settled() {
        return false;
    }
    [
        Category::ItemCount,
        Category::DeepCount,
        Category::PreviewText,
        Category::ActivationTarget,
    ]
    .into_iter()
    .filter(|cat| derived.contains(cat.attr()))
    .all(|cat| !cat.lacks(record))
}

impl DirectoryState {
    fn requests(&self) -> impl Iterator<Item = (Target, AttributeSet)> + '_ {
        self.monitors
            .iter()
            .map(|m| (m.target, m.attrs))
            .chain(self.callbacks.iter().map(|c| (c.target, c.attrs)))
    }

    /// Whether any monitor or pending callback wants `attr` for anything.
    pub(crate) fn anyone_wants(&self, attr: AttributeSet) -> bool {
        self.requests().any(|(_, attrs)| attrs.intersects(attr))
    }

    fn wants(&self, record: &FileRecord, attr: AttributeSet) -> bool {
        self.requests()
            .any(|(target, attrs)| attrs.intersects(attr) && target.covers(record))
    }

    /// Whether the record lacks the category's value and someone wants it.
    pub(crate) fn is_needy(&self, key: FileKey, category: Category) -> bool {
        self.records
            .get(&key)
            .is_some_and(|r| category.lacks(r) && self.wants(r, category.attr()))
    }

    /// The file to work on next for `category`: the first listed file that lacks it and is
    /// wanted, then the directory's own record.
    pub(crate) fn select_needy(&self, category: Category) -> Option<FileKey> {
        if !self.anyone_wants(category.attr()) {
            return None;
        }
        let listed = self.files.iter().copied().find(|key| self.is_needy(*key, category));
        listed.or_else(|| {
            self.self_key
                .filter(|key| self.is_needy(*key, category))
        })
    }

    /// Whether `(target, attrs)` is satisfied by the current state.
    pub(crate) fn is_satisfied(&self, target: Target, attrs: AttributeSet) -> bool {
        if attrs.contains(AttributeSet::METADATA) && !self.metadata.is_loaded() {
            return false;
        }
        if attrs.contains(AttributeSet::FILE_LIST) && !self.fully_listed {
            return false;
        }
        if !attrs.intersects(AttributeSet::PER_FILE) {
            return true;
        }
        match target {
            Target::All => self
                .files
                .iter()
                .filter_map(|key| self.records.get(key))
                .all(|r| record_satisfies(r, attrs)),
            Target::File(key) => self
                .records
                .get(&key)
                .is_none_or(|r| record_satisfies(r, attrs)),
        }
    }

    /// Invoke every satisfied callback, removing each before it runs.
    pub(crate) fn fire_ready_callbacks(&mut self) {
        while let Some(index) = self
            .callbacks
            .iter()
            .position(|cb| self.is_satisfied(cb.target, cb.attrs))
        {
            let pending = self.callbacks.remove(index);
            let ready = self.ready_payload(pending.target);
            tracing::trace!(dir = ?self.path, client = ?pending.client, "Firing ready callback.");
            (pending.callback)(ready);
        }
    }

    fn ready_payload(&self, target: Target) -> Ready {
        match target {
            Target::All => Ready::AllFiles(self.snapshot_files()),
            Target::File(key) => match self.records.get(&key) {
                Some(record) => Ready::File(record.clone()),
                None => Ready::AllFiles(Vec::new()),
            },
        }
    }

    pub(crate) fn references(&self, key: FileKey) -> bool {
        self.requests().any(|(target, _)| target == Target::File(key))
            || self.in_flight_targets().any(|k| k == key)
    }
}

/// Extra requests implied by a subscription.
pub(crate) fn expand(target: &CallbackTarget, attrs: AttributeSet, is_monitor: bool) -> AttributeSet {
    let mut attrs = attrs.with_dependencies();
    if *target == CallbackTarget::AllFiles && (is_monitor || !attrs.is_empty()) {
        attrs |= AttributeSet::FILE_LIST;
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::{CallbackTarget, ClientId, expand};
    use crate::attributes::AttributeSet;

    #[test]
    fn all_files_monitor_always_lists() {
        let attrs = expand(&CallbackTarget::AllFiles, AttributeSet::empty(), true);
        assert_eq!(attrs, AttributeSet::FILE_LIST);
    }

    #[test]
    fn empty_all_files_callback_does_not_list() {
        let attrs = expand(&CallbackTarget::AllFiles, AttributeSet::empty(), false);
        assert!(attrs.is_empty());
    }

    #[test]
    fn specific_file_counts_pull_in_info_only() {
        let attrs = expand(
            &CallbackTarget::File("a".into()),
            AttributeSet::ITEM_COUNT,
            false,
        );
        assert_eq!(attrs, AttributeSet::ITEM_COUNT | AttributeSet::FILE_INFO);
    }

    #[test]
    fn generated_client_ids_do_not_collide_with_small_manual_ones() {
        let generated = ClientId::next();
        assert_ne!(generated, ClientId::new(1));
        assert_ne!(generated, ClientId::next());
    }
}
