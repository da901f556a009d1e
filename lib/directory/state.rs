//! Per-directory state and the reconcile pass.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use super::actor::{Completion, Message, post};
use super::events::{DirectoryEvent, EventFanout};
use super::file::{FileKey, FileRecord};
use super::request::{
    CallbackTarget, Category, ClientId, Monitor, PendingCallback, ReadyCallback, Target, expand,
};
use crate::attributes::AttributeSet;
use crate::error::DirectoryError;
use crate::io::{FileInfo, IoProvider, ListOptions, ListingEvent, ListingSink, OpHandle, Reply};
use crate::metadata::DirectoryMetadata;
use crate::registry::{EngineContext, RegistryShared};

/// Generation tag of one backend operation. Completions carrying an id that no longer matches
/// the stored operation are stale and dropped.
pub(crate) type OpId = u64;

/// One in-flight backend operation and whatever it accumulates.
#[derive(Debug)]
pub(crate) struct InFlight<S = ()> {
    pub(crate) file: FileKey,
    pub(crate) id: OpId,
    pub(crate) handle: OpHandle,
    pub(crate) state: S,
}

impl InFlight {
    pub(crate) fn new(file: FileKey, id: OpId, handle: OpHandle) -> Self {
        Self::with_state(file, id, handle, ())
    }
}

impl<S> InFlight<S> {
    pub(crate) fn with_state(file: FileKey, id: OpId, handle: OpHandle, state: S) -> Self {
        Self {
            file,
            id,
            handle,
            state,
        }
    }
}

/// Take `slot` if it holds the operation `id`, logging a stale completion otherwise.
pub(crate) fn take_current<S>(
    slot: &mut Option<InFlight<S>>,
    id: OpId,
    category: Category,
) -> Option<InFlight<S>> {
    let current = slot.take_if(|op| op.id == id);
    if current.is_none() {
        tracing::debug!(category = ?category, id, "Discarding stale completion.");
    }
    current
}

#[derive(Debug)]
pub(crate) struct Listing {
    pub(crate) id: OpId,
    pub(crate) handle: OpHandle,
}

/// Remaining subdirectories of a recursive count.
#[derive(Debug, Default)]
pub(crate) struct DeepWalk {
    pub(crate) current: PathBuf,
    pub(crate) pending: Vec<PathBuf>,
}

/// Operations currently in flight, per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InFlightCounts {
    /// Directory listings.
    pub file_list: usize,
    /// Info fetches.
    pub file_info: usize,
    /// Item counts.
    pub item_count: usize,
    /// Recursive counts.
    pub deep_count: usize,
    /// Preview reads.
    pub preview_text: usize,
    /// Link reads.
    pub activation_target: usize,
    /// Info fetches for externally added files.
    pub new_files: usize,
}

/// A point-in-time summary of a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryStats {
    /// Entries currently listed.
    pub files: usize,
    /// Registered monitors.
    pub monitors: usize,
    /// Callbacks waiting to fire.
    pub pending_callbacks: usize,
    /// Whether a full listing has completed since the last reload.
    pub fully_listed: bool,
    /// Whether metadata is store-backed.
    pub metadata_loaded: bool,
    /// Operations in flight.
    pub in_flight: InFlightCounts,
}

/// The engine state of one observed directory.
///
/// Only the directory's actor task touches this; everything else talks to it through messages.
pub(crate) struct DirectoryState {
    pub(crate) path: Arc<Path>,
    pub(crate) ctx: EngineContext,
    pub(crate) tx: mpsc::UnboundedSender<Message>,
    pub(crate) events: EventFanout,
    pub(crate) metadata: Arc<DirectoryMetadata>,
    registry: Weak<RegistryShared>,

    next_key: FileKey,
    next_op: OpId,
    /// Set by sub-engines that settle a file without I/O, so the pass runs again.
    pub(crate) dirty: bool,

    pub(crate) records: FxHashMap<FileKey, FileRecord>,
    /// Listed entries, in the order the backend reported them.
    pub(crate) files: Vec<FileKey>,
    pub(crate) by_name: FxHashMap<String, FileKey>,
    pub(crate) self_key: Option<FileKey>,

    pub(crate) monitors: Vec<Monitor>,
    pub(crate) callbacks: Vec<PendingCallback>,

    pub(crate) fully_listed: bool,
    pub(crate) listing: Option<Listing>,
    pub(crate) pending_entries: VecDeque<FileInfo>,

    pub(crate) info: Option<InFlight>,
    pub(crate) item_count: Option<InFlight<u64>>,
    pub(crate) deep_count: Option<InFlight<DeepWalk>>,
    pub(crate) preview: Option<InFlight>,
    pub(crate) activation: Option<InFlight<FileInfo>>,
    pub(crate) new_files: FxHashMap<OpId, OpHandle>,
}

impl DirectoryState {
    pub(crate) fn new(
        path: Arc<Path>,
        ctx: EngineContext,
        tx: mpsc::UnboundedSender<Message>,
        events: EventFanout,
        metadata: Arc<DirectoryMetadata>,
        registry: Weak<RegistryShared>,
    ) -> Self {
        Self {
            path,
            ctx,
            tx,
            events,
            metadata,
            registry,
            next_key: 1,
            next_op: 1,
            dirty: false,
            records: FxHashMap::default(),
            files: Vec::new(),
            by_name: FxHashMap::default(),
            self_key: None,
            monitors: Vec::new(),
            callbacks: Vec::new(),
            fully_listed: false,
            listing: None,
            pending_entries: VecDeque::new(),
            info: None,
            item_count: None,
            deep_count: None,
            preview: None,
            activation: None,
            new_files: FxHashMap::default(),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn io(&self) -> &dyn IoProvider {
        self.ctx.io.as_ref()
    }

    pub(crate) fn next_op_id(&mut self) -> OpId {
        let id = self.next_op;
        self.next_op += 1;
        id
    }

    /// A sink that forwards listing deliveries for operation `id` back to this directory.
    pub(crate) fn listing_sink(
        &self,
        id: OpId,
        wrap: fn(OpId, ListingEvent) -> Completion,
    ) -> ListingSink {
        let tx = self.tx.clone();
        ListingSink::new(move |event| post(&tx, Message::Completion(wrap(id, event))))
    }

    /// A single-use reply that forwards its value back to this directory.
    pub(crate) fn reply<T: Send + 'static>(
        &self,
        id: OpId,
        wrap: fn(OpId, T) -> Completion,
    ) -> Reply<T> {
        let tx = self.tx.clone();
        Reply::new(move |value| post(&tx, Message::Completion(wrap(id, value))))
    }

    pub(crate) fn list_options(&self, detect_mime_type: bool) -> ListOptions {
        ListOptions {
            batch_size: self.ctx.config.listing_batch_size,
            detect_mime_type,
        }
    }

    // ---- records ----

    fn alloc_key(&mut self) -> FileKey {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    /// Add a record to the listed entries.
    pub(crate) fn insert_listed(&mut self, info: FileInfo) -> FileKey {
        let key = self.alloc_key();
        let record = FileRecord::from_info(key, info, Arc::clone(&self.path));
        self.by_name.insert(record.name.clone(), key);
        self.records.insert(key, record);
        self.files.push(key);
        key
    }

    fn ensure_named(&mut self, name: &str) -> FileKey {
        if let Some(key) = self.by_name.get(name) {
            return *key;
        }
        let key = self.alloc_key();
        let record = FileRecord::new(key, name.to_owned(), Arc::clone(&self.path));
        self.by_name.insert(name.to_owned(), key);
        self.records.insert(key, record);
        self.files.push(key);
        key
    }

    fn ensure_self(&mut self) -> FileKey {
        if let Some(key) = self.self_key {
            return key;
        }
        let key = self.alloc_key();
        self.records
            .insert(key, FileRecord::new_self(key, Arc::clone(&self.path)));
        self.self_key = Some(key);
        key
    }

    fn resolve(&mut self, target: &CallbackTarget) -> Target {
        match target {
            CallbackTarget::AllFiles => Target::All,
            CallbackTarget::File(name) => Target::File(self.ensure_named(name)),
            CallbackTarget::Directory => Target::File(self.ensure_self()),
        }
    }

    fn find(&self, target: &CallbackTarget) -> Option<Target> {
        match target {
            CallbackTarget::AllFiles => Some(Target::All),
            CallbackTarget::File(name) => self.by_name.get(name).copied().map(Target::File),
            CallbackTarget::Directory => self.self_key.map(Target::File),
        }
    }

    pub(crate) fn snapshot_files(&self) -> Vec<FileRecord> {
        self.files
            .iter()
            .filter_map(|key| self.records.get(key))
            .cloned()
            .collect()
    }

    pub(crate) fn snapshot(&self, key: FileKey) -> Option<FileRecord> {
        self.records.get(&key).cloned()
    }

    pub(crate) fn emit_changed(&self, key: FileKey) {
        if let Some(record) = self.snapshot(key) {
            self.events.emit(DirectoryEvent::FilesChanged(vec![record]));
        }
    }

    /// Mark a record gone and drop it from the listing. Returns its final snapshot when it was
    /// listed.
    pub(crate) fn retire(&mut self, key: FileKey) -> Option<FileRecord> {
        let record = self.records.get_mut(&key)?;
        record.is_gone = true;
        record.unconfirmed = false;
        if record.is_self {
            return None;
        }
        if self.by_name.get(&record.name) == Some(&key) {
            self.by_name.remove(&record.name);
        }
        let position = self.files.iter().position(|k| *k == key)?;
        self.files.remove(position);
        Some(record.clone())
    }

    /// Mark a record gone and report its removal.
    pub(crate) fn mark_gone(&mut self, key: FileKey) {
        if let Some(record) = self.retire(key) {
            self.events.emit(DirectoryEvent::FilesRemoved(vec![record]));
        } else {
            self.emit_changed(key);
        }
    }

    // ---- in-flight bookkeeping ----

    pub(crate) fn in_flight_file(&self, category: Category) -> Option<FileKey> {
        match category {
            Category::FileList => None,
            Category::FileInfo => self.info.as_ref().map(|op| op.file),
            Category::ItemCount => self.item_count.as_ref().map(|op| op.file),
            Category::DeepCount => self.deep_count.as_ref().map(|op| op.file),
            Category::PreviewText => self.preview.as_ref().map(|op| op.file),
            Category::ActivationTarget => self.activation.as_ref().map(|op| op.file),
        }
    }

    pub(crate) fn is_busy(&self, category: Category) -> bool {
        match category {
            Category::FileList => self.listing.is_some(),
            _ => self.in_flight_file(category).is_some(),
        }
    }

    pub(crate) fn in_flight_targets(&self) -> impl Iterator<Item = FileKey> + '_ {
        [
            Category::FileInfo,
            Category::ItemCount,
            Category::DeepCount,
            Category::PreviewText,
            Category::ActivationTarget,
        ]
        .into_iter()
        .filter_map(|category| self.in_flight_file(category))
    }

    /// Cancel the category's operation. Idempotent; the completion will be discarded.
    pub(crate) fn cancel(&mut self, category: Category) {
        let handle = match category {
            Category::FileList => self.listing.take().map(|op| op.handle),
            Category::FileInfo => self.info.take().map(|op| op.handle),
            Category::ItemCount => self.item_count.take().map(|op| op.handle),
            Category::DeepCount => self.deep_count.take().map(|op| op.handle),
            Category::PreviewText => self.preview.take().map(|op| op.handle),
            Category::ActivationTarget => self.activation.take().map(|op| op.handle),
        };
        if let Some(handle) = handle {
            tracing::trace!(dir = ?self.path, category = ?category, "Cancelling operation.");
            handle.cancel();
        }
    }

    fn cancel_targeting(&mut self, key: FileKey) {
        for category in [
            Category::FileInfo,
            Category::ItemCount,
            Category::DeepCount,
            Category::PreviewText,
            Category::ActivationTarget,
        ] {
            if self.in_flight_file(category) == Some(key) {
                self.cancel(category);
            }
        }
    }

    /// Cancel the category's operation if its file is no longer needy.
    pub(crate) fn stop_if_unwanted(&mut self, category: Category) {
        if let Some(file) = self.in_flight_file(category)
            && !self.is_needy(file, category)
        {
            self.cancel(category);
        }
    }

    // ---- the reconcile pass ----

    /// Bring in-flight work and pending callbacks up to date with the current state.
    pub(crate) fn reconcile(&mut self) {
        loop {
            self.dirty = false;
            self.fire_ready_callbacks();
            self.file_info_step();
            self.metadata_step();
            self.file_list_step();
            self.item_count_step();
            self.deep_count_step();
            self.preview_step();
            self.activation_step();
            if !self.dirty {
                break;
            }
        }
        self.collect_garbage();
    }

    /// Drop gone records nothing refers to any more.
    fn collect_garbage(&mut self) {
        let dead: Vec<FileKey> = self
            .records
            .values()
            .filter(|r| r.is_gone && !r.is_self && !self.references(r.key))
            .map(|r| r.key)
            .collect();
        for key in dead {
            self.records.remove(&key);
        }
    }

    // ---- subscriptions ----

    pub(crate) fn monitor_add(
        &mut self,
        target: &CallbackTarget,
        attrs: AttributeSet,
        client: ClientId,
    ) {
        let attrs = expand(target, attrs, true);
        let resolved = self.resolve(target);
        match self
            .monitors
            .iter_mut()
            .find(|m| m.target == resolved && m.client == client)
        {
            Some(existing) => existing.attrs = attrs,
            None => self.monitors.push(Monitor {
                target: resolved,
                attrs,
                client,
            }),
        }
        if resolved == Target::All {
            self.events
                .emit_files(DirectoryEvent::FilesAdded, self.snapshot_files());
        }
    }

    /// Every target a subscription on `target` may have been registered under, including
    /// records of that name that have since gone.
    fn find_all(&self, target: &CallbackTarget) -> Vec<Target> {
        match target {
            CallbackTarget::File(name) => self
                .records
                .values()
                .filter(|r| !r.is_self && r.name == *name)
                .map(|r| Target::File(r.key))
                .collect(),
            _ => self.find(target).into_iter().collect(),
        }
    }

    pub(crate) fn monitor_remove(&mut self, target: &CallbackTarget, client: ClientId) {
        let targets = self.find_all(target);
        self.monitors
            .retain(|m| !(m.client == client && targets.contains(&m.target)));
    }

    pub(crate) fn call_when_ready(
        &mut self,
        target: &CallbackTarget,
        attrs: AttributeSet,
        client: ClientId,
        callback: ReadyCallback,
    ) -> Result<(), DirectoryError> {
        let attrs = expand(target, attrs, false);
        let resolved = self.resolve(target);
        if self
            .callbacks
            .iter()
            .any(|cb| cb.target == resolved && cb.client == client)
        {
            tracing::warn!(
                dir = ?self.path,
                target = ?target,
                client = ?client,
                "Rejecting duplicate ready callback."
            );
            return Err(DirectoryError::DuplicateCallback {
                target: target.clone(),
            });
        }
        self.callbacks.push(PendingCallback {
            target: resolved,
            attrs,
            client,
            callback,
        });
        Ok(())
    }

    pub(crate) fn cancel_callback(&mut self, target: &CallbackTarget, client: ClientId) {
        let targets = self.find_all(target);
        self.callbacks
            .retain(|cb| !(cb.client == client && targets.contains(&cb.target)));
    }

    // ---- queries ----

    pub(crate) fn check_ready(&self, target: &CallbackTarget, attrs: AttributeSet) -> bool {
        let attrs = expand(target, attrs, false);
        self.find(target)
            .is_some_and(|resolved| self.is_satisfied(resolved, attrs))
    }

    pub(crate) fn lookup(&self, target: &CallbackTarget) -> Option<FileRecord> {
        match self.find(target)? {
            Target::All => None,
            Target::File(key) => self.snapshot(key),
        }
    }

    pub(crate) fn stats(&self) -> DirectoryStats {
        DirectoryStats {
            files: self.files.len(),
            monitors: self.monitors.len(),
            pending_callbacks: self.callbacks.len(),
            fully_listed: self.fully_listed,
            metadata_loaded: self.metadata.is_loaded(),
            in_flight: InFlightCounts {
                file_list: usize::from(self.listing.is_some()),
                file_info: usize::from(self.info.is_some()),
                item_count: usize::from(self.item_count.is_some()),
                deep_count: usize::from(self.deep_count.is_some()),
                preview_text: usize::from(self.preview.is_some()),
                activation_target: usize::from(self.activation.is_some()),
                new_files: self.new_files.len(),
            },
        }
    }

    // ---- invalidation ----

    /// Throw away the listing and every derived attribute, failures included, and re-list if
    /// anyone still wants the file list.
    pub(crate) fn force_reload(&mut self) {
        tracing::debug!(dir = ?self.path, "Forcing reload.");
        self.cancel(Category::FileList);
        self.fully_listed = false;
        self.pending_entries.clear();
        for key in self.files.clone() {
            self.cancel_targeting(key);
            if let Some(record) = self.records.get_mut(&key) {
                record.unconfirmed = true;
                record.invalidate();
            }
        }
        if let Some(key) = self.self_key {
            self.reset_counts_of(key);
        }
        self.invalidate_in_parent();
    }

    fn invalidate_in_parent(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let (Some(parent), Some(name)) = (self.path.parent(), self.path.file_name()) else {
            return;
        };
        if let Some(parent) = registry.lookup(parent) {
            parent.invalidate_child(&name.to_string_lossy());
        }
    }

    fn reset_counts_of(&mut self, key: FileKey) {
        for category in [Category::ItemCount, Category::DeepCount] {
            if self.in_flight_file(category) == Some(key) {
                self.cancel(category);
            }
        }
        if let Some(record) = self.records.get_mut(&key) {
            record.reset_counts();
        }
    }

    /// A child directory was reloaded: its counts here are stale.
    pub(crate) fn invalidate_child(&mut self, name: &str) {
        let Some(key) = self.by_name.get(name).copied() else {
            return;
        };
        self.reset_counts_of(key);
        self.emit_changed(key);
    }

    pub(crate) fn file_removed_externally(&mut self, name: &str) {
        if let Some(key) = self.by_name.get(name).copied() {
            self.cancel_targeting(key);
            self.mark_gone(key);
        }
    }

    pub(crate) fn file_changed_externally(&mut self, name: &str) {
        let Some(key) = self.by_name.get(name).copied() else {
            return;
        };
        self.cancel_targeting(key);
        if let Some(record) = self.records.get_mut(&key) {
            record.info = None;
            record.invalidate();
        }
        self.emit_changed(key);
    }

    /// Destroy a record, force-removing subscriptions that still name it.
    pub(crate) fn forget_file(&mut self, name: &str) {
        let Some(key) = self.by_name.get(name).copied() else {
            return;
        };
        let target = Target::File(key);
        let callbacks = self.callbacks.len();
        let monitors = self.monitors.len();
        self.callbacks.retain(|cb| cb.target != target);
        self.monitors.retain(|m| m.target != target);
        let dropped = (callbacks - self.callbacks.len()) + (monitors - self.monitors.len());
        if dropped > 0 {
            tracing::warn!(
                dir = ?self.path,
                file = name,
                dropped,
                "Destroying a file that still has subscriptions."
            );
        }
        self.cancel_targeting(key);
        self.mark_gone(key);
    }

    /// Cancel everything. Pending callbacks are dropped without being invoked.
    pub(crate) fn shutdown(&mut self) {
        for category in [
            Category::FileList,
            Category::FileInfo,
            Category::ItemCount,
            Category::DeepCount,
            Category::PreviewText,
            Category::ActivationTarget,
        ] {
            self.cancel(category);
        }
        for (_, handle) in self.new_files.drain() {
            handle.cancel();
        }
        self.callbacks.clear();
        self.monitors.clear();
    }
}
