//! Observed directories.
//!
//! A directory is driven by its own task (see [`actor`]) that owns a [`state::DirectoryState`].
//! Callers talk to it through a cheap, cloneable [`DirectoryHandle`]: they register what they
//! want resolved and the engine fetches exactly that, one operation per attribute category at a
//! time, firing callbacks as soon as their request is satisfied.

pub(crate) mod actor;
mod engines;
pub mod events;
pub mod file;
pub mod request;
pub(crate) mod state;

use std::fmt;
use std::path::{Component, Path};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use self::actor::{Message, post};
use self::state::DirectoryState;
use crate::attributes::AttributeSet;
use crate::error::DirectoryError;
use crate::metadata::DirectoryMetadata;
use crate::registry::{EngineContext, RegistryShared};

pub use events::{DirectoryEvent, EventStream};
pub use file::{DeepCountStatus, DeepCounts, FileRecord};
pub use request::{CallbackTarget, ClientId, Ready, ReadyCallback};
pub use state::{DirectoryStats, InFlightCounts};

/// Something that can be observed like a directory: a single [`DirectoryHandle`] or an
/// aggregate of several.
#[async_trait]
pub trait DirectoryLike: Send + Sync {
    /// Register a persistent interest in `attrs` for `target`. Replaces an earlier monitor with
    /// the same target and client.
    async fn monitor_add(
        &self,
        target: CallbackTarget,
        attrs: AttributeSet,
        client: ClientId,
    ) -> Result<(), DirectoryError>;

    /// Drop a monitor. Removing one that does not exist is a no-op.
    async fn monitor_remove(
        &self,
        target: CallbackTarget,
        client: ClientId,
    ) -> Result<(), DirectoryError>;

    /// Invoke `callback` once `attrs` are resolved for `target`.
    ///
    /// Fails with [`DirectoryError::DuplicateCallback`] if `client` already has a callback
    /// pending for `target`.
    async fn call_when_ready(
        &self,
        target: CallbackTarget,
        attrs: AttributeSet,
        client: ClientId,
        callback: ReadyCallback,
    ) -> Result<(), DirectoryError>;

    /// Forget a pending callback without invoking it.
    async fn cancel_callback(
        &self,
        target: CallbackTarget,
        client: ClientId,
    ) -> Result<(), DirectoryError>;

    /// Discard the listing and counts and fetch them again.
    fn force_reload(&self) -> Result<(), DirectoryError>;

    /// Whether `attrs` are already resolved for `target`.
    async fn is_ready(
        &self,
        target: CallbackTarget,
        attrs: AttributeSet,
    ) -> Result<bool, DirectoryError>;

    /// Snapshot of one listed file.
    async fn file(&self, name: &str) -> Result<Option<FileRecord>, DirectoryError>;

    /// Snapshot of every listed file, in listing order.
    async fn files(&self) -> Result<Vec<FileRecord>, DirectoryError>;

    /// Read a metadata value of `file`.
    fn metadata_value(&self, file: &str, key: &str, default: Option<&str>) -> Option<String>;

    /// A new stream of change notifications.
    fn subscribe(&self) -> EventStream;
}

struct HandleInner {
    path: Arc<Path>,
    tx: mpsc::UnboundedSender<Message>,
    events: events::EventFanout,
    metadata: Arc<DirectoryMetadata>,
}

/// A cloneable reference to an open directory.
///
/// Handles do not keep a directory open; obtain them from a
/// [`DirectoryLease`](crate::registry::DirectoryLease). Once the directory is closed every
/// request fails with [`DirectoryError::Closed`].
#[derive(Clone)]
pub struct DirectoryHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for DirectoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryHandle")
            .field("path", &self.inner.path)
            .field("closed", &self.inner.tx.is_closed())
            .finish()
    }
}

fn validate_name(name: &str) -> Result<(), DirectoryError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains('/') => Ok(()),
        _ => Err(DirectoryError::InvalidName(name.to_owned())),
    }
}

fn validate_target(target: &CallbackTarget) -> Result<(), DirectoryError> {
    match target {
        CallbackTarget::File(name) => validate_name(name),
        CallbackTarget::AllFiles | CallbackTarget::Directory => Ok(()),
    }
}

impl DirectoryHandle {
    pub(crate) fn spawn(path: Arc<Path>, ctx: EngineContext, registry: Weak<RegistryShared>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = events::EventFanout::default();
        let metadata = Arc::new(DirectoryMetadata::new(
            Arc::clone(&path),
            Arc::clone(&ctx.metadata),
        ));
        let state = DirectoryState::new(
            Arc::clone(&path),
            ctx,
            tx.clone(),
            events.clone(),
            Arc::clone(&metadata),
            registry,
        );
        tokio::spawn(actor::run(state, rx));
        Self {
            inner: Arc::new(HandleInner {
                path,
                tx,
                events,
                metadata,
            }),
        }
    }

    /// The observed directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn send(&self, message: Message) -> Result<(), DirectoryError> {
        self.inner
            .tx
            .send(message)
            .map_err(|_| DirectoryError::Closed)
    }

    async fn query<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Message,
    ) -> Result<T, DirectoryError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx))?;
        rx.await.map_err(|_| DirectoryError::Closed)
    }

    /// See [`DirectoryLike::monitor_add`].
    pub fn monitor_add(
        &self,
        target: CallbackTarget,
        attrs: AttributeSet,
        client: ClientId,
    ) -> Result<(), DirectoryError> {
        validate_target(&target)?;
        self.send(Message::MonitorAdd {
            target,
            attrs,
            client,
        })
    }

    /// See [`DirectoryLike::monitor_remove`].
    pub fn monitor_remove(
        &self,
        target: CallbackTarget,
        client: ClientId,
    ) -> Result<(), DirectoryError> {
        self.send(Message::MonitorRemove { target, client })
    }

    /// See [`DirectoryLike::call_when_ready`].
    pub async fn call_when_ready(
        &self,
        target: CallbackTarget,
        attrs: AttributeSet,
        client: ClientId,
        callback: ReadyCallback,
    ) -> Result<(), DirectoryError> {
        validate_target(&target)?;
        self.query(|reply| Message::CallWhenReady {
            target,
            attrs,
            client,
            callback,
            reply,
        })
        .await?
    }

    /// Wait until `attrs` are resolved for `target` and return the ready files.
    pub async fn wait_until_ready(
        &self,
        target: CallbackTarget,
        attrs: AttributeSet,
    ) -> Result<Ready, DirectoryError> {
        let (tx, rx) = oneshot::channel();
        let callback: ReadyCallback = Box::new(move |ready| {
            _ = tx.send(ready);
        });
        self.call_when_ready(target, attrs, ClientId::next(), callback)
            .await?;
        rx.await.map_err(|_| DirectoryError::Closed)
    }

    /// See [`DirectoryLike::cancel_callback`].
    pub fn cancel_callback(
        &self,
        target: CallbackTarget,
        client: ClientId,
    ) -> Result<(), DirectoryError> {
        self.send(Message::CancelCallback { target, client })
    }

    /// See [`DirectoryLike::force_reload`].
    pub fn force_reload(&self) -> Result<(), DirectoryError> {
        self.send(Message::ForceReload)
    }

    /// Entries were created outside the engine's knowledge.
    pub fn files_added(&self, names: Vec<String>) -> Result<(), DirectoryError> {
        names.iter().try_for_each(|name| validate_name(name))?;
        self.send(Message::FilesAdded { names })
    }

    /// An entry was deleted outside the engine's knowledge.
    pub fn file_removed(&self, name: &str) -> Result<(), DirectoryError> {
        validate_name(name)?;
        self.send(Message::FileRemoved {
            name: name.to_owned(),
        })
    }

    /// An entry's contents or info changed; its cached attributes are refetched.
    pub fn file_changed(&self, name: &str) -> Result<(), DirectoryError> {
        validate_name(name)?;
        self.send(Message::FileChanged {
            name: name.to_owned(),
        })
    }

    /// Destroy the record of `name`. Subscriptions still naming it are dropped.
    pub fn forget_file(&self, name: &str) -> Result<(), DirectoryError> {
        validate_name(name)?;
        self.send(Message::ForgetFile {
            name: name.to_owned(),
        })
    }

    /// See [`DirectoryLike::is_ready`].
    pub async fn is_ready(
        &self,
        target: CallbackTarget,
        attrs: AttributeSet,
    ) -> Result<bool, DirectoryError> {
        self.query(|reply| Message::IsReady {
            target,
            attrs,
            reply,
        })
        .await
    }

    /// Snapshot of the record `target` resolves to. `AllFiles` resolves to nothing.
    pub async fn record(&self, target: CallbackTarget) -> Result<Option<FileRecord>, DirectoryError> {
        self.query(|reply| Message::File { target, reply }).await
    }

    /// See [`DirectoryLike::file`].
    pub async fn file(&self, name: &str) -> Result<Option<FileRecord>, DirectoryError> {
        self.record(CallbackTarget::File(name.to_owned())).await
    }

    /// See [`DirectoryLike::files`].
    pub async fn files(&self) -> Result<Vec<FileRecord>, DirectoryError> {
        self.query(|reply| Message::Files { reply }).await
    }

    /// Counts of files, subscriptions and in-flight operations.
    pub async fn stats(&self) -> Result<DirectoryStats, DirectoryError> {
        self.query(|reply| Message::Stats { reply }).await
    }

    /// A new stream of change notifications.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        self.inner.events.subscribe()
    }

    /// This directory's metadata.
    #[must_use]
    pub fn metadata(&self) -> &DirectoryMetadata {
        &self.inner.metadata
    }

    fn metadata_changed(&self, changed: bool) -> bool {
        if changed {
            self.inner.events.emit(DirectoryEvent::MetadataChanged);
        }
        changed
    }

    /// Write a metadata value, notifying subscribers if it changed.
    pub fn set_metadata(
        &self,
        file: &str,
        key: &str,
        default: Option<&str>,
        value: Option<&str>,
    ) -> bool {
        self.metadata_changed(self.inner.metadata.set(file, key, default, value))
    }

    /// Write a metadata list, notifying subscribers if it changed.
    pub fn set_metadata_list(&self, file: &str, key: &str, subkey: &str, values: &[String]) -> bool {
        self.metadata_changed(self.inner.metadata.set_list(file, key, subkey, values))
    }

    /// Write a boolean metadata value, notifying subscribers if it changed.
    pub fn set_metadata_bool(&self, file: &str, key: &str, default: bool, value: bool) -> bool {
        self.metadata_changed(self.inner.metadata.set_bool(file, key, default, value))
    }

    /// Write an integer metadata value, notifying subscribers if it changed.
    pub fn set_metadata_int(&self, file: &str, key: &str, default: i64, value: i64) -> bool {
        self.metadata_changed(self.inner.metadata.set_int(file, key, default, value))
    }

    /// Drop all metadata of `file`.
    pub fn remove_file_metadata(&self, file: &str) {
        self.inner.metadata.remove(file);
        self.metadata_changed(true);
    }

    /// Move `old`'s metadata to `new`.
    pub fn rename_file_metadata(&self, old: &str, new: &str) {
        self.inner.metadata.rename(old, new);
        self.metadata_changed(true);
    }

    /// Copy `src_name`'s metadata onto `dst_name` in `dst`.
    pub fn copy_file_metadata(&self, src_name: &str, dst: &Self, dst_name: &str) {
        self.inner
            .metadata
            .copy_to(src_name, &dst.inner.metadata, dst_name);
        dst.metadata_changed(true);
    }

    pub(crate) fn invalidate_child(&self, name: &str) {
        post(
            &self.inner.tx,
            Message::InvalidateChild {
                name: name.to_owned(),
            },
        );
    }

    pub(crate) fn close(&self) {
        post(&self.inner.tx, Message::Shutdown);
    }
}

#[async_trait]
impl DirectoryLike for DirectoryHandle {
    async fn monitor_add(
        &self,
        target: CallbackTarget,
        attrs: AttributeSet,
        client: ClientId,
    ) -> Result<(), DirectoryError> {
        Self::monitor_add(self, target, attrs, client)
    }

    async fn monitor_remove(
        &self,
        target: CallbackTarget,
        client: ClientId,
    ) -> Result<(), DirectoryError> {
        Self::monitor_remove(self, target, client)
    }

    async fn call_when_ready(
        &self,
        target: CallbackTarget,
        attrs: AttributeSet,
        client: ClientId,
        callback: ReadyCallback,
    ) -> Result<(), DirectoryError> {
        Self::call_when_ready(self, target, attrs, client, callback).await
    }

    async fn cancel_callback(
        &self,
        target: CallbackTarget,
        client: ClientId,
    ) -> Result<(), DirectoryError> {
        Self::cancel_callback(self, target, client)
    }

    fn force_reload(&self) -> Result<(), DirectoryError> {
        Self::force_reload(self)
    }

    async fn is_ready(
        &self,
        target: CallbackTarget,
        attrs: AttributeSet,
    ) -> Result<bool, DirectoryError> {
        Self::is_ready(self, target, attrs).await
    }

    async fn file(&self, name: &str) -> Result<Option<FileRecord>, DirectoryError> {
        Self::file(self, name).await
    }

    async fn files(&self) -> Result<Vec<FileRecord>, DirectoryError> {
        Self::files(self).await
    }

    fn metadata_value(&self, file: &str, key: &str, default: Option<&str>) -> Option<String> {
        self.inner.metadata.get(file, key, default)
    }

    fn subscribe(&self) -> EventStream {
        Self::subscribe(self)
    }
}

#[cfg(test)]
mod tests {
    use super::validate_name;

    #[test]
    fn names_must_be_single_normal_components() {
        assert!(validate_name("notes.txt").is_ok());
        assert!(validate_name(".hidden").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("/etc").is_err());
    }
}
