//! Change notifications produced by a directory.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::file::FileRecord;

/// A change observed in a directory.
#[derive(Debug, Clone)]
pub enum DirectoryEvent {
    /// Entries became known.
    FilesAdded(Vec<FileRecord>),
    /// Cached attributes of entries changed.
    FilesChanged(Vec<FileRecord>),
    /// Entries were found to no longer exist.
    FilesRemoved(Vec<FileRecord>),
    /// Metadata of the directory changed or finished loading.
    MetadataChanged,
    /// A full listing of the directory finished.
    ListingComplete,
}

/// Receiving end of a directory's notifications.
pub type EventStream = mpsc::UnboundedReceiver<DirectoryEvent>;

/// Fans every event out to all live subscribers.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventFanout {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<DirectoryEvent>>>>,
}

impl EventFanout {
    pub(crate) fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: DirectoryEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Emit a file-list event unless it carries no records.
    pub(crate) fn emit_files(&self, make: fn(Vec<FileRecord>) -> DirectoryEvent, files: Vec<FileRecord>) {
        if !files.is_empty() {
            self.emit(make(files));
        }
    }
}
