//! The serialized event queue each directory runs on.
//!
//! Subscription changes, queries and backend completions all arrive as [`Message`]s on one
//! unbounded channel. The actor applies them one at a time, so no two reconcile passes of the
//! same directory ever overlap.

use std::io;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use super::file::FileRecord;
use super::request::{CallbackTarget, ClientId, ReadyCallback};
use super::state::{DirectoryState, DirectoryStats, OpId};
use crate::attributes::AttributeSet;
use crate::error::DirectoryError;
use crate::io::{InfoResults, ListingEvent};

/// A backend result, tagged with the operation it answers.
#[derive(Debug)]
pub(crate) enum Completion {
    Listing { id: OpId, event: ListingEvent },
    Info { id: OpId, results: InfoResults },
    NewFiles { id: OpId, results: InfoResults },
    ItemCount { id: OpId, event: ListingEvent },
    DeepCount { id: OpId, event: ListingEvent },
    Preview { id: OpId, result: io::Result<Bytes> },
    Activation { id: OpId, result: io::Result<Bytes> },
    MetadataLoaded { result: io::Result<()> },
}

pub(crate) enum Message {
    MonitorAdd {
        target: CallbackTarget,
        attrs: AttributeSet,
        client: ClientId,
    },
    MonitorRemove {
        target: CallbackTarget,
        client: ClientId,
    },
    CallWhenReady {
        target: CallbackTarget,
        attrs: AttributeSet,
        client: ClientId,
        callback: ReadyCallback,
        reply: oneshot::Sender<Result<(), DirectoryError>>,
    },
    CancelCallback {
        target: CallbackTarget,
        client: ClientId,
    },
    ForceReload,
    InvalidateChild {
        name: String,
    },
    FilesAdded {
        names: Vec<String>,
    },
    FileRemoved {
        name: String,
    },
    FileChanged {
        name: String,
    },
    ForgetFile {
        name: String,
    },
    IsReady {
        target: CallbackTarget,
        attrs: AttributeSet,
        reply: oneshot::Sender<bool>,
    },
    File {
        target: CallbackTarget,
        reply: oneshot::Sender<Option<FileRecord>>,
    },
    Files {
        reply: oneshot::Sender<Vec<FileRecord>>,
    },
    Stats {
        reply: oneshot::Sender<DirectoryStats>,
    },
    Completion(Completion),
    Shutdown,
}

/// Sends a message, ignoring a closed directory.
pub(crate) fn post(tx: &mpsc::UnboundedSender<Message>, message: Message) {
    _ = tx.send(message);
}

/// Drain `rx` into `state` until shutdown or until every sender is gone.
pub(crate) async fn run(mut state: DirectoryState, mut rx: mpsc::UnboundedReceiver<Message>) {
    tracing::debug!(dir = ?state.path(), "Directory opened.");
    let threshold = state.ctx.config.event_queue_warning;
    let mut warned = false;
    while let Some(message) = rx.recv().await {
        if matches!(message, Message::Shutdown) {
            break;
        }
        let backlog = rx.len();
        if backlog >= threshold && !warned {
            tracing::warn!(dir = ?state.path(), backlog, "Directory event queue is backing up.");
        }
        warned = backlog >= threshold;
        state.handle(message);
    }
    state.shutdown();
    tracing::debug!(dir = ?state.path(), "Directory closed.");
}

impl DirectoryState {
    fn handle(&mut self, message: Message) {
        match message {
            Message::MonitorAdd {
                target,
                attrs,
                client,
            } => self.monitor_add(&target, attrs, client),
            Message::MonitorRemove { target, client } => self.monitor_remove(&target, client),
            Message::CallWhenReady {
                target,
                attrs,
                client,
                callback,
                reply,
            } => {
                let result = self.call_when_ready(&target, attrs, client, callback);
                _ = reply.send(result);
            }
            Message::CancelCallback { target, client } => self.cancel_callback(&target, client),
            Message::ForceReload => self.force_reload(),
            Message::InvalidateChild { name } => self.invalidate_child(&name),
            Message::FilesAdded { names } => self.files_added_externally(&names),
            Message::FileRemoved { name } => self.file_removed_externally(&name),
            Message::FileChanged { name } => self.file_changed_externally(&name),
            Message::ForgetFile { name } => self.forget_file(&name),
            Message::IsReady {
                target,
                attrs,
                reply,
            } => {
                _ = reply.send(self.check_ready(&target, attrs));
            }
            Message::File { target, reply } => {
                _ = reply.send(self.lookup(&target));
            }
            Message::Files { reply } => {
                _ = reply.send(self.snapshot_files());
            }
            Message::Stats { reply } => {
                _ = reply.send(self.stats());
            }
            Message::Completion(completion) => self.complete(completion),
            Message::Shutdown => {}
        }
        self.reconcile();
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Listing { id, event } => self.listing_event(id, event),
            Completion::Info { id, results } => self.file_info_done(id, results),
            Completion::NewFiles { id, results } => self.new_files_done(id, results),
            Completion::ItemCount { id, event } => self.item_count_event(id, event),
            Completion::DeepCount { id, event } => self.deep_count_event(id, event),
            Completion::Preview { id, result } => self.preview_done(id, result),
            Completion::Activation { id, result } => self.activation_done(id, result),
            Completion::MetadataLoaded { result } => self.metadata_loaded(result),
        }
    }
}
