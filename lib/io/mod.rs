//! The storage backend contract consumed by the engine.
//!
//! Every operation is asynchronous and callback-driven: the provider returns an [`OpHandle`]
//! immediately and later reports results through the sink or reply it was given. Results for an
//! operation that has been cancelled may still arrive; the engine tags every operation and drops
//! completions it no longer expects.

pub mod local;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

pub use local::LocalIo;

/// The kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// A regular file.
    Regular,
    /// A directory.
    Directory,
    /// A symbolic link that was not followed.
    Symlink,
    /// Sockets, fifos, devices and anything else.
    Other,
}

/// Stat-like information about one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Name of the entry inside its parent directory.
    pub name: String,
    /// Kind of the entry.
    pub file_type: FileType,
    /// Size in bytes, when the backend knows it.
    pub size: Option<u64>,
    /// Detected mime type, if any.
    pub mime_type: Option<String>,
    /// Last modification time, if any.
    pub modified: Option<SystemTime>,
}

impl FileInfo {
    /// Create an info record with only a name and a kind.
    #[must_use]
    pub fn new(name: impl Into<String>, file_type: FileType) -> Self {
        Self {
            name: name.into(),
            file_type,
            size: None,
            mime_type: None,
            modified: None,
        }
    }

    /// Set the size.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the mime type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Whether this entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// Options for [`IoProvider::list_directory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// Maximum number of entries per delivered batch.
    pub batch_size: usize,
    /// Whether the backend should detect mime types for every entry.
    pub detect_mime_type: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            detect_mime_type: true,
        }
    }
}

/// Cancellation handle for one backend operation.
///
/// Cancelling is idempotent. Providers observe cancellation through [`OpHandle::token`].
#[derive(Debug, Clone, Default)]
pub struct OpHandle {
    token: CancellationToken,
}

impl OpHandle {
    /// Create a fresh, uncancelled handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the operation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The token providers select on to stop early.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// One delivery from an in-progress directory listing.
#[derive(Debug)]
pub enum ListingEvent {
    /// A batch of entries, in backend order.
    Entries(Vec<FileInfo>),
    /// The listing ended. `Ok` means the directory was exhausted.
    Finished(io::Result<()>),
}

/// Receives incremental results of a directory listing.
#[derive(Clone)]
pub struct ListingSink {
    deliver: Arc<dyn Fn(ListingEvent) + Send + Sync>,
}

impl ListingSink {
    /// Wrap a delivery function.
    pub fn new(deliver: impl Fn(ListingEvent) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Deliver a batch of entries.
    pub fn entries(&self, batch: Vec<FileInfo>) {
        (self.deliver)(ListingEvent::Entries(batch));
    }

    /// Report that the listing has ended.
    pub fn finish(&self, result: io::Result<()>) {
        (self.deliver)(ListingEvent::Finished(result));
    }
}

impl fmt::Debug for ListingSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListingSink").finish_non_exhaustive()
    }
}

/// A single-use completion callback.
pub struct Reply<T> {
    send: Box<dyn FnOnce(T) + Send>,
}

impl<T> Reply<T> {
    /// Wrap a completion function.
    pub fn new(send: impl FnOnce(T) + Send + 'static) -> Self {
        Self {
            send: Box::new(send),
        }
    }

    /// Deliver the result, consuming the reply.
    pub fn send(self, value: T) {
        (self.send)(value);
    }
}

impl<T> fmt::Debug for Reply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply").finish_non_exhaustive()
    }
}

/// Per-path results of a batch info fetch.
pub type InfoResults = Vec<(PathBuf, io::Result<FileInfo>)>;

/// Completion for [`IoProvider::get_info`].
pub type InfoReply = Reply<InfoResults>;

/// Completion for whole and streaming reads.
pub type ReadReply = Reply<io::Result<Bytes>>;

/// Called after every chunk of a streaming read with the total bytes read so far and the bytes
/// accumulated so far. Returning `false` stops the read; the bytes read up to that point are
/// then delivered as a successful result.
pub type ReadMore = Box<dyn FnMut(u64, &[u8]) -> bool + Send>;

/// An asynchronous storage backend.
///
/// Implementations must be safe to share between every open directory.
pub trait IoProvider: Send + Sync + 'static {
    /// List `path`, delivering entries incrementally into `sink` and finishing exactly once
    /// unless cancelled.
    fn list_directory(&self, path: &Path, opts: ListOptions, sink: ListingSink) -> OpHandle;

    /// Fetch info for every path in `paths`, replying once with one result per path.
    fn get_info(&self, paths: Vec<PathBuf>, reply: InfoReply) -> OpHandle;

    /// Read the whole file at `path`.
    fn read_whole(&self, path: &Path, reply: ReadReply) -> OpHandle;

    /// Read the file at `path` chunk by chunk until `more` returns `false` or the file ends.
    fn read_streaming(&self, path: &Path, more: ReadMore, reply: ReadReply) -> OpHandle;
}
