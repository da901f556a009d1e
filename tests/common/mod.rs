#![allow(dead_code, unused_imports, missing_docs, clippy::unwrap_used, clippy::expect_used)]

pub mod io_mocks;

use std::sync::Arc;
use std::time::Duration;

use dirmodel::directory::{DirectoryEvent, EventStream, Ready, ReadyCallback};
use dirmodel::io::{FileInfo, FileType, IoProvider};
use dirmodel::{DirectoryHandle, DirectoryRegistry, EngineContext};
use tokio::sync::oneshot;

pub use io_mocks::{MockIo, MockOp, OpKind, TreeIo};

pub fn registry_over(io: impl IoProvider) -> DirectoryRegistry {
    DirectoryRegistry::new(EngineContext::new(Arc::new(io)))
}

pub fn mock_registry() -> (MockIo, DirectoryRegistry) {
    let mock = MockIo::new();
    let registry = registry_over(mock.clone());
    (mock, registry)
}

pub fn file(name: &str) -> FileInfo {
    FileInfo::new(name, FileType::Regular)
}

pub fn text_file(name: &str) -> FileInfo {
    FileInfo::new(name, FileType::Regular).with_mime_type("text/plain")
}

pub fn dir(name: &str) -> FileInfo {
    FileInfo::new(name, FileType::Directory).with_mime_type("inode/directory")
}

/// Wait until the directory has processed everything queued so far.
pub async fn settle(handle: &DirectoryHandle) {
    handle.stats().await.expect("directory is open");
}

/// A callback plus the receiver it reports to.
pub fn ready_channel() -> (ReadyCallback, oneshot::Receiver<Ready>) {
    let (tx, rx) = oneshot::channel();
    let callback: ReadyCallback = Box::new(move |ready| {
        _ = tx.send(ready);
    });
    (callback, rx)
}

/// Await a fired callback, panicking after a second.
pub async fn fired(rx: oneshot::Receiver<Ready>) -> Ready {
    tokio::time::timeout(Duration::from_secs(1), rx)
        .await
        .expect("callback did not fire within 1 second")
        .expect("callback was dropped without firing")
}

/// Every event already queued on `events`.
pub fn drain(events: &mut EventStream) -> Vec<DirectoryEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

/// Names carried by every `FilesRemoved` event in `events`.
pub fn removed_names(events: &[DirectoryEvent]) -> Vec<Vec<String>> {
    events
        .iter()
        .filter_map(|event| match event {
            DirectoryEvent::FilesRemoved(files) => {
                Some(files.iter().map(|f| f.name().to_owned()).collect())
            }
            _ => None,
        })
        .collect()
}
