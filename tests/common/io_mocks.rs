//! Scriptable [`IoProvider`]s for driving directories in tests.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use dirmodel::io::{
    FileInfo, FileType, InfoReply, IoProvider, ListOptions, ListingSink, OpHandle, ReadMore,
    ReadReply,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    List,
    Info,
    ReadWhole,
    ReadStreaming,
}

enum Completion {
    List(ListingSink),
    Info(InfoReply),
    Read(ReadReply),
}

/// One operation issued to [`MockIo`], waiting for the test to complete it.
pub struct MockOp {
    pub kind: OpKind,
    pub path: PathBuf,
    pub paths: Vec<PathBuf>,
    pub handle: OpHandle,
    completion: Completion,
}

impl MockOp {
    /// Deliver a batch of listing entries without finishing the listing.
    pub fn entries(&self, batch: Vec<FileInfo>) {
        match &self.completion {
            Completion::List(sink) => sink.entries(batch),
            _ => panic!("{:?} operation has no listing sink", self.kind),
        }
    }

    /// Finish a listing.
    pub fn finish(self, result: io::Result<()>) {
        match self.completion {
            Completion::List(sink) => sink.finish(result),
            _ => panic!("{:?} operation is not a listing", self.kind),
        }
    }

    /// Deliver entries and finish successfully.
    pub fn list(self, batch: Vec<FileInfo>) {
        self.entries(batch);
        self.finish(Ok(()));
    }

    /// Answer an info fetch, one result per requested path.
    pub fn reply_info(self, results: Vec<io::Result<FileInfo>>) {
        match self.completion {
            Completion::Info(reply) => {
                reply.send(self.paths.into_iter().zip(results).collect());
            }
            _ => panic!("{:?} operation is not an info fetch", self.kind),
        }
    }

    /// Answer a whole or streaming read.
    pub fn reply_read(self, result: io::Result<Bytes>) {
        match self.completion {
            Completion::Read(reply) => reply.send(result),
            _ => panic!("{:?} operation is not a read", self.kind),
        }
    }
}

#[derive(Default)]
struct MockState {
    waiting: Vec<MockOp>,
    issued: Vec<(OpKind, PathBuf)>,
}

/// Records every operation and leaves completing it to the test.
#[derive(Clone, Default)]
pub struct MockIo {
    state: Arc<Mutex<MockState>>,
}

impl MockIo {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, kind: OpKind, paths: Vec<PathBuf>, completion: Completion) -> OpHandle {
        let handle = OpHandle::new();
        let path = paths.first().cloned().unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        state.issued.push((kind, path.clone()));
        state.waiting.push(MockOp {
            kind,
            path,
            paths,
            handle: handle.clone(),
            completion,
        });
        handle
    }

    fn take(&self, kind: OpKind, path: Option<&Path>) -> Option<MockOp> {
        let mut state = self.state.lock().unwrap();
        let index = state
            .waiting
            .iter()
            .position(|op| op.kind == kind && path.is_none_or(|p| op.path == p))?;
        Some(state.waiting.remove(index))
    }

    async fn wait_take(&self, kind: OpKind, path: Option<&Path>) -> MockOp {
        for _ in 0..200 {
            if let Some(op) = self.take(kind, path) {
                return op;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no {kind:?} operation for {path:?} was issued within 1 second");
    }

    /// The oldest waiting operation of `kind`.
    pub async fn next_op(&self, kind: OpKind) -> MockOp {
        self.wait_take(kind, None).await
    }

    /// The oldest waiting operation of `kind` on `path`.
    pub async fn next_op_at(&self, kind: OpKind, path: impl AsRef<Path>) -> MockOp {
        self.wait_take(kind, Some(path.as_ref())).await
    }

    /// How many operations of `kind` were ever issued.
    pub fn issued(&self, kind: OpKind) -> usize {
        self.state
            .lock()
            .unwrap()
            .issued
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Paths of every operation of `kind` ever issued, in order.
    pub fn issued_paths(&self, kind: OpKind) -> Vec<PathBuf> {
        self.state
            .lock()
            .unwrap()
            .issued
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Operations not yet completed by the test and not cancelled.
    pub fn outstanding(&self, kind: OpKind) -> usize {
        self.state
            .lock()
            .unwrap()
            .waiting
            .iter()
            .filter(|op| op.kind == kind && !op.handle.is_cancelled())
            .count()
    }
}

impl IoProvider for MockIo {
    fn list_directory(&self, path: &Path, _opts: ListOptions, sink: ListingSink) -> OpHandle {
        self.record(OpKind::List, vec![path.to_path_buf()], Completion::List(sink))
    }

    fn get_info(&self, paths: Vec<PathBuf>, reply: InfoReply) -> OpHandle {
        self.record(OpKind::Info, paths, Completion::Info(reply))
    }

    fn read_whole(&self, path: &Path, reply: ReadReply) -> OpHandle {
        self.record(OpKind::ReadWhole, vec![path.to_path_buf()], Completion::Read(reply))
    }

    fn read_streaming(&self, path: &Path, _more: ReadMore, reply: ReadReply) -> OpHandle {
        self.record(
            OpKind::ReadStreaming,
            vec![path.to_path_buf()],
            Completion::Read(reply),
        )
    }
}

#[derive(Clone)]
enum Node {
    Dir,
    Locked,
    File(Bytes),
}

/// An in-memory tree that answers every operation immediately.
#[derive(Clone, Default)]
pub struct TreeIo {
    nodes: Arc<Mutex<Vec<(PathBuf, Node)>>>,
    issued: Arc<Mutex<Vec<(OpKind, PathBuf)>>>,
}

impl TreeIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dir(self, path: impl Into<PathBuf>) -> Self {
        self.nodes.lock().unwrap().push((path.into(), Node::Dir));
        self
    }

    /// A directory that is listed in its parent but cannot itself be listed.
    pub fn locked_dir(self, path: impl Into<PathBuf>) -> Self {
        self.nodes.lock().unwrap().push((path.into(), Node::Locked));
        self
    }

    pub fn file(self, path: impl Into<PathBuf>, contents: impl Into<Bytes>) -> Self {
        self.nodes
            .lock()
            .unwrap()
            .push((path.into(), Node::File(contents.into())));
        self
    }

    pub fn issued(&self, kind: OpKind) -> usize {
        self.issued
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    fn node(&self, path: &Path) -> Option<Node> {
        self.nodes
            .lock()
            .unwrap()
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, n)| n.clone())
    }

    fn info(path: &Path, node: &Node) -> FileInfo {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match node {
            Node::Dir | Node::Locked => {
                FileInfo::new(name, FileType::Directory).with_mime_type("inode/directory")
            }
            Node::File(bytes) => {
                let mime = mime_for(&name);
                let info = FileInfo::new(name, FileType::Regular).with_size(bytes.len() as u64);
                match mime {
                    Some(mime) => info.with_mime_type(mime),
                    None => info,
                }
            }
        }
    }

    fn issue(&self, kind: OpKind, path: &Path) {
        self.issued.lock().unwrap().push((kind, path.to_path_buf()));
    }
}

fn mime_for(name: &str) -> Option<&'static str> {
    if name.ends_with(".txt") {
        Some("text/plain")
    } else if name.ends_with(".desktop") {
        Some("application/x-desktop")
    } else if name.ends_with(".bin") {
        Some("application/x-executable")
    } else {
        None
    }
}

impl IoProvider for TreeIo {
    fn list_directory(&self, path: &Path, _opts: ListOptions, sink: ListingSink) -> OpHandle {
        self.issue(OpKind::List, path);
        match self.node(path) {
            Some(Node::Dir) => {
                let children: Vec<FileInfo> = self
                    .nodes
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|(p, _)| p.parent() == Some(path))
                    .map(|(p, n)| Self::info(p, n))
                    .collect();
                if !children.is_empty() {
                    sink.entries(children);
                }
                sink.finish(Ok(()));
            }
            Some(Node::Locked) => sink.finish(Err(io::ErrorKind::PermissionDenied.into())),
            Some(Node::File(_)) => sink.finish(Err(io::ErrorKind::NotADirectory.into())),
            None => sink.finish(Err(io::ErrorKind::NotFound.into())),
        }
        OpHandle::new()
    }

    fn get_info(&self, paths: Vec<PathBuf>, reply: InfoReply) -> OpHandle {
        let results: Vec<(PathBuf, io::Result<FileInfo>)> = paths
            .into_iter()
            .map(|path| {
                self.issue(OpKind::Info, &path);
                let result = self
                    .node(&path)
                    .map(|node| Self::info(&path, &node))
                    .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound));
                (path, result)
            })
            .collect();
        reply.send(results);
        OpHandle::new()
    }

    fn read_whole(&self, path: &Path, reply: ReadReply) -> OpHandle {
        self.issue(OpKind::ReadWhole, path);
        reply.send(match self.node(path) {
            Some(Node::File(bytes)) => Ok(bytes),
            _ => Err(io::ErrorKind::NotFound.into()),
        });
        OpHandle::new()
    }

    fn read_streaming(&self, path: &Path, mut more: ReadMore, reply: ReadReply) -> OpHandle {
        self.issue(OpKind::ReadStreaming, path);
        let Some(Node::File(bytes)) = self.node(path) else {
            reply.send(Err(io::ErrorKind::NotFound.into()));
            return OpHandle::new();
        };
        let mut read = 0;
        while read < bytes.len() {
            read = (read + 4).min(bytes.len());
            if !more(read as u64, &bytes[..read]) {
                break;
            }
        }
        reply.send(Ok(bytes.slice(..read)));
        OpHandle::new()
    }
}
