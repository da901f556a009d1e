//! A provider that reads the host filesystem through `tokio::fs`.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt as _;
use tokio::runtime::Handle;

use super::{
    FileInfo, FileType, InfoReply, IoProvider, ListOptions, ListingSink, OpHandle, ReadMore,
    ReadReply,
};

const READ_CHUNK: usize = 4096;

/// Serves every operation from the local filesystem on a tokio runtime.
#[derive(Debug, Clone)]
pub struct LocalIo {
    runtime: Handle,
}

impl LocalIo {
    /// Create a provider that spawns its work onto `runtime`.
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Create a provider bound to the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    fn spawn<F>(&self, work: F) -> OpHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = OpHandle::new();
        let token = handle.token().clone();
        self.runtime.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = work => {}
            }
        });
        handle
    }
}

fn file_type_of(ft: std::fs::FileType) -> FileType {
    if ft.is_dir() {
        FileType::Directory
    } else if ft.is_file() {
        FileType::Regular
    } else if ft.is_symlink() {
        FileType::Symlink
    } else {
        FileType::Other
    }
}

fn info_from_metadata(name: String, meta: &std::fs::Metadata, detect_mime: bool) -> FileInfo {
    let file_type = file_type_of(meta.file_type());
    let mime_type = match file_type {
        FileType::Directory => Some("inode/directory".to_owned()),
        FileType::Regular if detect_mime => mime_guess::from_path(&name)
            .first()
            .map(|mime| mime.essence_str().to_owned()),
        _ => None,
    };
    FileInfo {
        size: (file_type == FileType::Regular).then(|| meta.len()),
        modified: meta.modified().ok(),
        mime_type,
        file_type,
        name,
    }
}

fn entry_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

async fn list(path: PathBuf, opts: ListOptions, sink: &ListingSink) -> io::Result<()> {
    let batch_size = opts.batch_size.max(1);
    let mut entries = tokio::fs::read_dir(&path).await?;
    let mut batch = Vec::with_capacity(batch_size);
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        match entry.metadata().await {
            Ok(meta) => batch.push(info_from_metadata(name, &meta, opts.detect_mime_type)),
            // The entry vanished between readdir and stat.
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        }
        if batch.len() >= batch_size {
            sink.entries(std::mem::take(&mut batch));
        }
    }
    if !batch.is_empty() {
        sink.entries(batch);
    }
    Ok(())
}

async fn read_prefix(path: PathBuf, mut more: ReadMore) -> io::Result<Bytes> {
    let mut file = tokio::fs::File::open(&path).await?;
    let mut buf = BytesMut::new();
    let mut chunk = vec![0_u8; READ_CHUNK];
    loop {
        let n = file.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if !more(u64::try_from(buf.len()).unwrap_or(u64::MAX), &buf) {
            break;
        }
    }
    Ok(buf.freeze())
}

impl IoProvider for LocalIo {
    fn list_directory(&self, path: &Path, opts: ListOptions, sink: ListingSink) -> OpHandle {
        let path = path.to_path_buf();
        tracing::trace!(path = ?path, "Listing directory.");
        self.spawn(async move {
            let result = list(path, opts, &sink).await;
            sink.finish(result);
        })
    }

    fn get_info(&self, paths: Vec<PathBuf>, reply: InfoReply) -> OpHandle {
        self.spawn(async move {
            let mut results = Vec::with_capacity(paths.len());
            for path in paths {
                let info = tokio::fs::symlink_metadata(&path)
                    .await
                    .map(|meta| info_from_metadata(entry_name(&path), &meta, true));
                results.push((path, info));
            }
            reply.send(results);
        })
    }

    fn read_whole(&self, path: &Path, reply: ReadReply) -> OpHandle {
        let path = path.to_path_buf();
        self.spawn(async move {
            reply.send(tokio::fs::read(&path).await.map(Bytes::from));
        })
    }

    fn read_streaming(&self, path: &Path, more: ReadMore, reply: ReadReply) -> OpHandle {
        let path = path.to_path_buf();
        self.spawn(async move {
            reply.send(read_prefix(path, more).await);
        })
    }
}
