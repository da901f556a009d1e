//! Several directories observed as one.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt as _;
use futures::stream::{self, BoxStream};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

use crate::attributes::AttributeSet;
use crate::directory::{
    CallbackTarget, ClientId, DirectoryEvent, DirectoryLike, EventStream, FileRecord, Ready,
    ReadyCallback,
};
use crate::error::DirectoryError;

type PendingKeys = Arc<Mutex<FxHashSet<(CallbackTarget, ClientId)>>>;

/// Collects the ready payloads of every child and fires the caller's callback once, after the
/// last child reported.
struct Merge {
    remaining: usize,
    files: Vec<FileRecord>,
    callback: Option<ReadyCallback>,
    key: (CallbackTarget, ClientId),
    pending: PendingKeys,
}

impl Merge {
    fn child_ready(&mut self, ready: Ready) {
        self.files.extend(ready.into_files());
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return;
        }
        self.pending.lock().remove(&self.key);
        if let Some(callback) = self.callback.take() {
            callback(Ready::AllFiles(std::mem::take(&mut self.files)));
        }
    }
}

/// Presents several [`DirectoryLike`]s as one.
///
/// Requests for every file, or for the directory itself, fan out to all children and complete
/// once every child has completed. Requests naming one file are routed to the child that lists
/// it.
pub struct AggregateDirectory {
    children: Vec<Arc<dyn DirectoryLike>>,
    pending: PendingKeys,
}

impl fmt::Debug for AggregateDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateDirectory")
            .field("children", &self.children.len())
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl AggregateDirectory {
    /// Combine `children`, in the order their files are reported.
    #[must_use]
    pub fn new(children: Vec<Arc<dyn DirectoryLike>>) -> Self {
        Self {
            children,
            pending: PendingKeys::default(),
        }
    }

    /// The first child that lists `name`.
    async fn owner(&self, name: &str) -> Result<Option<&Arc<dyn DirectoryLike>>, DirectoryError> {
        for child in &self.children {
            if child.file(name).await?.is_some() {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    async fn require_owner(&self, name: &str) -> Result<&Arc<dyn DirectoryLike>, DirectoryError> {
        self.owner(name)
            .await?
            .ok_or_else(|| DirectoryError::UnknownFile(name.to_owned()))
    }

    async fn fan_out_callback(
        &self,
        target: CallbackTarget,
        attrs: AttributeSet,
        client: ClientId,
        callback: ReadyCallback,
    ) -> Result<(), DirectoryError> {
        let key = (target.clone(), client);
        if !self.pending.lock().insert(key.clone()) {
            tracing::warn!(target = ?target, client = ?client, "Rejecting duplicate aggregate callback.");
            return Err(DirectoryError::DuplicateCallback { target });
        }
        if self.children.is_empty() {
            self.pending.lock().remove(&key);
            callback(Ready::AllFiles(Vec::new()));
            return Ok(());
        }

        let merge = Arc::new(Mutex::new(Merge {
            remaining: self.children.len(),
            files: Vec::new(),
            callback: Some(callback),
            key: key.clone(),
            pending: Arc::clone(&self.pending),
        }));
        for (registered, child) in self.children.iter().enumerate() {
            let merge = Arc::clone(&merge);
            let forward: ReadyCallback = Box::new(move |ready| merge.lock().child_ready(ready));
            if let Err(e) = child
                .call_when_ready(target.clone(), attrs, client, forward)
                .await
            {
                for earlier in &self.children[..registered] {
                    _ = earlier.cancel_callback(target.clone(), client).await;
                }
                self.pending.lock().remove(&key);
                return Err(e);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryLike for AggregateDirectory {
    async fn monitor_add(
        &self,
        target: CallbackTarget,
        attrs: AttributeSet,
        client: ClientId,
    ) -> Result<(), DirectoryError> {
        if let CallbackTarget::File(name) = &target {
            return self
                .require_owner(name)
                .await?
                .monitor_add(target.clone(), attrs, client)
                .await;
        }
        for child in &self.children {
            child.monitor_add(target.clone(), attrs, client).await?;
        }
        Ok(())
    }

    async fn monitor_remove(
        &self,
        target: CallbackTarget,
        client: ClientId,
    ) -> Result<(), DirectoryError> {
        for child in &self.children {
            child.monitor_remove(target.clone(), client).await?;
        }
        Ok(())
    }

    async fn call_when_ready(
        &self,
        target: CallbackTarget,
        attrs: AttributeSet,
        client: ClientId,
        callback: ReadyCallback,
    ) -> Result<(), DirectoryError> {
        match &target {
            CallbackTarget::File(name) => {
                let owner = self.require_owner(name).await?;
                owner
                    .call_when_ready(target.clone(), attrs, client, callback)
                    .await
            }
            CallbackTarget::AllFiles | CallbackTarget::Directory => {
                self.fan_out_callback(target, attrs, client, callback).await
            }
        }
    }

    async fn cancel_callback(
        &self,
        target: CallbackTarget,
        client: ClientId,
    ) -> Result<(), DirectoryError> {
        self.pending.lock().remove(&(target.clone(), client));
        for child in &self.children {
            child.cancel_callback(target.clone(), client).await?;
        }
        Ok(())
    }

    fn force_reload(&self) -> Result<(), DirectoryError> {
        self.children
            .iter()
            .try_for_each(|child| child.force_reload())
    }

    async fn is_ready(
        &self,
        target: CallbackTarget,
        attrs: AttributeSet,
    ) -> Result<bool, DirectoryError> {
        if let CallbackTarget::File(name) = &target {
            return match self.owner(name).await? {
                Some(owner) => owner.is_ready(target.clone(), attrs).await,
                None => Ok(false),
            };
        }
        for child in &self.children {
            if !child.is_ready(target.clone(), attrs).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn file(&self, name: &str) -> Result<Option<FileRecord>, DirectoryError> {
        for child in &self.children {
            if let Some(record) = child.file(name).await? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn files(&self) -> Result<Vec<FileRecord>, DirectoryError> {
        let mut all = Vec::new();
        for child in &self.children {
            all.extend(child.files().await?);
        }
        Ok(all)
    }

    fn metadata_value(&self, file: &str, key: &str, default: Option<&str>) -> Option<String> {
        self.children
            .iter()
            .find_map(|child| child.metadata_value(file, key, None))
            .or_else(|| default.map(str::to_owned))
    }

    /// Merge every child's notifications into one stream.
    ///
    /// Must be called inside a tokio runtime; the merge runs on a spawned task that ends once the
    /// returned stream is dropped.
    fn subscribe(&self) -> EventStream {
        let streams: Vec<BoxStream<'static, DirectoryEvent>> = self
            .children
            .iter()
            .map(|child| {
                stream::unfold(child.subscribe(), |mut rx| async move {
                    rx.recv().await.map(|event| (event, rx))
                })
                .boxed()
            })
            .collect();
        let mut merged = stream::select_all(streams);
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = merged.next() => match event {
                        Some(event) => {
                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    () = tx.closed() => break,
                }
            }
        });
        rx
    }
}
