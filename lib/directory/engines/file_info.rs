use std::path::PathBuf;

use crate::directory::actor::Completion;
use crate::directory::events::DirectoryEvent;
use crate::directory::request::Category;
use crate::directory::state::{DirectoryState, InFlight, OpId, take_current};
use crate::error::FetchFailure;
use crate::io::InfoResults;

impl DirectoryState {
    pub(crate) fn file_info_step(&mut self) {
        self.stop_if_unwanted(Category::FileInfo);
        if self.is_busy(Category::FileInfo) {
            return;
        }
        let Some(key) = self.select_needy(Category::FileInfo) else {
            return;
        };
        let Some(path) = self.records.get(&key).map(|r| r.path()) else {
            return;
        };
        let id = self.next_op_id();
        let reply = self.reply(id, |id, results| Completion::Info { id, results });
        tracing::trace!(dir = ?self.path, path = ?path, "Fetching file info.");
        let handle = self.io().get_info(vec![path], reply);
        self.info = Some(InFlight::new(key, id, handle));
    }

    pub(crate) fn file_info_done(&mut self, id: OpId, results: InfoResults) {
        let Some(op) = take_current(&mut self.info, id, Category::FileInfo) else {
            return;
        };
        let Some((path, result)) = results.into_iter().next() else {
            return;
        };
        match result {
            Ok(info) => {
                let Some(record) = self.records.get_mut(&op.file) else {
                    return;
                };
                if record.update_info(info) {
                    self.emit_changed(op.file);
                }
            }
            Err(e) => match FetchFailure::classify(&e) {
                FetchFailure::NotFound => {
                    tracing::debug!(path = ?path, "File vanished before its info was read.");
                    self.mark_gone(op.file);
                }
                failure => {
                    tracing::debug!(path = ?path, ?failure, error = %e, "Failed to read file info.");
                    if let Some(record) = self.records.get_mut(&op.file) {
                        record.info_failed = true;
                    }
                    self.emit_changed(op.file);
                }
            },
        }
    }

    /// Fetch info for entries reported as created, then merge them like listing results.
    pub(crate) fn files_added_externally(&mut self, names: &[String]) {
        let paths: Vec<PathBuf> = names
            .iter()
            .filter(|name| !self.by_name.contains_key(*name))
            .map(|name| self.path.join(name))
            .collect();
        if paths.is_empty() {
            return;
        }
        let id = self.next_op_id();
        let reply = self.reply(id, |id, results| Completion::NewFiles { id, results });
        let handle = self.io().get_info(paths, reply);
        self.new_files.insert(id, handle);
    }

    pub(crate) fn new_files_done(&mut self, id: OpId, results: InfoResults) {
        if self.new_files.remove(&id).is_none() {
            tracing::debug!(dir = ?self.path, id, "Discarding stale new-file info.");
            return;
        }
        let mut added = Vec::new();
        let mut changed = Vec::new();
        for (path, result) in results {
            let info = match result {
                Ok(info) => info,
                Err(e) => {
                    tracing::debug!(path = ?path, error = %e, "Skipping new file whose info is unreadable.");
                    continue;
                }
            };
            match self.by_name.get(&info.name).copied() {
                Some(key) => {
                    if let Some(record) = self.records.get_mut(&key)
                        && record.update_info(info)
                    {
                        changed.push(record.clone());
                    }
                }
                None => {
                    let key = self.insert_listed(info);
                    added.extend(self.snapshot(key));
                }
            }
        }
        self.events.emit_files(DirectoryEvent::FilesAdded, added);
        self.events.emit_files(DirectoryEvent::FilesChanged, changed);
    }
}
