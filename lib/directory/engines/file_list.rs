use std::io;

use crate::attributes::AttributeSet;
use crate::directory::actor::Completion;
use crate::directory::events::DirectoryEvent;
use crate::directory::request::Category;
use crate::directory::state::{DirectoryState, Listing, OpId};
use crate::io::ListingEvent;

impl DirectoryState {
    pub(crate) fn file_list_step(&mut self) {
        if !self.anyone_wants(AttributeSet::FILE_LIST) {
            if self.listing.is_some() {
                tracing::debug!(dir = ?self.path, "Nobody wants the listing any more; stopping it.");
                self.cancel(Category::FileList);
            }
            return;
        }
        if self.fully_listed || self.listing.is_some() {
            return;
        }

        for key in &self.files {
            if let Some(record) = self.records.get_mut(key) {
                record.unconfirmed = true;
            }
        }
        let id = self.next_op_id();
        let sink = self.listing_sink(id, |id, event| Completion::Listing { id, event });
        let handle = self
            .io()
            .list_directory(&self.path, self.list_options(true), sink);
        tracing::debug!(dir = ?self.path, id, "Listing directory.");
        self.listing = Some(Listing { id, handle });
    }

    pub(crate) fn listing_event(&mut self, id: OpId, event: ListingEvent) {
        if self.listing.as_ref().is_none_or(|op| op.id != id) {
            tracing::debug!(dir = ?self.path, id, "Discarding stale listing delivery.");
            return;
        }
        match event {
            ListingEvent::Entries(batch) => {
                self.pending_entries.extend(batch);
                self.dequeue_pending();
            }
            ListingEvent::Finished(result) => {
                self.listing = None;
                self.dequeue_pending();
                self.finish_listing(result);
            }
        }
    }

    /// Merge queued listing entries into the file list.
    fn dequeue_pending(&mut self) {
        let mut added = Vec::new();
        let mut changed = Vec::new();
        while let Some(info) = self.pending_entries.pop_front() {
            let existing = self.by_name.get(&info.name).copied();
            match existing.and_then(|key| self.records.get_mut(&key)) {
                Some(record) => {
                    record.unconfirmed = false;
                    record.is_gone = false;
                    if record.update_info(info) {
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

    fn finish_listing(&mut self, result: io::Result<()>) {
        let leftover: Vec<_> = self
            .files
            .iter()
            .copied()
            .filter(|key| self.records.get(key).is_some_and(|r| r.unconfirmed))
            .collect();
        match result {
            Ok(()) => {
                let removed: Vec<_> = leftover
                    .into_iter()
                    .filter_map(|key| self.retire(key))
                    .collect();
                tracing::debug!(
                    dir = ?self.path,
                    files = self.files.len(),
                    removed = removed.len(),
                    "Listing complete."
                );
                self.events.emit_files(DirectoryEvent::FilesRemoved, removed);
            }
            Err(e) => {
                tracing::warn!(dir = ?self.path, error = %e, "Listing failed; keeping known entries.");
                for key in leftover {
                    if let Some(record) = self.records.get_mut(&key) {
                        record.unconfirmed = false;
                    }
                }
            }
        }
        self.fully_listed = true;
        self.events.emit(DirectoryEvent::ListingComplete);
    }
}
