use std::path::PathBuf;

use crate::directory::actor::Completion;
use crate::directory::file::{DeepCountStatus, DeepCounts};
use crate::directory::request::Category;
use crate::directory::state::{DeepWalk, DirectoryState, InFlight, OpId, take_current};
use crate::error::FetchFailure;
use crate::io::{FileType, ListingEvent, OpHandle};

impl DirectoryState {
    pub(crate) fn item_count_step(&mut self) {
        self.stop_if_unwanted(Category::ItemCount);
        if self.is_busy(Category::ItemCount) {
            return;
        }
        let Some(key) = self.select_needy(Category::ItemCount) else {
            return;
        };
        let Some(path) = self.records.get(&key).map(|r| r.path()) else {
            return;
        };
        let id = self.next_op_id();
        let sink = self.listing_sink(id, |id, event| Completion::ItemCount { id, event });
        let handle = self
            .io()
            .list_directory(&path, self.list_options(false), sink);
        self.item_count = Some(InFlight::with_state(key, id, handle, 0));
    }

    pub(crate) fn item_count_event(&mut self, id: OpId, event: ListingEvent) {
        match event {
            ListingEvent::Entries(batch) => {
                if let Some(op) = self.item_count.as_mut().filter(|op| op.id == id) {
                    op.state += u64::try_from(batch.len()).unwrap_or(u64::MAX);
                }
            }
            ListingEvent::Finished(result) => {
                let Some(op) = take_current(&mut self.item_count, id, Category::ItemCount) else {
                    return;
                };
                if let Err(e) = &result
                    && FetchFailure::classify(e).is_gone()
                {
                    tracing::debug!(dir = ?self.path, "Directory vanished before it was counted.");
                    self.mark_gone(op.file);
                    return;
                }
                let Some(record) = self.records.get_mut(&op.file) else {
                    return;
                };
                match result {
                    Ok(()) => {
                        record.item_count = Some(op.state);
                        record.got_item_count = true;
                    }
                    Err(e) => {
                        tracing::debug!(path = ?record.path(), error = %e, "Failed to count items.");
                        record.item_count_failed = true;
                    }
                }
                self.emit_changed(op.file);
            }
        }
    }

    pub(crate) fn deep_count_step(&mut self) {
        self.stop_if_unwanted(Category::DeepCount);
        if self.is_busy(Category::DeepCount) {
            return;
        }
        let Some(key) = self.select_needy(Category::DeepCount) else {
            return;
        };
        let Some(record) = self.records.get_mut(&key) else {
            return;
        };
        record.deep_counts = DeepCounts::default();
        record.deep_count_status = DeepCountStatus::InProgress;
        let walk = DeepWalk {
            current: PathBuf::new(),
            pending: vec![record.path()],
        };
        tracing::debug!(path = ?record.path(), "Starting recursive count.");
        self.deep_count = Some(InFlight::with_state(key, 0, OpHandle::new(), walk));
        self.deep_count_next();
    }

    /// Start listing the next queued subdirectory, or finish the walk.
    fn deep_count_next(&mut self) {
        let Some(mut op) = self.deep_count.take() else {
            return;
        };
        let Some(next) = op.state.pending.pop() else {
            if let Some(record) = self.records.get_mut(&op.file) {
                record.deep_count_status = DeepCountStatus::Done;
                tracing::debug!(path = ?record.path(), counts = ?record.deep_counts, "Recursive count done.");
            }
            self.emit_changed(op.file);
            return;
        };
        let id = self.next_op_id();
        let sink = self.listing_sink(id, |id, event| Completion::DeepCount { id, event });
        op.id = id;
        op.handle = self
            .io()
            .list_directory(&next, self.list_options(false), sink);
        op.state.current = next;
        self.deep_count = Some(op);
    }

    pub(crate) fn deep_count_event(&mut self, id: OpId, event: ListingEvent) {
        let Some(op) = self.deep_count.as_mut().filter(|op| op.id == id) else {
            tracing::debug!(dir = ?self.path, id, "Discarding stale recursive count delivery.");
            return;
        };
        let file = op.file;
        match event {
            ListingEvent::Entries(batch) => {
                let Some(record) = self.records.get_mut(&file) else {
                    return;
                };
                let counts = &mut record.deep_counts;
                for entry in batch {
                    if entry.file_type == FileType::Directory {
                        counts.directories += 1;
                        op.state.pending.push(op.state.current.join(&entry.name));
                    } else {
                        counts.files += 1;
                    }
                    if let Some(size) = entry.size {
                        counts.total_size = counts.total_size.saturating_add(size);
                    }
                }
                self.emit_changed(file);
            }
            ListingEvent::Finished(result) => {
                if let Err(e) = result {
                    tracing::debug!(path = ?op.state.current, error = %e, "Subdirectory unreadable during recursive count.");
                    if let Some(record) = self.records.get_mut(&file) {
                        record.deep_counts.unreadable += 1;
                    }
                }
                self.deep_count_next();
            }
        }
    }
}
