use std::io;

use bytes::Bytes;

use crate::directory::actor::Completion;
use crate::directory::request::Category;
use crate::directory::state::{DirectoryState, InFlight, OpId, take_current};
use crate::error::FetchFailure;

impl DirectoryState {
    pub(crate) fn preview_step(&mut self) {
        self.stop_if_unwanted(Category::PreviewText);
        if self.is_busy(Category::PreviewText) {
            return;
        }
        let Some(key) = self.select_needy(Category::PreviewText) else {
            return;
        };
        let Some(path) = self.records.get(&key).map(|r| r.path()) else {
            return;
        };
        let limits = self.ctx.config.preview;
        let id = self.next_op_id();
        let reply = self.reply(id, |id, result| Completion::Preview { id, result });
        let handle = self.io().read_streaming(
            &path,
            Box::new(move |read: u64, so_far: &[u8]| limits.wants_more(read, so_far)),
            reply,
        );
        self.preview = Some(InFlight::new(key, id, handle));
    }

    pub(crate) fn preview_done(&mut self, id: OpId, result: io::Result<Bytes>) {
        let Some(op) = take_current(&mut self.preview, id, Category::PreviewText) else {
            return;
        };
        if let Err(e) = &result
            && FetchFailure::classify(e).is_gone()
        {
            tracing::debug!(dir = ?self.path, "File vanished before its preview was read.");
            self.mark_gone(op.file);
            return;
        }
        let limits = self.ctx.config.preview;
        let Some(record) = self.records.get_mut(&op.file) else {
            return;
        };
        record.got_preview_text = true;
        match result {
            Ok(bytes) => {
                record.preview_text = limits.extract(&bytes);
                record.preview_failed = false;
            }
            Err(e) => {
                tracing::debug!(path = ?record.path(), error = %e, "Failed to read preview text.");
                record.preview_text = None;
                record.preview_failed = true;
            }
        }
        self.emit_changed(op.file);
    }
}
