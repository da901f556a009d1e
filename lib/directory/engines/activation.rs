use std::io;

use bytes::Bytes;

use crate::directory::actor::Completion;
use crate::directory::request::Category;
use crate::directory::state::{DirectoryState, InFlight, OpId, take_current};
use crate::error::FetchFailure;
use crate::link::LinkRead;

impl DirectoryState {
    pub(crate) fn activation_step(&mut self) {
        self.stop_if_unwanted(Category::ActivationTarget);
        while !self.is_busy(Category::ActivationTarget) {
            let Some(key) = self.select_needy(Category::ActivationTarget) else {
                return;
            };
            let Some(record) = self.records.get_mut(&key) else {
                return;
            };
            let Some(info) = record.info.clone() else {
                return;
            };
            if !self.ctx.links.is_link_kind(&info) {
                // Not a link: settled with no target, no I/O needed.
                record.got_activation_target = true;
                record.activation_target = None;
                record.activation_failed = false;
                self.dirty = true;
                continue;
            }

            let path = record.path();
            let id = self.next_op_id();
            let reply = self.reply(id, |id, result| Completion::Activation { id, result });
            let handle = match self.ctx.links.read_strategy(&info) {
                LinkRead::Whole => self.io().read_whole(&path, reply),
                LinkRead::Prefix(limit) => self.io().read_streaming(
                    &path,
                    Box::new(move |read: u64, _: &[u8]| read < limit),
                    reply,
                ),
            };
            tracing::trace!(path = ?path, "Reading link target.");
            self.activation = Some(InFlight::with_state(key, id, handle, info));
        }
    }

    pub(crate) fn activation_done(&mut self, id: OpId, result: io::Result<Bytes>) {
        let Some(op) = take_current(&mut self.activation, id, Category::ActivationTarget) else {
            return;
        };
        let info = op.state;
        if let Err(e) = &result
            && FetchFailure::classify(e).is_gone()
        {
            tracing::debug!(file = %info.name, "Link file vanished before it was read.");
            self.mark_gone(op.file);
            return;
        }
        let failed = result.is_err();
        let target = match result {
            Ok(bytes) => {
                let bytes = match self.ctx.links.read_strategy(&info) {
                    LinkRead::Prefix(limit) => {
                        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
                        bytes.slice(..bytes.len().min(limit))
                    }
                    LinkRead::Whole => bytes,
                };
                self.ctx.links.resolve_link_target(&info, &bytes)
            }
            Err(e) => {
                tracing::debug!(file = %info.name, error = %e, "Failed to read link file.");
                None
            }
        };
        let Some(record) = self.records.get_mut(&op.file) else {
            return;
        };
        record.activation_target = target;
        record.got_activation_target = true;
        record.activation_failed = failed;
        self.emit_changed(op.file);
    }
}
