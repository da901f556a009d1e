use std::io;

use crate::attributes::AttributeSet;
use crate::directory::actor::{Completion, Message, post};
use crate::directory::events::DirectoryEvent;
use crate::directory::state::DirectoryState;
use crate::io::Reply;

impl DirectoryState {
    pub(crate) fn metadata_step(&mut self) {
        if self.metadata.is_loaded() || !self.anyone_wants(AttributeSet::METADATA) {
            return;
        }
        let tx = self.tx.clone();
        let done = Reply::new(move |result| {
            post(&tx, Message::Completion(Completion::MetadataLoaded { result }));
        });
        if self.metadata.request_load(done) {
            tracing::debug!(dir = ?self.path, "Loading metadata.");
        }
    }

    pub(crate) fn metadata_loaded(&mut self, result: io::Result<()>) {
        self.metadata.finish_load(result);
        self.events.emit(DirectoryEvent::MetadataChanged);
    }
}
