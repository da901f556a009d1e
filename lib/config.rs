//! Engine tuning knobs.

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

use crate::preview::PreviewLimits;

/// Settings shared by every directory opened through one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineConfig {
    /// Entries per listing batch requested from the backend.
    pub listing_batch_size: usize,

    /// Limits applied when reading text previews.
    pub preview: PreviewLimits,

    /// How much of a probed link file is read.
    pub link_probe_bytes: ByteSize,

    /// Warn when this many messages are waiting in a directory's queue.
    pub event_queue_warning: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            listing_batch_size: 32,
            preview: PreviewLimits::default(),
            link_probe_bytes: ByteSize::b(512),
            event_queue_warning: 1024,
        }
    }
}

impl EngineConfig {
    /// Check the settings for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if self.listing_batch_size == 0 {
            errors.push("listing-batch-size must be at least 1".to_owned());
        }
        if self.preview.max_lines == 0 {
            errors.push("preview.max-lines must be at least 1".to_owned());
        }
        if self.preview.max_bytes.as_u64() == 0 {
            errors.push("preview.max-bytes must be at least 1 byte".to_owned());
        }
        if self.link_probe_bytes.as_u64() == 0 {
            errors.push("link-probe-bytes must be at least 1 byte".to_owned());
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
