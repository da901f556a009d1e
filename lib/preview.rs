//! Extraction of the short text preview shown for text files.

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

use crate::io::{FileInfo, FileType};

/// Bounds on how much of a file is read and kept for its preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PreviewLimits {
    /// Stop reading once this many bytes have been read.
    pub max_bytes: ByteSize,
    /// Number of lines kept.
    pub max_lines: usize,
    /// Printable characters kept per line.
    pub max_chars_per_line: usize,
}

impl Default for PreviewLimits {
    fn default() -> Self {
        Self {
            max_bytes: ByteSize::b(10_000),
            max_lines: 24,
            max_chars_per_line: 80,
        }
    }
}

impl PreviewLimits {
    /// Whether a streaming read should continue after `read` bytes with contents `so_far`.
    #[must_use]
    pub fn wants_more(&self, read: u64, so_far: &[u8]) -> bool {
        read < self.max_bytes.as_u64() && count_lines(so_far) <= self.max_lines
    }

    /// Build the preview for the first bytes of a file.
    ///
    /// Keeps the first [`max_lines`](Self::max_lines) lines, at most
    /// [`max_chars_per_line`](Self::max_chars_per_line) printable characters of each, and drops
    /// trailing empty lines. Returns `None` when nothing printable remains.
    #[must_use]
    pub fn extract(&self, bytes: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(bytes);
        let mut out = String::new();
        for line in text.split('\n').take(self.max_lines) {
            line.chars()
                .filter(|c| !c.is_control())
                .take(self.max_chars_per_line)
                .for_each(|c| out.push(c));
            out.push('\n');
        }
        let trimmed = out.trim_end_matches('\n');
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    }
}

/// Number of newline characters in `bytes`.
#[must_use]
pub fn count_lines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == b'\n').count()
}

/// Whether the file is worth reading for a preview: a text mime type, or a regular file whose
/// type could not be narrowed down.
#[must_use]
pub fn contains_text(info: &FileInfo) -> bool {
    if info.file_type != FileType::Regular {
        return false;
    }
    match info.mime_type.as_deref() {
        None | Some("application/octet-stream") => true,
        Some(mime) => mime.to_ascii_lowercase().starts_with("text/"),
    }
}
