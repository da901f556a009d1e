//! Recognising link-like files and resolving where they point.

use crate::io::{FileInfo, FileType};

/// How much of a link file must be read to resolve it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRead {
    /// Read only the first `n` bytes.
    Prefix(u64),
    /// Read the entire file.
    Whole,
}

/// Decides which files are links and parses their contents.
pub trait LinkClassifier: Send + Sync + 'static {
    /// Whether the file is a link whose target has to be read from its contents.
    fn is_link_kind(&self, info: &FileInfo) -> bool;

    /// How much of the file to read. Only called for files that are links.
    fn read_strategy(&self, _info: &FileInfo) -> LinkRead {
        LinkRead::Whole
    }

    /// Extract the target from the bytes read, or `None` if the contents are not a valid link.
    fn resolve_link_target(&self, info: &FileInfo, bytes: &[u8]) -> Option<String>;
}

const GMC_LINK_MIME: &str = "application/x-gmc-link";
const GMC_URL_PREFIX: &str = "URL: ";
const DESKTOP_MIME: &str = "application/x-desktop";
const DESKTOP_SECTION: &str = "[Desktop Entry]";

/// Classifies GMC-style links and freedesktop `.desktop` link entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesktopLinks {
    probe_bytes: u64,
}

impl Default for DesktopLinks {
    fn default() -> Self {
        Self { probe_bytes: 512 }
    }
}

impl DesktopLinks {
    /// Read at most `probe_bytes` of GMC links.
    #[must_use]
    pub fn with_probe_bytes(probe_bytes: u64) -> Self {
        Self { probe_bytes }
    }

    fn is_gmc(info: &FileInfo) -> bool {
        info.mime_type.as_deref() == Some(GMC_LINK_MIME)
    }

    fn is_desktop_entry(info: &FileInfo) -> bool {
        info.mime_type.as_deref() == Some(DESKTOP_MIME)
            || info
                .name
                .rsplit_once('.')
                .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("desktop"))
    }
}

impl LinkClassifier for DesktopLinks {
    fn is_link_kind(&self, info: &FileInfo) -> bool {
        info.file_type == FileType::Regular && (Self::is_gmc(info) || Self::is_desktop_entry(info))
    }

    fn read_strategy(&self, info: &FileInfo) -> LinkRead {
        if Self::is_gmc(info) {
            LinkRead::Prefix(self.probe_bytes)
        } else {
            LinkRead::Whole
        }
    }

    fn resolve_link_target(&self, info: &FileInfo, bytes: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(bytes);
        if Self::is_gmc(info) {
            let rest = text.strip_prefix(GMC_URL_PREFIX)?;
            let target = rest.split('\n').next().unwrap_or_default().trim_end();
            return (!target.is_empty()).then(|| target.to_owned());
        }
        desktop_entry_url(&text)
    }
}

/// The `URL=` key of a desktop entry's main section.
fn desktop_entry_url(text: &str) -> Option<String> {
    let mut in_section = false;
    for line in text.lines().map(str::trim) {
        if line.starts_with('[') {
            in_section = line == DESKTOP_SECTION;
            continue;
        }
        if in_section
            && let Some((key, value)) = line.split_once('=')
            && key.trim() == "URL"
        {
            let value = value.trim();
            return (!value.is_empty()).then(|| value.to_owned());
        }
    }
    None
}
