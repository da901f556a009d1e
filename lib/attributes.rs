//! Attribute sets: which pieces of information a caller wants resolved.

use bitflags::bitflags;

bitflags! {
    /// One flag per independently resolvable attribute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AttributeSet: u8 {
        /// The directory has been listed completely at least once.
        const FILE_LIST         = 1 << 0;
        /// Stat-like information: kind, size, mime type, modification time.
        const FILE_INFO         = 1 << 1;
        /// Number of entries directly inside a directory.
        const ITEM_COUNT        = 1 << 2;
        /// Recursive directory, file and byte totals.
        const DEEP_COUNT        = 1 << 3;
        /// The first few lines of a text file.
        const PREVIEW_TEXT      = 1 << 4;
        /// Resolved destination of a link-like file.
        const ACTIVATION_TARGET = 1 << 5;
        /// Per-file key/value metadata from the metadata store.
        const METADATA          = 1 << 6;

        /// Attributes that are fetched per file, as opposed to per directory.
        const PER_FILE = Self::FILE_INFO.bits()
            | Self::ITEM_COUNT.bits()
            | Self::DEEP_COUNT.bits()
            | Self::PREVIEW_TEXT.bits()
            | Self::ACTIVATION_TARGET.bits();
    }
}

impl AttributeSet {
    /// Build a set from attribute names such as `"item-count"` or `"custom-icon"`.
    ///
    /// Unknown names are skipped.
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().fold(Self::empty(), |acc, name| {
            let name = name.as_ref();
            match Self::from_attribute_name(name) {
                Some(flags) => acc | flags,
                None => {
                    tracing::debug!(attribute = name, "Ignoring unknown attribute name.");
                    acc
                }
            }
        })
    }

    fn from_attribute_name(name: &str) -> Option<Self> {
        let flags = match name {
            "file-list" => Self::FILE_LIST,
            "file-info" | "mime-type" | "is-directory" | "size" => Self::FILE_INFO,
            "item-count" | "directory-item-count" => Self::ITEM_COUNT,
            "deep-counts" | "deep-count" => Self::DEEP_COUNT,
            "preview-text" | "top-left-text" => Self::PREVIEW_TEXT,
            "activation-target" | "activation-uri" => {
                Self::ACTIVATION_TARGET | Self::FILE_INFO
            }
            "metadata" | "custom-icon" | "keywords" => Self::METADATA,
            _ => return None,
        };
        Some(flags)
    }

    /// Whether resolving this set needs the file's kind to be known first.
    #[must_use]
    pub fn needs_file_info(self) -> bool {
        self.intersects(Self::PER_FILE)
    }

    /// Adds the attributes that the requested ones depend on.
    ///
    /// Counts, previews and activation targets all depend on the file's kind, so any of them
    /// pulls in [`AttributeSet::FILE_INFO`].
    #[must_use]
    pub fn with_dependencies(self) -> Self {
        if self.needs_file_info() {
            self | Self::FILE_INFO
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AttributeSet;

    #[test]
    fn names_map_onto_flags() {
        let set = AttributeSet::from_names(["item-count", "custom-icon", "bogus"]);
        assert_eq!(set, AttributeSet::ITEM_COUNT | AttributeSet::METADATA);
    }

    #[test]
    fn activation_name_implies_file_info() {
        let set = AttributeSet::from_names(["activation-target"]);
        assert!(set.contains(AttributeSet::FILE_INFO));
    }

    #[test]
    fn counts_depend_on_file_info_but_metadata_does_not() {
        assert!(
            AttributeSet::DEEP_COUNT
                .with_dependencies()
                .contains(AttributeSet::FILE_INFO)
        );
        assert_eq!(
            AttributeSet::METADATA.with_dependencies(),
            AttributeSet::METADATA
        );
    }
}
