//! Incremental attribute resolution for observed directories.
//!
//! Callers open a directory through a [`DirectoryRegistry`], register monitors and ready
//! callbacks for the attributes they care about, and the engine fetches exactly those from the
//! storage backend, one operation per attribute category at a time.

pub mod aggregate;
pub mod attributes;
pub mod config;
pub mod directory;
pub mod error;
pub mod io;
pub mod link;
pub mod metadata;
pub mod preview;
pub mod registry;

pub use aggregate::AggregateDirectory;
pub use attributes::AttributeSet;
pub use config::EngineConfig;
pub use directory::{
    CallbackTarget, ClientId, DirectoryEvent, DirectoryHandle, DirectoryLike, FileRecord, Ready,
};
pub use error::{DirectoryError, FetchFailure};
pub use registry::{DirectoryLease, DirectoryRegistry, EngineContext};
