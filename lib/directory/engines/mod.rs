//! The per-category sub-engines driven by [`DirectoryState::reconcile`].
//!
//! Every engine has the same shape: a step that picks the next needy file and starts one backend
//! operation, and a completion handler that accepts only the operation it started, records the
//! outcome on the file and tells observers the file changed.
//!
//! [`DirectoryState::reconcile`]: super::state::DirectoryState::reconcile

mod activation;
mod counts;
mod file_info;
mod file_list;
mod metadata;
mod preview;
