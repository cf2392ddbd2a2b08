//! Keyed artifact storage for Wheelwright.
//!
//! Every verified job uploads its output under a key unique to the job; the
//! release stage downloads by key pattern and merges into one directory.

pub mod keys;
pub mod store;

pub use keys::{file_digest, sanitize_key, validate_key};
pub use store::FilesystemStore;
