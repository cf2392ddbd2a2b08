//! Wheelwright Core
//!
//! Domain types, ports and error handling shared by every Wheelwright crate:
//! the build matrix vocabulary, job specifications, run reports, events and
//! the traits that external collaborators (compile tool, installer, test
//! runner, artifact store, publish tool) are reached through.

pub mod approval;
pub mod artifact;
pub mod error;
pub mod events;
pub mod ids;
pub mod job;
pub mod manifest;
pub mod pipeline;
pub mod platform;
pub mod ports;
pub mod run;

pub use error::{ConfigError, Error, Result, StepError};
pub use ids::*;
