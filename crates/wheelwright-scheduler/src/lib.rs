//! Pipeline scheduling and orchestration for Wheelwright.
//!
//! Matrix expansion, trigger matching, the stage graph, the job fan-out and
//! fan-in, the release gate and the scheduled regression runner.

pub mod bus;
pub mod dag;
pub mod gate;
pub mod job;
pub mod matrix;
pub mod regression;
pub mod scheduler;
pub mod triggers;

pub use bus::LocalEventBus;
pub use dag::{DagBuilder, DagError, PipelineDag, Stage};
pub use gate::{ReleaseGate, ReleasePolicy, ReleasePorts, TaggedReleasePolicy};
pub use job::{CollectedJob, SourceJob, WheelJob};
pub use matrix::{MatrixExpander, MatrixExpansion, RejectedEntry};
pub use regression::{RegressionJob, RegressionRunner};
pub use scheduler::{Orchestrator, Toolchain};
pub use triggers::{ScheduleSpec, TriggerEvent, TriggerMatcher};
