//! Job step execution for Wheelwright.
//!
//! Process-backed implementations of the build-side ports (dependency
//! installer, compile tool, source build tool, runtime provisioner, package
//! installer, test runner, workspace provisioner) and the step sequences
//! that drive them.

pub mod builder;
pub mod command;
pub mod compile;
pub mod dependencies;
pub mod python;
pub mod source;
pub mod verifier;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{BuildOutput, BuildSettings, WheelBuilder};
pub use command::{CommandExecutor, CommandSpec, ProcessExecutor};
pub use compile::{CibuildwheelTool, SourceBuildCommand};
pub use dependencies::SystemDependencyInstaller;
pub use python::{PipInstaller, PytestRunner, VenvProvisioner};
pub use source::SourceDistBuilder;
pub use verifier::Verifier;
pub use workspace::LocalWorkspaceProvisioner;
