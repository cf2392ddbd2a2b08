//! Scripted command executor for unit tests.

use crate::command::{CommandExecutor, CommandSpec};
use async_trait::async_trait;
use std::sync::Mutex;
use wheelwright_core::Result;
use wheelwright_core::ports::ToolOutput;

/// Records every command and answers with the first rule whose program
/// matches, or success.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Vec<(String, ToolOutput)>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, program: &str, output: ToolOutput) -> Self {
        self.rules.push((program.to_string(), output));
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<ToolOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        Ok(self
            .rules
            .iter()
            .find(|(program, _)| spec.program.ends_with(program.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }
}
