//! Stage dependency graph.
//!
//! Job groups run in parallel with no edges between them; the release stage
//! depends on exactly the groups named in `release.needs`.

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use wheelwright_core::job::JobGroup;
use wheelwright_core::pipeline::ReleaseConfig;

#[derive(Debug, Error)]
pub enum DagError {
    #[error("Cycle detected in stage dependencies")]
    CycleDetected,
    #[error("Unknown stage dependency: {0}")]
    UnknownDependency(String),
}

impl From<DagError> for wheelwright_core::Error {
    fn from(err: DagError) -> Self {
        wheelwright_core::Error::Internal(err.to_string())
    }
}

/// A node in the pipeline DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Group(JobGroup),
    Release,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Group(group) => group.as_str(),
            Stage::Release => "release",
        }
    }

    fn parse(name: &str) -> Result<Self, DagError> {
        match name.trim() {
            "release" => Ok(Stage::Release),
            other => other
                .parse::<JobGroup>()
                .map(Stage::Group)
                .map_err(|_| DagError::UnknownDependency(other.to_string())),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Directed acyclic graph of pipeline stages.
#[derive(Debug)]
pub struct PipelineDag {
    graph: DiGraph<Stage, ()>,
    index: HashMap<Stage, NodeIndex>,
}

impl PipelineDag {
    /// Stages that must complete before `stage` can run.
    pub fn predecessors(&self, stage: Stage) -> Vec<Stage> {
        self.index
            .get(&stage)
            .map(|&idx| {
                let mut preds: Vec<Stage> = self
                    .graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .map(|n| self.graph[n])
                    .collect();
                preds.sort_by_key(|s| s.name());
                preds
            })
            .unwrap_or_default()
    }

    /// Job groups that gate the release stage.
    pub fn release_needs(&self) -> Vec<JobGroup> {
        self.predecessors(Stage::Release)
            .into_iter()
            .filter_map(|stage| match stage {
                Stage::Group(group) => Some(group),
                Stage::Release => None,
            })
            .collect()
    }
}

/// Builder for constructing pipeline DAGs.
pub struct DagBuilder;

impl DagBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, release: &ReleaseConfig) -> Result<PipelineDag, DagError> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for stage in [
            Stage::Group(JobGroup::BuildWheels),
            Stage::Group(JobGroup::BuildSdist),
            Stage::Release,
        ] {
            index.insert(stage, graph.add_node(stage));
        }

        let release_idx = index[&Stage::Release];
        for need in &release.needs {
            let dep = Stage::parse(need)?;
            let dep_idx = index[&dep];
            if !graph.contains_edge(dep_idx, release_idx) {
                graph.add_edge(dep_idx, release_idx, ());
            }
        }

        toposort(&graph, None).map_err(|_| DagError::CycleDetected)?;

        Ok(PipelineDag { graph, index })
    }
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new()
    }
}
