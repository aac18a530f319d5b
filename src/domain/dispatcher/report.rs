use std::fmt;

use crate::domain::omics::api::RunHandle;
use crate::domain::utils::id::{RunId, WorkflowName};
use crate::error::Error;

/// Where one manifest-processing invocation ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Received,
    Validating,
    /// Terminal: the manifest itself was rejected.
    Invalid,
    Resolving,
    /// Terminal: no workflow had all of its artifacts.
    MissingArtifacts,
    Dispatching,
    /// Terminal: every resolved workflow was dispatched, successfully or not.
    Completed,
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatchPhase::Received => "received",
            DispatchPhase::Validating => "validating",
            DispatchPhase::Invalid => "invalid",
            DispatchPhase::Resolving => "resolving",
            DispatchPhase::MissingArtifacts => "missing-artifacts",
            DispatchPhase::Dispatching => "dispatching",
            DispatchPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Result of dispatching one workflow.
#[derive(Debug)]
pub enum WorkflowOutcome {
    /// A new run was started.
    Started(RunHandle),
    /// A run with the derived name already existed; nothing was started.
    AlreadyDispatched(RunHandle),
    Failed(Error),
}

impl WorkflowOutcome {
    pub fn handle(&self) -> Option<&RunHandle> {
        match self {
            WorkflowOutcome::Started(handle) | WorkflowOutcome::AlreadyDispatched(handle) => Some(handle),
            WorkflowOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            WorkflowOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, WorkflowOutcome::Failed(_))
    }
}

#[derive(Debug)]
pub struct WorkflowResult {
    pub workflow: WorkflowName,
    pub outcome: WorkflowOutcome,
}

/// Per-workflow results of one manifest, in manifest order.
#[derive(Debug)]
pub struct DispatchReport {
    pub run_id: RunId,
    pub manifest_key: String,
    pub phase: DispatchPhase,
    pub results: Vec<WorkflowResult>,
}

impl DispatchReport {
    pub fn result_for(&self, workflow: &str) -> Option<&WorkflowResult> {
        self.results.iter().find(|r| r.workflow == workflow)
    }

    pub fn started(&self) -> impl Iterator<Item = &WorkflowResult> {
        self.results.iter().filter(|r| matches!(r.outcome, WorkflowOutcome::Started(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &WorkflowResult> {
        self.results.iter().filter(|r| !r.outcome.is_success())
    }

    pub fn is_complete_success(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_success())
    }

    /// Whether redelivering the triggering event could change the outcome.
    pub fn has_retryable_failures(&self) -> bool {
        self.failures().any(|r| r.outcome.error().is_some_and(Error::is_retryable))
    }
}

impl fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run '{}' ({}) -> {}", self.run_id, self.manifest_key, self.phase)?;
        for result in &self.results {
            match &result.outcome {
                WorkflowOutcome::Started(handle) => {
                    writeln!(f, "  [STARTED]  {} -> {} ({})", result.workflow, handle.omics_run_id, handle.run_name)?
                }
                WorkflowOutcome::AlreadyDispatched(handle) => {
                    writeln!(f, "  [EXISTING] {} -> {} ({})", result.workflow, handle.omics_run_id, handle.run_name)?
                }
                WorkflowOutcome::Failed(e) => writeln!(f, "  [FAILED]   {}: {}", result.workflow, e)?,
            }
        }
        Ok(())
    }
}
