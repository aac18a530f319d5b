use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::domain::utils::id::{OmicsRunId, OmicsWorkflowId};
use crate::error::Result;

/// Everything HealthOmics needs to start one run.
#[derive(Debug, Clone, PartialEq)]
pub struct StartRunRequest {
    pub run_name: String,
    pub role_arn: String,
    pub workflow_id: OmicsWorkflowId,
    pub parameters: Value,
    pub output_uri: String,
    pub run_group_id: Option<String>,
    pub cache_id: Option<String>,
    pub workflow_version_name: Option<String>,
    /// Client token; HealthOmics treats repeated requests with the same id as one.
    pub request_id: String,
    pub tags: BTreeMap<String, String>,
}

/// A run as reported by start or list calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub omics_run_id: OmicsRunId,
    pub arn: Option<String>,
    pub run_name: String,
    pub status: Option<String>,
}

/// Full status of a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDetails {
    pub omics_run_id: OmicsRunId,
    pub arn: Option<String>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub status_message: Option<String>,
    pub start_time: Option<String>,
    pub stop_time: Option<String>,
    pub parameters: Value,
    pub output_uri: Option<String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSummary {
    pub workflow_id: OmicsWorkflowId,
    pub arn: Option<String>,
    pub name: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateWorkflowRequest {
    pub name: String,
    pub description: String,
    pub definition_uri: String,
    pub storage_capacity: Option<i32>,
    pub tags: BTreeMap<String, String>,
    pub request_id: String,
}

/// The slice of the HealthOmics API this crate drives.
#[async_trait]
pub trait OmicsApi: Debug + Send + Sync {
    async fn start_run(&self, request: StartRunRequest) -> Result<RunHandle>;

    /// Runs whose name is exactly `run_name`, most recent first.
    async fn list_runs_by_name(&self, run_name: &str) -> Result<Vec<RunHandle>>;

    async fn get_run(&self, omics_run_id: &OmicsRunId) -> Result<RunDetails>;

    /// Private workflows whose name is exactly `name`.
    async fn list_workflows_by_name(&self, name: &str) -> Result<Vec<WorkflowSummary>>;

    async fn create_workflow(&self, request: CreateWorkflowRequest) -> Result<WorkflowSummary>;
}
