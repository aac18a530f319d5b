use async_trait::async_trait;
use aws_sdk_omics::Client as OmicsClient;
use aws_sdk_omics::error::DisplayErrorContext;
use aws_sdk_omics::types::{WorkflowEngine, WorkflowType};
use aws_smithy_types::DateTime;
use aws_smithy_types::date_time::Format;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::domain::omics::api::{CreateWorkflowRequest, OmicsApi, RunDetails, RunHandle, StartRunRequest, WorkflowSummary};
use crate::domain::omics::document::{document_to_json, json_to_document};
use crate::domain::utils::id::{OmicsRunId, OmicsWorkflowId};
use crate::error::{Error, Result};

/// [`OmicsApi`] backed by the AWS SDK.
#[derive(Debug, Clone)]
pub struct AwsOmicsClient {
    client: OmicsClient,
}

impl AwsOmicsClient {
    pub fn new(client: OmicsClient) -> Self {
        AwsOmicsClient { client }
    }

    pub async fn from_env(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let sdk_config = loader.load().await;
        AwsOmicsClient::new(OmicsClient::new(&sdk_config))
    }
}

fn api_error(operation: &'static str, err: impl std::error::Error) -> Error {
    Error::OmicsApiError { operation, message: DisplayErrorContext(err).to_string() }
}

fn format_time(time: Option<&DateTime>) -> Option<String> {
    time.and_then(|t| t.fmt(Format::DateTime).ok())
}

#[async_trait]
impl OmicsApi for AwsOmicsClient {
    async fn start_run(&self, request: StartRunRequest) -> Result<RunHandle> {
        let mut call = self
            .client
            .start_run()
            .workflow_id(request.workflow_id.as_str())
            .workflow_type(WorkflowType::Private)
            .role_arn(&request.role_arn)
            .name(&request.run_name)
            .parameters(json_to_document(&request.parameters))
            .output_uri(&request.output_uri)
            .request_id(&request.request_id)
            .set_run_group_id(request.run_group_id.clone())
            .set_cache_id(request.cache_id.clone())
            .set_workflow_version_name(request.workflow_version_name.clone());
        for (key, value) in &request.tags {
            call = call.tags(key, value);
        }

        let output = call.send().await.map_err(|e| api_error("StartRun", e))?;
        let omics_run_id = output
            .id()
            .ok_or_else(|| Error::OmicsApiError { operation: "StartRun", message: "response carried no run id".to_string() })?;

        Ok(RunHandle {
            omics_run_id: OmicsRunId::new(omics_run_id),
            arn: output.arn().map(str::to_string),
            run_name: request.run_name,
            status: output.status().map(|s| s.as_str().to_string()),
        })
    }

    async fn list_runs_by_name(&self, run_name: &str) -> Result<Vec<RunHandle>> {
        let output = self.client.list_runs().name(run_name).send().await.map_err(|e| api_error("ListRuns", e))?;

        let mut items: Vec<_> = output.items().iter().filter(|item| item.name() == Some(run_name)).collect();
        items.sort_by(|a, b| b.creation_time().map(|t| t.secs()).cmp(&a.creation_time().map(|t| t.secs())));

        Ok(items
            .into_iter()
            .filter_map(|item| {
                Some(RunHandle {
                    omics_run_id: OmicsRunId::new(item.id()?),
                    arn: item.arn().map(str::to_string),
                    run_name: run_name.to_string(),
                    status: item.status().map(|s| s.as_str().to_string()),
                })
            })
            .collect())
    }

    async fn get_run(&self, omics_run_id: &OmicsRunId) -> Result<RunDetails> {
        let output = self.client.get_run().id(omics_run_id.as_str()).send().await.map_err(|e| api_error("GetRun", e))?;

        let tags = output
            .tags()
            .map(|tags| tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<BTreeMap<_, _>>())
            .unwrap_or_default();

        Ok(RunDetails {
            omics_run_id: OmicsRunId::new(output.id().unwrap_or(omics_run_id.as_str())),
            arn: output.arn().map(str::to_string),
            name: output.name().map(str::to_string),
            status: output.status().map(|s| s.as_str().to_string()),
            status_message: output.status_message().map(str::to_string),
            start_time: format_time(output.start_time()),
            stop_time: format_time(output.stop_time()),
            parameters: output.parameters().map(document_to_json).unwrap_or(Value::Null),
            output_uri: output.output_uri().map(str::to_string),
            tags,
        })
    }

    async fn list_workflows_by_name(&self, name: &str) -> Result<Vec<WorkflowSummary>> {
        let output = self
            .client
            .list_workflows()
            .r#type(WorkflowType::Private)
            .name(name)
            .send()
            .await
            .map_err(|e| api_error("ListWorkflows", e))?;

        Ok(output
            .items()
            .iter()
            .filter(|item| item.name() == Some(name))
            .filter_map(|item| {
                Some(WorkflowSummary {
                    workflow_id: OmicsWorkflowId::new(item.id()?),
                    arn: item.arn().map(str::to_string),
                    name: name.to_string(),
                    status: item.status().map(|s| s.as_str().to_string()),
                })
            })
            .collect())
    }

    async fn create_workflow(&self, request: CreateWorkflowRequest) -> Result<WorkflowSummary> {
        let mut call = self
            .client
            .create_workflow()
            .name(&request.name)
            .description(&request.description)
            .engine(WorkflowEngine::Nextflow)
            .definition_uri(&request.definition_uri)
            .request_id(&request.request_id)
            .set_storage_capacity(request.storage_capacity);
        for (key, value) in &request.tags {
            call = call.tags(key, value);
        }

        let output = call.send().await.map_err(|e| api_error("CreateWorkflow", e))?;
        let workflow_id = output
            .id()
            .ok_or_else(|| Error::OmicsApiError { operation: "CreateWorkflow", message: "response carried no workflow id".to_string() })?;

        Ok(WorkflowSummary {
            workflow_id: OmicsWorkflowId::new(workflow_id),
            arn: output.arn().map(str::to_string),
            name: request.name,
            status: output.status().map(|s| s.as_str().to_string()),
        })
    }
}
