use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::config::normalize_workflow_name;
use crate::domain::omics::api::{CreateWorkflowRequest, OmicsApi, WorkflowSummary};
use crate::domain::utils::s3_uri::{S3Uri, join_key};
use crate::error::{Error, Result};

/// A `name:version` pipeline to register as a private HealthOmics workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineVersion {
    pub name: String,
    pub version: String,
}

impl PipelineVersion {
    pub fn parse(pipeline: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::ConfigError(format!("invalid pipeline version '{}': {}", pipeline, reason));
        let (name, version) = pipeline.trim().split_once(':').ok_or_else(|| invalid("expected name:version"))?;
        if version.contains(':') {
            return Err(invalid("expected exactly one ':'"));
        }
        let version = version.trim();
        if name.trim().is_empty() || version.is_empty() {
            return Err(invalid("name and version must not be empty"));
        }
        Ok(PipelineVersion { name: normalize_workflow_name(name)?, version: version.to_string() })
    }

    /// `mag:3.0.0` -> `nfcore-mag-3-0-0`.
    pub fn omics_name(&self) -> String {
        format!("nfcore-{}-{}", self.name, self.version.replace('.', "-"))
    }

    pub fn bundle_file_name(&self) -> String {
        format!("nf-core-{}_{}.zip", self.name, self.version)
    }

    /// Where the bundle upload put this version in the code bucket.
    pub fn definition_uri(&self, code_bucket: &str) -> String {
        S3Uri::new(code_bucket, join_key(&[&self.name, &self.bundle_file_name()])).to_string()
    }
}

impl fmt::Display for PipelineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Existing(WorkflowSummary),
    Created(WorkflowSummary),
}

impl Registration {
    pub fn summary(&self) -> &WorkflowSummary {
        match self {
            Registration::Existing(summary) | Registration::Created(summary) => summary,
        }
    }
}

/// Creates private workflows from uploaded bundles, once per name.
#[derive(Debug, Clone)]
pub struct WorkflowRegistrar {
    omics: Arc<dyn OmicsApi>,
    code_bucket: String,
    storage_capacity: Option<i32>,
}

impl WorkflowRegistrar {
    pub fn new(omics: Arc<dyn OmicsApi>, code_bucket: impl Into<String>, storage_capacity: Option<i32>) -> Self {
        WorkflowRegistrar { omics, code_bucket: code_bucket.into(), storage_capacity }
    }

    pub async fn ensure_registered(&self, pipeline: &PipelineVersion) -> Result<Registration> {
        let name = pipeline.omics_name();
        if let Some(existing) = self.omics.list_workflows_by_name(&name).await?.into_iter().next() {
            log::info!("Workflow {} already exists (id {})", name, existing.workflow_id);
            return Ok(Registration::Existing(existing));
        }

        let mut tags = BTreeMap::new();
        tags.insert("Source".to_string(), "nf-core".to_string());
        tags.insert("Pipeline".to_string(), pipeline.name.clone());
        tags.insert("Version".to_string(), pipeline.version.clone());

        let created = self
            .omics
            .create_workflow(CreateWorkflowRequest {
                name: name.clone(),
                description: format!("nf-core {} workflow version {}", pipeline.name, pipeline.version),
                definition_uri: pipeline.definition_uri(&self.code_bucket),
                storage_capacity: self.storage_capacity,
                tags,
                request_id: name.clone(),
            })
            .await?;
        log::info!("Created workflow {} (id {})", name, created.workflow_id);
        Ok(Registration::Created(created))
    }
}
