//! Turns a committed run manifest into HealthOmics runs.
//!
//! One invocation handles one manifest: validate it, confirm every artifact a
//! workflow needs is in storage, then start one run per workflow. Workflows
//! are independent: a missing samplesheet or a failed start for one of them
//! never stops its siblings, and each outcome is reported separately.
//!
//! There is no retry loop here. The storage notification is delivered at
//! least once, so a redelivered event simply re-enters [`Dispatcher::process_manifest`];
//! the run-name lookup in [`Dispatcher::dispatch`] keeps that from starting a
//! second run.

pub mod report;

use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use crate::api::manifest_dto::RunManifestDto;
use crate::domain::config::{DispatcherConfig, TemplateContext, WorkflowTarget};
use crate::domain::dispatcher::report::{DispatchPhase, DispatchReport, WorkflowOutcome, WorkflowResult};
use crate::domain::manifest::{self, ManifestLocation, ValidatedManifest, WorkflowEntry};
use crate::domain::omics::api::{OmicsApi, RunHandle, StartRunRequest};
use crate::domain::samplesheet::{self, ReadLocation};
use crate::domain::storage::ArtifactStore;
use crate::domain::utils::id::{RunId, WorkflowName};
use crate::domain::utils::s3_uri::{S3Uri, join_key};
use crate::error::{Error, Result};
use crate::loader::parser::parse_json_bytes;

/// Target of the structured per-workflow audit events.
pub const AUDIT_TARGET: &str = "dispatch_audit";

/// Exact inputs for one workflow's run, ready to hand to HealthOmics.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInputs {
    pub workflow: WorkflowName,
    pub samplesheet_uri: String,
    pub params_uri: Option<String>,
    pub output_uri: String,
    pub parameters: serde_json::Value,
}

/// Outcome of [`Dispatcher::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Started(RunHandle),
    Existing(RunHandle),
}

impl Dispatched {
    pub fn handle(&self) -> &RunHandle {
        match self {
            Dispatched::Started(handle) | Dispatched::Existing(handle) => handle,
        }
    }
}

/// Run name HealthOmics knows a `(run_id, workflow)` dispatch by.
pub fn run_name(run_id: &RunId, workflow: &WorkflowName) -> String {
    format!("{}_{}", run_id, workflow)
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: Arc<DispatcherConfig>,
    store: ArtifactStore,
    omics: Arc<dyn OmicsApi>,
}

impl Dispatcher {
    pub fn new(config: Arc<DispatcherConfig>, store: ArtifactStore, omics: Arc<dyn OmicsApi>) -> Self {
        Dispatcher { config, store, omics }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Pure manifest check, see [`manifest::validate`].
    pub fn validate(&self, manifest: &RunManifestDto, location: &ManifestLocation) -> Result<ValidatedManifest> {
        manifest::validate(manifest, location)
    }

    /// Fetches the manifest object and processes it.
    ///
    /// An unreadable or malformed manifest is a validation failure; storage
    /// errors while fetching it are returned as-is so the event is redelivered.
    pub async fn process_manifest(&self, location: &ManifestLocation) -> Result<DispatchReport> {
        log::info!("{} manifest {}", DispatchPhase::Received, location);

        if location.bucket != self.store.bucket() {
            return Err(Error::ValidationError {
                run_id: location.prefix_run_id().unwrap_or_default().to_string(),
                manifest_key: location.key.clone(),
                reason: format!("manifest bucket '{}' is not the input bucket '{}'", location.bucket, self.store.bucket()),
            });
        }

        let body = self.store.get(&location.key).await?;
        let manifest: RunManifestDto = parse_json_bytes(&body).map_err(|e| Error::ValidationError {
            run_id: location.prefix_run_id().unwrap_or_default().to_string(),
            manifest_key: location.key.clone(),
            reason: format!("manifest is not valid JSON: {}", e),
        })?;

        self.process(&manifest, location).await
    }

    /// Validate, resolve and dispatch an already-parsed manifest.
    pub async fn process(&self, manifest: &RunManifestDto, location: &ManifestLocation) -> Result<DispatchReport> {
        log::debug!("{} manifest {} ({} workflow(s) declared)", DispatchPhase::Validating, location, manifest.workflows.len());
        let validated = match self.validate(manifest, location) {
            Ok(validated) => validated,
            Err(e) => {
                log::error!("{}: {}", DispatchPhase::Invalid, e);
                return Err(e);
            }
        };

        log::debug!("{} artifacts for run '{}'", DispatchPhase::Resolving, validated.run_id);
        let resolutions = self.resolve_artifacts(&validated).await;

        let all_missing = resolutions.iter().all(|(_, r)| matches!(r, Err(Error::MissingArtifactError { .. })));
        if all_missing {
            let results: Vec<WorkflowResult> = resolutions
                .into_iter()
                .filter_map(|(workflow, r)| r.err().map(|e| WorkflowResult { workflow, outcome: WorkflowOutcome::Failed(e) }))
                .collect();
            log::error!("Run '{}': no workflow has all of its artifacts, nothing dispatched", validated.run_id);
            return Ok(DispatchReport {
                run_id: validated.run_id,
                manifest_key: location.key.clone(),
                phase: DispatchPhase::MissingArtifacts,
                results,
            });
        }

        log::info!("{} run '{}'", DispatchPhase::Dispatching, validated.run_id);
        let run_id = &validated.run_id;
        let results: Vec<WorkflowResult> = stream::iter(resolutions)
            .map(|(workflow, resolution)| async move {
                let outcome = match resolution {
                    Err(e) => WorkflowOutcome::Failed(e),
                    Ok(inputs) => match self.dispatch(run_id, &inputs).await {
                        Ok(Dispatched::Started(handle)) => WorkflowOutcome::Started(handle),
                        Ok(Dispatched::Existing(handle)) => WorkflowOutcome::AlreadyDispatched(handle),
                        Err(e) => WorkflowOutcome::Failed(e),
                    },
                };
                WorkflowResult { workflow, outcome }
            })
            .buffered(self.config.dispatch_concurrency)
            .collect()
            .await;

        let report = DispatchReport {
            run_id: validated.run_id.clone(),
            manifest_key: location.key.clone(),
            phase: DispatchPhase::Completed,
            results,
        };
        log::info!(
            "Run '{}' dispatched: {} started, {} failed",
            report.run_id,
            report.started().count(),
            report.failures().count()
        );
        Ok(report)
    }

    /// Probes every artifact of every workflow and builds its run parameters.
    ///
    /// Results keep manifest order. A workflow fails with the first missing
    /// object it references, or when it is not in the catalog; other
    /// workflows are unaffected.
    pub async fn resolve_artifacts(&self, validated: &ValidatedManifest) -> Vec<(WorkflowName, Result<ResolvedInputs>)> {
        let mut resolutions = Vec::with_capacity(validated.entries.len());
        for entry in &validated.entries {
            let resolution = self.resolve_workflow(validated, entry).await;
            if let Err(e) = &resolution {
                tracing::warn!(run_id = %validated.run_id, workflow = %entry.workflow, "artifact resolution failed: {}", e);
            }
            resolutions.push((entry.workflow.clone(), resolution));
        }
        resolutions
    }

    async fn resolve_workflow(&self, validated: &ValidatedManifest, entry: &WorkflowEntry) -> Result<ResolvedInputs> {
        let target = self.target(validated, &entry.workflow)?;

        self.require(validated, entry, &entry.samplesheet_key).await?;
        if let Some(params_key) = &entry.params_key {
            self.require(validated, entry, params_key).await?;
        }
        if self.config.verify_reads {
            self.require_reads(validated, entry).await?;
        }

        let samplesheet_uri = self.store.uri(&entry.samplesheet_key);
        let params_uri = entry.params_key.as_deref().map(|key| self.store.uri(key));
        let output_key = join_key(&[
            self.config.output_prefix.as_deref().unwrap_or_default(),
            validated.run_id.as_str(),
            entry.workflow.as_str(),
        ]);
        let output_uri = format!("{}/", S3Uri::new(&self.config.output_bucket, output_key));

        let parameters = target.template.render(&TemplateContext {
            run_id: validated.run_id.as_str(),
            workflow: entry.workflow.as_str(),
            samplesheet: &samplesheet_uri,
            outdir: &output_uri,
            params: params_uri.as_deref(),
        });

        Ok(ResolvedInputs { workflow: entry.workflow.clone(), samplesheet_uri, params_uri, output_uri, parameters })
    }

    fn target(&self, validated: &ValidatedManifest, workflow: &WorkflowName) -> Result<&WorkflowTarget> {
        self.config.catalog.get(workflow).ok_or_else(|| Error::ValidationError {
            run_id: validated.run_id.to_string(),
            manifest_key: validated.location.key.clone(),
            reason: format!("workflow '{}' is not configured for dispatch", workflow),
        })
    }

    async fn require(&self, validated: &ValidatedManifest, entry: &WorkflowEntry, key: &str) -> Result<()> {
        if self.store.exists(key).await? {
            Ok(())
        } else {
            Err(Error::MissingArtifactError {
                run_id: validated.run_id.to_string(),
                workflow: entry.workflow.to_string(),
                key: key.to_string(),
            })
        }
    }

    async fn require_reads(&self, validated: &ValidatedManifest, entry: &WorkflowEntry) -> Result<()> {
        let body = self.store.get(&entry.samplesheet_key).await?;
        for location in samplesheet::read_locations(&body, self.store.bucket())? {
            match location {
                ReadLocation::Key(key) => self.require(validated, entry, &key).await?,
                ReadLocation::Foreign(uri) => {
                    log::debug!("Run '{}': read {} lives outside the input bucket, not probed", validated.run_id, uri);
                }
            }
        }
        Ok(())
    }

    /// Starts the run for `(run_id, workflow)` unless one already exists.
    ///
    /// The lookup is read-before-write, not a lock: two racing deliveries can
    /// both miss it, in which case the deterministic request id lets
    /// HealthOmics collapse the second start into the first.
    pub async fn dispatch(&self, run_id: &RunId, inputs: &ResolvedInputs) -> Result<Dispatched> {
        let name = run_name(run_id, &inputs.workflow);
        let dispatch_error = |e: Error| Error::DispatchError {
            run_id: run_id.to_string(),
            workflow: inputs.workflow.to_string(),
            run_name: name.clone(),
            message: e.to_string(),
        };

        let target = self.config.catalog.get(&inputs.workflow).ok_or_else(|| {
            dispatch_error(Error::ConfigError(format!("workflow '{}' is not configured", inputs.workflow)))
        })?;

        let existing = self.bounded("ListRuns", &name, self.omics.list_runs_by_name(&name)).await.map_err(&dispatch_error)?;
        if let Some(handle) = existing.into_iter().next() {
            tracing::info!(
                target: AUDIT_TARGET,
                run_id = %run_id,
                workflow = %inputs.workflow,
                omics_run_id = %handle.omics_run_id,
                run_name = %name,
                "run already dispatched, skipping"
            );
            return Ok(Dispatched::Existing(handle));
        }

        let mut tags = BTreeMap::new();
        tags.insert("run_id".to_string(), run_id.to_string());
        tags.insert("workflow".to_string(), inputs.workflow.to_string());

        let request = StartRunRequest {
            run_name: name.clone(),
            role_arn: self.config.role_arn.clone(),
            workflow_id: target.workflow_id.clone(),
            parameters: inputs.parameters.clone(),
            output_uri: inputs.output_uri.clone(),
            run_group_id: self.config.run_group_id.clone(),
            cache_id: self.config.cache_id.clone(),
            workflow_version_name: target.version_name.clone(),
            request_id: name.clone(),
            tags,
        };

        let handle = self.bounded("StartRun", &name, self.omics.start_run(request)).await.map_err(&dispatch_error)?;
        tracing::info!(
            target: AUDIT_TARGET,
            run_id = %run_id,
            workflow = %inputs.workflow,
            omics_run_id = %handle.omics_run_id,
            run_name = %name,
            output_uri = %inputs.output_uri,
            "run started"
        );
        Ok(Dispatched::Started(handle))
    }

    async fn bounded<T>(&self, operation: &'static str, resource: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout { operation, resource: resource.to_string(), seconds: self.config.call_timeout.as_secs() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{WorkflowCatalog, WorkflowTarget};
    use crate::domain::omics::api::{CreateWorkflowRequest, RunDetails, WorkflowSummary};
    use crate::domain::utils::id::OmicsRunId;
    use crate::domain::utils::retry::RetryPolicy;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::time::Duration;
    use tracing_test::traced_test;

    #[derive(Debug)]
    struct NeverCalled;

    #[async_trait]
    impl OmicsApi for NeverCalled {
        async fn start_run(&self, request: StartRunRequest) -> Result<RunHandle> {
            panic!("unexpected start_run for {}", request.run_name)
        }
        async fn list_runs_by_name(&self, _run_name: &str) -> Result<Vec<RunHandle>> {
            panic!("unexpected list_runs_by_name")
        }
        async fn get_run(&self, _omics_run_id: &OmicsRunId) -> Result<RunDetails> {
            panic!("unexpected get_run")
        }
        async fn list_workflows_by_name(&self, _name: &str) -> Result<Vec<WorkflowSummary>> {
            panic!("unexpected list_workflows_by_name")
        }
        async fn create_workflow(&self, _request: CreateWorkflowRequest) -> Result<WorkflowSummary> {
            panic!("unexpected create_workflow")
        }
    }

    fn config() -> DispatcherConfig {
        let mut catalog = WorkflowCatalog::default();
        catalog.insert(WorkflowTarget::new("mag", "1111111").unwrap()).unwrap();
        DispatcherConfig {
            input_bucket: "in".to_string(),
            output_bucket: "out".to_string(),
            output_prefix: None,
            role_arn: "arn:aws:iam::123456789012:role/OmicsRole".to_string(),
            run_group_id: None,
            cache_id: None,
            region: None,
            call_timeout: Duration::from_secs(5),
            dispatch_concurrency: 1,
            verify_reads: false,
            catalog,
            upload_retry: RetryPolicy::default(),
        }
    }

    #[traced_test]
    #[tokio::test]
    async fn missing_samplesheet_is_logged_with_run_and_key() {
        let store = ArtifactStore::in_memory("in");
        let manifest = br#"{"run_id":"run_01","workflows":["mag"],"samplesheet_mag.csv":"run_01/samplesheet_mag.csv"}"#;
        store.put("run_01/run_manifest.json", Bytes::from_static(manifest), None).await.unwrap();

        let dispatcher = Dispatcher::new(Arc::new(config()), store, Arc::new(NeverCalled));
        let report = dispatcher.process_manifest(&ManifestLocation::new("in", "run_01/run_manifest.json")).await.unwrap();

        assert_eq!(report.phase, DispatchPhase::MissingArtifacts);
        assert!(logs_contain("run_01"));
        assert!(logs_contain("run_01/samplesheet_mag.csv"));
    }

    #[test]
    fn run_name_joins_run_and_workflow() {
        assert_eq!(run_name(&RunId::new("run_01"), &WorkflowName::new("mag")), "run_01_mag");
    }
}
