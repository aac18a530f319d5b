use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

use crate::api::manifest_dto::RunManifestDto;
use crate::domain::utils::id::{RunId, WorkflowName};
use crate::domain::utils::s3_uri::{S3Uri, join_key};
use crate::error::{Error, Result};

pub const MANIFEST_FILE_NAME: &str = "run_manifest.json";

pub fn samplesheet_entry_name(workflow: &str) -> String {
    format!("samplesheet_{}.csv", workflow)
}

pub fn params_entry_name(workflow: &str) -> String {
    format!("params_{}.json", workflow)
}

/// Bucket and key of a manifest object, as delivered by the storage notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLocation {
    pub bucket: String,
    pub key: String,
}

impl ManifestLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        ManifestLocation { bucket: bucket.into(), key: key.into() }
    }

    /// Key prefix the manifest lives under (`jobs/run_01/run_manifest.json` -> `jobs/run_01`).
    pub fn prefix(&self) -> Option<&str> {
        let (prefix, _) = self.key.rsplit_once('/')?;
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() { None } else { Some(prefix) }
    }

    /// Last segment of [`prefix`](Self::prefix), which must equal the manifest's `run_id`.
    pub fn prefix_run_id(&self) -> Option<&str> {
        self.prefix().map(|p| p.rsplit('/').next().unwrap_or(p))
    }
}

impl fmt::Display for ManifestLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Inputs one declared workflow needs, as storage keys in the manifest's bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowEntry {
    pub workflow: WorkflowName,
    pub samplesheet_key: String,
    pub params_key: Option<String>,
}

/// A manifest that passed [`validate`]. Entries keep the manifest's workflow order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedManifest {
    pub run_id: RunId,
    pub location: ManifestLocation,
    pub timestamp: Option<String>,
    pub entries: Vec<WorkflowEntry>,
}

impl ValidatedManifest {
    pub fn workflows(&self) -> impl Iterator<Item = &WorkflowName> {
        self.entries.iter().map(|e| &e.workflow)
    }
}

/// Checks a manifest without touching storage.
///
/// Rejects: empty or relocated `run_id`, empty or duplicated `workflows`,
/// missing/empty samplesheet entries and artifact URIs pointing outside the
/// manifest's bucket. Whether a workflow is configured for dispatch is decided
/// per workflow during resolution, so it never rejects the whole manifest.
pub fn validate(manifest: &RunManifestDto, location: &ManifestLocation) -> Result<ValidatedManifest> {
    let run_id = manifest.run_id.trim();
    let invalid = |reason: String| Error::ValidationError {
        run_id: manifest.run_id.clone(),
        manifest_key: location.key.clone(),
        reason,
    };

    if !location.key.ends_with(MANIFEST_FILE_NAME) {
        return Err(invalid(format!("object is not a {}", MANIFEST_FILE_NAME)));
    }
    if run_id.is_empty() {
        return Err(invalid("run_id is empty".to_string()));
    }
    let prefix = location.prefix().ok_or_else(|| invalid("manifest is not stored under a run prefix".to_string()))?;
    match location.prefix_run_id() {
        Some(found) if found == run_id => {}
        found => {
            return Err(invalid(format!(
                "run_id does not match the prefix '{}' the manifest was found under",
                found.unwrap_or_default()
            )));
        }
    }

    if manifest.workflows.is_empty() {
        return Err(invalid("workflows list is empty".to_string()));
    }

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(manifest.workflows.len());
    for declared in &manifest.workflows {
        let name = declared.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(invalid("workflows list contains an empty name".to_string()));
        }
        if !seen.insert(name.clone()) {
            return Err(invalid(format!("workflow '{}' is listed more than once", name)));
        }

        let samplesheet_entry = samplesheet_entry_name(&name);
        let samplesheet = manifest
            .artifact(&samplesheet_entry)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| invalid(format!("workflow '{}' has no '{}' entry", name, samplesheet_entry)))?;
        let samplesheet_key = resolve_artifact_key(samplesheet, prefix, &location.bucket).map_err(&invalid)?;

        let params_key = match manifest.artifact(&params_entry_name(&name)).map(str::trim) {
            Some(value) if !value.is_empty() => Some(resolve_artifact_key(value, prefix, &location.bucket).map_err(&invalid)?),
            _ => None,
        };

        entries.push(WorkflowEntry { workflow: WorkflowName::new(name), samplesheet_key, params_key });
    }

    Ok(ValidatedManifest {
        run_id: RunId::new(run_id),
        location: location.clone(),
        timestamp: manifest.timestamp.clone(),
        entries,
    })
}

/// Turns a manifest artifact value into a key in the manifest's bucket.
///
/// `s3://` URIs must name the same bucket; bare file names are relative to the
/// run prefix; anything containing `/` is already bucket-relative.
fn resolve_artifact_key(value: &str, prefix: &str, bucket: &str) -> std::result::Result<String, String> {
    if value.starts_with("s3://") {
        let uri = S3Uri::parse(value).ok_or_else(|| format!("'{}' is not a valid S3 URI", value))?;
        if uri.bucket != bucket {
            return Err(format!("'{}' points outside bucket '{}'", value, bucket));
        }
        if uri.key.is_empty() {
            return Err(format!("'{}' has no object key", value));
        }
        return Ok(uri.key);
    }
    if value.contains('/') {
        Ok(value.trim_start_matches('/').to_string())
    } else {
        Ok(join_key(&[prefix, value]))
    }
}

/// Builds the manifest the uploader writes last, after every artifact it names.
pub fn build_manifest(run_id: &str, workflows: &[WorkflowName], params: &[WorkflowName], created_at: DateTime<Utc>) -> RunManifestDto {
    let mut artifacts = Map::new();
    for workflow in workflows {
        let entry = samplesheet_entry_name(workflow.as_str());
        let key = join_key(&[run_id, &entry]);
        artifacts.insert(entry, Value::String(key));
    }
    for workflow in params {
        let entry = params_entry_name(workflow.as_str());
        let key = join_key(&[run_id, &entry]);
        artifacts.insert(entry, Value::String(key));
    }

    RunManifestDto {
        run_id: run_id.to_string(),
        timestamp: Some(created_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        workflows: workflows.iter().map(|w| w.to_string()).collect(),
        artifacts,
    }
}
