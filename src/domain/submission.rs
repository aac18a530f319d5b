use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::manifest_dto::RunManifestDto;
use crate::domain::config::normalize_workflow_name;
use crate::domain::manifest::{MANIFEST_FILE_NAME, build_manifest, params_entry_name, samplesheet_entry_name};
use crate::domain::samplesheet::{ReadPair, find_pairs, render_samplesheet};
use crate::domain::storage::ArtifactStore;
use crate::domain::utils::id::WorkflowName;
use crate::domain::utils::s3_uri::join_key;
use crate::error::{Error, Result};

/// Everything one sample submission uploads, prepared locally before any
/// transfer starts.
#[derive(Debug, Clone)]
pub struct SubmissionPlan {
    pub run_id: String,
    pub samples_dir: PathBuf,
    pub input_bucket: String,
    pub pairs: BTreeMap<String, ReadPair>,
    pub samplesheets: Vec<(WorkflowName, String)>,
    pub params: Vec<(WorkflowName, Bytes)>,
    pub manifest: RunManifestDto,
}

impl SubmissionPlan {
    /// Pairs the reads in `samples_dir`, renders a samplesheet per workflow and
    /// builds the manifest.
    ///
    /// `run_id` defaults to the directory name. Parameter files must be valid
    /// JSON and belong to one of the submitted workflows.
    pub fn prepare(
        samples_dir: &Path,
        input_bucket: &str,
        run_id: Option<&str>,
        workflows: &[String],
        params: &[(String, PathBuf)],
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if !samples_dir.is_dir() {
            return Err(Error::SubmissionError(format!("samples directory '{}' does not exist", samples_dir.display())));
        }
        let run_id = match run_id {
            Some(run_id) => run_id.trim().to_string(),
            None => samples_dir.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string(),
        };
        if run_id.is_empty() || run_id.contains('/') {
            return Err(Error::SubmissionError(format!("'{}' cannot be used as a run id", run_id)));
        }
        if workflows.is_empty() {
            return Err(Error::SubmissionError("at least one workflow is required".to_string()));
        }

        let mut names: Vec<WorkflowName> = Vec::with_capacity(workflows.len());
        for workflow in workflows {
            let name = WorkflowName::new(normalize_workflow_name(workflow)?);
            if !names.contains(&name) {
                names.push(name);
            }
        }

        let pairs = find_pairs(samples_dir)?;
        if pairs.is_empty() {
            return Err(Error::SubmissionError(format!(
                "no paired FASTQ files (*_R1/_R2.fastq.gz or *_1/_2.fastq.gz) in '{}'",
                samples_dir.display()
            )));
        }

        let samplesheets = names
            .iter()
            .map(|wf| Ok((wf.clone(), render_samplesheet(wf.as_str(), &pairs, input_bucket, &run_id)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut param_files = Vec::with_capacity(params.len());
        for (workflow, path) in params {
            let name = WorkflowName::new(normalize_workflow_name(workflow)?);
            if !names.contains(&name) {
                return Err(Error::SubmissionError(format!("parameters given for '{}', which is not submitted", name)));
            }
            let body = fs::read(path)?;
            serde_json::from_slice::<serde_json::Value>(&body).map_err(|e| {
                Error::SubmissionError(format!("parameter file '{}' is not valid JSON: {}", path.display(), e))
            })?;
            param_files.push((name, Bytes::from(body)));
        }

        let with_params: Vec<WorkflowName> = param_files.iter().map(|(wf, _)| wf.clone()).collect();
        let manifest = build_manifest(&run_id, &names, &with_params, created_at);

        Ok(SubmissionPlan {
            run_id,
            samples_dir: samples_dir.to_path_buf(),
            input_bucket: input_bucket.to_string(),
            pairs,
            samplesheets,
            params: param_files,
            manifest,
        })
    }

    pub fn manifest_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.manifest)? + "\n")
    }

    /// Writes the samplesheets and manifest next to the reads.
    pub fn write_local(&self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.samplesheets.len() + 1);
        for (workflow, csv) in &self.samplesheets {
            let path = self.samples_dir.join(samplesheet_entry_name(workflow.as_str()));
            fs::write(&path, csv)?;
            written.push(path);
        }
        let manifest_path = self.samples_dir.join(MANIFEST_FILE_NAME);
        fs::write(&manifest_path, self.manifest_json()?)?;
        written.push(manifest_path);
        Ok(written)
    }

    /// Uploads reads, samplesheets and parameter files, then the manifest.
    ///
    /// The manifest is the commit marker for the dispatcher, so it is only
    /// written once every object it names is in place. Any failure stops the
    /// upload before the manifest.
    pub async fn upload(&self, store: &ArtifactStore) -> Result<Vec<String>> {
        let mut uploaded = Vec::new();

        for pair in self.pairs.values() {
            for file in [&pair.r1, &pair.r2] {
                let key = join_key(&[&self.run_id, file]);
                store.put_file(&self.samples_dir.join(file), &key, None).await?;
                uploaded.push(key);
            }
        }
        log::info!("Uploaded {} read file(s) for run '{}'", uploaded.len(), self.run_id);

        for (workflow, csv) in &self.samplesheets {
            let key = join_key(&[&self.run_id, &samplesheet_entry_name(workflow.as_str())]);
            store.put(&key, Bytes::from(csv.clone()), Some("text/csv")).await?;
            uploaded.push(key);
        }

        for (workflow, body) in &self.params {
            let key = join_key(&[&self.run_id, &params_entry_name(workflow.as_str())]);
            store.put(&key, body.clone(), Some("application/json")).await?;
            uploaded.push(key);
        }

        let key = join_key(&[&self.run_id, MANIFEST_FILE_NAME]);
        store.put(&key, Bytes::from(self.manifest_json()?), Some("application/json")).await?;
        uploaded.push(key);

        log::info!("Run '{}' committed to {}", self.run_id, store.uri(&format!("{}/", self.run_id)));
        Ok(uploaded)
    }
}
