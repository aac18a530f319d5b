//! Versioned nf-core workflow bundles and where they live in the code bucket.

pub mod guard;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::domain::utils::s3_uri::join_key;
use crate::error::{Error, Result};

const BUNDLE_PREFIX: &str = "nf-core-";
const BUNDLE_EXTENSION: &str = ".zip";

/// A local `nf-core-<workflow>_<version>.zip` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowBundle {
    pub path: PathBuf,
    pub file_name: String,
    /// Lowercased.
    pub workflow: String,
    pub version: String,
    pub size: u64,
}

impl WorkflowBundle {
    /// Checks the file is a regular `.zip` with a parseable bundle name.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let bundle_error = |reason: &str| Error::BundleError { file: display.clone(), reason: reason.to_string() };

        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(bundle_error("not found")),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Err(bundle_error("not a regular file"));
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| bundle_error("file name is not valid UTF-8"))?
            .to_string();
        if !file_name.to_ascii_lowercase().ends_with(BUNDLE_EXTENSION) {
            return Err(bundle_error("not a .zip file"));
        }
        let (workflow, version) = parse_bundle_file_name(&file_name)?;

        Ok(WorkflowBundle { path: path.to_path_buf(), file_name, workflow, version, size: metadata.len() })
    }
}

/// `nf-core-mag_3.0.0.zip` -> `("mag", "3.0.0")`.
///
/// The version is everything after the last `_`, so workflow names may
/// themselves contain underscores.
pub fn parse_bundle_file_name(file_name: &str) -> Result<(String, String)> {
    let invalid = || Error::BundleError {
        file: file_name.to_string(),
        reason: format!("does not match '{}<workflow>_<version>{}'", BUNDLE_PREFIX, BUNDLE_EXTENSION),
    };

    let lower = file_name.to_ascii_lowercase();
    if !lower.starts_with(BUNDLE_PREFIX) || !lower.ends_with(BUNDLE_EXTENSION) {
        return Err(invalid());
    }
    let stem = &file_name[BUNDLE_PREFIX.len()..file_name.len() - BUNDLE_EXTENSION.len()];
    let (workflow, version) = stem.rsplit_once('_').ok_or_else(invalid)?;

    let valid_name = !workflow.is_empty() && workflow.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid_name || version.is_empty() {
        return Err(invalid());
    }
    Ok((workflow.to_ascii_lowercase(), version.to_string()))
}

/// Workflow name -> key prefix in the code bucket, from `name=/prefix` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleMapping {
    prefixes: BTreeMap<String, String>,
}

impl BundleMapping {
    pub fn parse(entries: &[String]) -> Result<Self> {
        let mut prefixes = BTreeMap::new();
        for entry in entries {
            let (name, prefix) = entry
                .split_once('=')
                .ok_or_else(|| Error::ConfigError(format!("invalid mapping '{}', expected name=/prefix", entry)))?;
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                return Err(Error::ConfigError(format!("invalid mapping '{}': empty workflow name", entry)));
            }
            prefixes.insert(name, prefix.trim().trim_matches('/').to_string());
        }
        if prefixes.is_empty() {
            return Err(Error::ConfigError("at least one mapping is required (e.g. mag=/mag)".to_string()));
        }
        Ok(BundleMapping { prefixes })
    }

    pub fn prefix_for(&self, workflow: &str) -> Option<&str> {
        self.prefixes.get(workflow).map(String::as_str)
    }

    pub fn destination_key(&self, bundle: &WorkflowBundle) -> Option<String> {
        self.prefix_for(&bundle.workflow).map(|prefix| join_key(&[prefix, &bundle.file_name]))
    }
}

/// A bundle paired with the key it will be stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpload {
    pub bundle: WorkflowBundle,
    pub key: String,
}

/// Validates every input and maps it to its destination.
///
/// All problems are collected and reported together; an unmapped workflow is
/// an error, never silently skipped.
pub fn plan(paths: &[PathBuf], mapping: &BundleMapping) -> Result<Vec<PlannedUpload>> {
    let mut planned = Vec::with_capacity(paths.len());
    let mut problems = Vec::new();

    for path in paths {
        match WorkflowBundle::from_path(path) {
            Ok(bundle) => match mapping.destination_key(&bundle) {
                Some(key) => planned.push(PlannedUpload { bundle, key }),
                None => problems.push(format!("{}: no mapping for workflow '{}'", bundle.file_name, bundle.workflow)),
            },
            Err(e) => problems.push(e.to_string()),
        }
    }

    if !problems.is_empty() {
        return Err(Error::BundleError { file: format!("{} input(s)", problems.len()), reason: problems.join("; ") });
    }
    Ok(planned)
}

pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} PB", size)
}

impl fmt::Display for PlannedUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.bundle.path.display(), self.key, human_size(self.bundle.size))
    }
}
