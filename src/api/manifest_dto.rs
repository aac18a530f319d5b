use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire form of `run_manifest.json`.
///
/// Field order on write is `run_id`, `timestamp`, `workflows`, then the
/// artifact entries in insertion order (`samplesheet_<wf>.csv`,
/// `params_<wf>.json`). Older uploads used `job_name` instead of `run_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifestDto {
    #[serde(alias = "job_name")]
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub workflows: Vec<String>,
    #[serde(flatten)]
    pub artifacts: Map<String, Value>,
}

impl RunManifestDto {
    /// Returns the artifact entry as a string, `None` if absent or not a string.
    pub fn artifact(&self, entry_name: &str) -> Option<&str> {
        self.artifacts.get(entry_name).and_then(Value::as_str)
    }
}
