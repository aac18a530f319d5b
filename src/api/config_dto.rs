use serde::{Deserialize, Serialize};

fn default_call_timeout_secs() -> u64 {
    20
}

fn default_dispatch_concurrency() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    5
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff() -> String {
    "fixed".to_string()
}

/// On-disk dispatcher configuration (JSON, camelCase).
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherConfigDto {
    pub input_bucket: String,
    pub output_bucket: String,
    #[serde(default)]
    pub output_prefix: Option<String>,
    pub role_arn: String,
    #[serde(default)]
    pub run_group_id: Option<String>,
    #[serde(default)]
    pub cache_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_dispatch_concurrency")]
    pub dispatch_concurrency: usize,
    #[serde(default)]
    pub verify_reads: bool,
    pub workflows: Vec<WorkflowTargetDto>,
    #[serde(default)]
    pub upload_retry: RetryPolicyDto,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTargetDto {
    pub name: String,
    /// Workflow id or full workflow ARN.
    pub workflow_id: String,
    #[serde(default)]
    pub version_name: Option<String>,
    #[serde(default)]
    pub parameter_template: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicyDto {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// `fixed` or `exponential`.
    #[serde(default = "default_backoff")]
    pub backoff: String,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryPolicyDto {
    fn default() -> Self {
        RetryPolicyDto {
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
            delay_ms: default_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: false,
        }
    }
}

impl DispatcherConfigDto {
    /// Environment variables take precedence over the file, so a deployed
    /// function can be re-pointed without shipping a new config.
    pub fn with_env_overrides(mut self) -> Self {
        use std::env;

        if let Ok(role_arn) = env::var("OMICS_ROLE_ARN") {
            self.role_arn = role_arn;
        }
        if let Ok(bucket) = env::var("OMICS_INPUT_BUCKET") {
            self.input_bucket = bucket;
        }
        if let Ok(bucket) = env::var("OMICS_OUTPUT_BUCKET") {
            self.output_bucket = bucket;
        }
        if let Ok(run_group) = env::var("OMICS_RUN_GROUP_ID") {
            self.run_group_id = Some(run_group);
        }
        if let Ok(region) = env::var("AWS_REGION") {
            self.region.get_or_insert(region);
        }
        self
    }
}
