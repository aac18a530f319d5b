use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Failed to read or write samplesheet CSV: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Malformed or incomplete manifest. Terminal, never retried.
    #[error("Invalid manifest '{manifest_key}' (run_id '{run_id}'): {reason}")]
    ValidationError { run_id: String, manifest_key: String, reason: String },

    /// A referenced object is absent. Terminal for the affected workflow only.
    #[error("Missing artifact for run '{run_id}', workflow '{workflow}': object '{key}' does not exist")]
    MissingArtifactError { run_id: String, workflow: String, key: String },

    /// The run-start API failed. Safe to retry through event redelivery.
    #[error("Failed to dispatch workflow '{workflow}' for run '{run_id}' (run name '{run_name}'): {message}")]
    DispatchError { run_id: String, workflow: String, run_name: String, message: String },

    #[error("Failed to upload '{key}' after {attempts} attempt(s): {message}")]
    UploadError { key: String, attempts: u32, message: String },

    /// Storage failure other than a missing object, e.g. a throttled HEAD.
    #[error("Object storage operation on '{key}' failed: {source}")]
    StorageError {
        key: String,
        #[source]
        source: object_store::Error,
    },

    #[error("HealthOmics {operation} failed: {message}")]
    OmicsApiError { operation: &'static str, message: String },

    #[error("{operation} on '{resource}' timed out after {seconds}s")]
    Timeout { operation: &'static str, resource: String, seconds: u64 },

    #[error("Invalid workflow bundle '{file}': {reason}")]
    BundleError { file: String, reason: String },

    #[error("Invalid submission: {0}")]
    SubmissionError(String),
}

impl Error {
    /// Failures a redelivered event can clear: dispatch errors and transient
    /// storage or service outages.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::DispatchError { .. } | Error::StorageError { .. } | Error::Timeout { .. } | Error::OmicsApiError { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
