use serde::{Deserialize, Serialize};

/// The subset of an S3 "object created" notification the trigger needs.
#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct S3EventDto {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecordDto>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct S3EventRecordDto {
    #[serde(default)]
    pub event_name: Option<String>,
    pub s3: S3EntityDto,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct S3EntityDto {
    pub bucket: S3BucketDto,
    pub object: S3ObjectDto,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
pub struct S3BucketDto {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct S3ObjectDto {
    /// URL-encoded, with spaces as `+`.
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub sequencer: Option<String>,
}
