pub mod id;
pub mod retry;
pub mod s3_uri;
