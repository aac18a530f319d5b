pub mod bundle;
pub mod config;
pub mod dispatcher;
pub mod manifest;
pub mod omics;
pub mod registration;
pub mod samplesheet;
pub mod status;
pub mod storage;
pub mod submission;
pub mod trigger;
pub mod utils;
