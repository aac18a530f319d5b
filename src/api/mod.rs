pub mod config_dto;
pub mod manifest_dto;
pub mod s3_event_dto;
