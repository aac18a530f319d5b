use std::path::Path;

use crate::api::config_dto::DispatcherConfigDto;
use crate::domain::config::DispatcherConfig;
use crate::error::Result;
use crate::loader::parser::parse_json_file;

pub mod api;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// Reads the dispatcher configuration file, applies environment overrides and
/// validates the result.
pub fn load_config(file_path: impl AsRef<Path>) -> Result<DispatcherConfig> {
    let file_path = file_path.as_ref();
    let dto: DispatcherConfigDto = parse_json_file(file_path)?;
    log::info!("Configuration '{}' parsed successfully.", file_path.display());

    let config = DispatcherConfig::try_from(dto.with_env_overrides())?;
    log::info!("{} workflow(s) configured for dispatch.", config.catalog.names().count());

    Ok(config)
}
