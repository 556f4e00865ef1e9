pub mod config_service;
pub mod json_exchange_repository;
pub mod paths;
pub mod storage;
pub mod toml_prompt_repository;

pub use crate::config_service::ConfigService;
pub use crate::json_exchange_repository::JsonExchangeRepository;
pub use crate::paths::{DuetPaths, PathError};
pub use crate::toml_prompt_repository::TomlPromptRepository;
