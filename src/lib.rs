pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::http::ReqwestTransport;
pub use config::toml_config::RelayConfig;
pub use core::{relay::Relay, translation::TranslationEngine, uploader::Uploader};
pub use utils::error::{RelayError, Result};
