//! Shared configuration for the boxlight demo.
//!
//! Every field has a default matching the stock demo scene, so an absent or
//! partial YAML file still yields a complete configuration.

pub mod config;

pub use config::{
    AppConfig, CameraConfig, ConfigError, LightConfig, ShaderConfig, StagePaths, WindowConfig,
};

pub fn crate_info() -> &'static str {
    "boxlight-common v0.1.0"
}
