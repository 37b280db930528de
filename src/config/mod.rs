//! Configuration management for the dispatch engine.
//!
//! Configuration is loaded from a TOML file in the user's config directory,
//! with serde-supplied defaults for every field so a partial file (or no file
//! at all) still yields a working engine.

pub mod file;

pub use file::{
    AudioPipelineConfig, DetectorConfig, DispatchConfig, ProviderEndpointConfig, ScribedConfig,
};
