//! Configuration Module
//!
//! Configuration types and the Figment-based loader.

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    Config, EstimatorConfig, GenerationConfig, ProviderConfig, ProviderKind, QuotaConfig,
};
