//! Configuration module for Resumo.
//!
//! Handles loading and managing application settings.

mod settings;

pub use settings::{
    ExtractionSettings, ExtractionStrategyKind, GeneralSettings, ProviderSettings,
    ServerSettings, Settings,
};
