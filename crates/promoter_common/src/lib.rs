//! Shared types for the promoter daemon: configuration, slot model, errors.

pub mod config;
pub mod error;
pub mod slot;

pub use config::{
    AmbiguityPolicy, Config, ConfigError, DeleteRetry, LogRotation, LoggingConfig,
    PromotionMode,
};
pub use error::{DeployError, PromotionFailure, PromotionPhase};
pub use slot::{PendingArtifact, ServiceDescriptor, Slot};
