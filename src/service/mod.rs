// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service layer containing the trust pipeline managers.
//!
//! Each manager owns its own state (caches, key history, roles, sessions) and
//! reaches the outside world only through the ports. [`TrustPipeline`] wires
//! them together.

pub mod access_control;
pub mod conditions;
pub mod configuration;
pub mod encryption;
pub mod environment_defaults;
pub mod inheritance;
pub mod key_store;
pub mod markup;
pub mod migration;
pub mod pipeline;
pub mod sanitizer;
pub mod transformers;

// Re-export commonly used types
pub use access_control::AccessControlManager;
pub use configuration::{
    ConfigurationManager, ConfigurationManagerBuilder, ConfigurationMetrics, HotReloadConfig,
    LoadOptions, WatchHandle,
};
pub use encryption::EncryptionEngine;
pub use inheritance::{InheritanceRule, InheritanceStrategy};
pub use migration::MigrationManager;
pub use pipeline::{SubmitOutcome, TrustPipeline, TrustPipelineBuilder};
pub use sanitizer::{
    IssueCode, SanitizationContext, SanitizationIssue, SanitizationResult, Sanitizer, Severity,
};
pub use transformers::Transformer;
