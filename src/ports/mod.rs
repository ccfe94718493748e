// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ports layer containing trait definitions.
//!
//! This module contains the trait definitions (ports) through which the
//! managers reach the outside world: time, backup persistence, remote defaults
//! and hot-reload document producers. Adapters implement them.

pub mod backup;
pub mod clock;
pub mod defaults;
pub mod watcher;

// Re-export commonly used types
pub use backup::BackupStore;
pub use clock::Clock;
pub use defaults::DefaultsSource;
pub use watcher::{ChangeCallback, DocumentCallback, DocumentWatcher};
