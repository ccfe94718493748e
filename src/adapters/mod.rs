// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapters layer containing port implementations.
//!
//! This module contains concrete implementations of the traits defined in the
//! ports layer: clocks, backup stores, defaults sources and document watchers.

pub mod clock;
pub mod file_backup;
pub mod memory_backup;
pub mod static_defaults;

pub mod watchers;

pub use clock::{ManualClock, SystemClock};
pub use file_backup::FileBackupStore;
pub use memory_backup::MemoryBackupStore;
pub use static_defaults::StaticDefaults;
#[cfg(feature = "reload")]
pub use watchers::FileWatcher;
