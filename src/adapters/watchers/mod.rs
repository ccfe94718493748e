// SPDX-License-Identifier: MIT OR Apache-2.0

//! Watcher implementations for hot reload.
//!
//! This module contains implementations of the `DocumentWatcher` trait that
//! feed fresh documents to the configuration manager.

#[cfg(feature = "reload")]
pub mod file_watcher;

#[cfg(feature = "reload")]
pub use file_watcher::FileWatcher;
