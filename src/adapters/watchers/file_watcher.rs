// SPDX-License-Identifier: MIT OR Apache-2.0

//! File system watcher for configuration documents.
//!
//! Monitors a single JSON (or YAML, with the `yaml` feature) document on disk
//! and hands the parsed contents to a callback whenever the file changes.

use crate::domain::{Result, TrustError};
use crate::ports::{DocumentCallback, DocumentWatcher};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Watches a configuration document file.
///
/// Changes are debounced. A file that fails to parse is logged and skipped;
/// the previous configuration stays in effect.
///
/// # Examples
///
/// ```rust,no_run
/// use trustcfg::adapters::FileWatcher;
/// use trustcfg::ports::DocumentWatcher;
/// use std::sync::Arc;
///
/// # fn main() -> trustcfg::domain::Result<()> {
/// let mut watcher = FileWatcher::new("/path/to/runtime.json", None)?;
///
/// watcher.watch(Arc::new(|document| {
///     println!("New document: {}", document);
/// }))?;
///
/// watcher.stop()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileWatcher {
    file_path: PathBuf,
    /// Debounce delay (default 500ms)
    debounce_delay: Duration,
    watcher: Option<RecommendedWatcher>,
    event_rx: Option<Arc<Mutex<Receiver<notify::Result<Event>>>>>,
    watch_thread: Option<JoinHandle<()>>,
    stop_tx: Option<Sender<()>>,
}

impl FileWatcher {
    /// Creates a watcher for `path`. The file must already exist.
    pub fn new(path: impl AsRef<Path>, debounce_delay: Option<Duration>) -> Result<Self> {
        let file_path = path.as_ref().to_path_buf();

        if !file_path.exists() {
            return Err(TrustError::WatcherError {
                message: format!("File does not exist: {}", file_path.display()),
                source: None,
            });
        }

        Ok(Self {
            file_path,
            debounce_delay: debounce_delay.unwrap_or(Duration::from_millis(500)),
            watcher: None,
            event_rx: None,
            watch_thread: None,
            stop_tx: None,
        })
    }

    /// The watched file.
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Reads and parses the document at `path`.
    pub fn read_document(path: &Path) -> Result<Value> {
        let contents = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            #[cfg(feature = "yaml")]
            {
                return serde_yaml::from_str(&contents).map_err(|e| TrustError::WatcherError {
                    message: format!("Failed to parse {}: {}", path.display(), e),
                    source: Some(Box::new(e)),
                });
            }
            #[cfg(not(feature = "yaml"))]
            {
                return Err(TrustError::WatcherError {
                    message: format!(
                        "YAML support is disabled; cannot read {}",
                        path.display()
                    ),
                    source: None,
                });
            }
        }

        Ok(serde_json::from_str(&contents)?)
    }
}

impl DocumentWatcher for FileWatcher {
    fn watch(&mut self, callback: DocumentCallback) -> Result<()> {
        if self.watcher.is_some() {
            return Err(TrustError::WatcherError {
                message: "Watcher is already running".to_string(),
                source: None,
            });
        }

        let (event_tx, event_rx) = channel();
        let (stop_tx, stop_rx) = channel::<()>();

        let mut watcher =
            RecommendedWatcher::new(event_tx, notify::Config::default()).map_err(|e| {
                TrustError::WatcherError {
                    message: format!("Failed to create file watcher: {}", e),
                    source: Some(Box::new(e)),
                }
            })?;

        // Watch the parent directory; editors often replace files on save.
        let watch_path = if self.file_path.is_file() {
            self.file_path
                .parent()
                .ok_or_else(|| TrustError::WatcherError {
                    message: "Failed to get parent directory".to_string(),
                    source: None,
                })?
                .to_path_buf()
        } else {
            self.file_path.clone()
        };

        watcher
            .watch(&watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| TrustError::WatcherError {
                message: format!("Failed to start watching: {}", e),
                source: Some(Box::new(e)),
            })?;

        self.watcher = Some(watcher);
        self.stop_tx = Some(stop_tx);
        let event_rx = Arc::new(Mutex::new(event_rx));
        self.event_rx = Some(Arc::clone(&event_rx));

        let file_path = self.file_path.clone();
        let debounce_delay = self.debounce_delay;

        let watch_thread = thread::spawn(move || {
            let mut last_event_time: Option<Instant> = None;

            loop {
                if stop_rx.try_recv().is_ok() {
                    break;
                }

                let event = match event_rx.lock() {
                    Ok(rx) => rx.recv_timeout(Duration::from_millis(100)),
                    Err(_) => break,
                };

                let Ok(Ok(event)) = event else {
                    continue;
                };
                if !event.paths.iter().any(|p| p == &file_path) {
                    continue;
                }

                let now = Instant::now();
                let should_trigger = last_event_time
                    .map(|last| now.duration_since(last) >= debounce_delay)
                    .unwrap_or(true);
                if !should_trigger {
                    continue;
                }
                last_event_time = Some(now);

                match FileWatcher::read_document(&file_path) {
                    Ok(document) => callback(document),
                    Err(e) => tracing::warn!(
                        path = %file_path.display(),
                        error = %e,
                        "ignoring unreadable configuration document"
                    ),
                }
            }
        });

        self.watch_thread = Some(watch_thread);

        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(handle) = self.watch_thread.take() {
            handle.join().map_err(|_| TrustError::WatcherError {
                message: "Failed to join watcher thread".to_string(),
                source: None,
            })?;
        }

        self.watcher = None;
        self.event_rx = None;

        Ok(())
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
