//! Configuration file watcher for hot reload.
//!
//! The receiver returned by [`ConfigWatcher::new`] is meant to be handed to
//! `Monitor::run`; starting the watcher is left to the embedding
//! application.

use std::path::{Path, PathBuf};
use std::time::Duration;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::MonitorConfig;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<MonitorConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<MonitorConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Load the file now and send it to the receiver. Returns false if the
    /// file could not be loaded, in which case nothing is sent.
    pub fn reload(&self) -> bool {
        reload(&self.path, &self.update_tx)
    }

    /// Start watching the file in a background thread. Watching stops when
    /// the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| handle_event(res, &path, &tx),
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Reload the configuration for modify and create events. An invalid file
/// keeps the current configuration.
fn handle_event(
    res: notify::Result<Event>,
    path: &Path,
    tx: &mpsc::UnboundedSender<MonitorConfig>,
) {
    match res {
        Ok(event) => {
            if event.kind.is_modify() || event.kind.is_create() {
                tracing::info!("Config file change detected, reloading...");
                reload(path, tx);
            }
        }
        Err(e) => tracing::error!("Watch error: {:?}", e),
    }
}

fn reload(path: &Path, tx: &mpsc::UnboundedSender<MonitorConfig>) -> bool {
    match load_config(path) {
        Ok(new_config) => tx.send(new_config).is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to reload config. Keeping current configuration.");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use notify::event::{AccessKind, CreateKind, EventKind};

    #[test]
    fn test_reload_on_create() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[polling]\ninterval_secs = 42").unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(file.path());
        let event = Event::new(EventKind::Create(CreateKind::File));
        handle_event(Ok(event), file.path(), &watcher.update_tx);

        assert_eq!(rx.try_recv().unwrap().polling.interval_secs, 42);
    }

    #[test]
    fn test_invalid_file_and_other_events_ignored() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[polling]\ninterval_secs = 0").unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(file.path());
        handle_event(
            Ok(Event::new(EventKind::Create(CreateKind::File))),
            file.path(),
            &watcher.update_tx,
        );
        handle_event(
            Ok(Event::new(EventKind::Access(AccessKind::Any))),
            file.path(),
            &watcher.update_tx,
        );

        assert!(rx.try_recv().is_err());
    }
}
