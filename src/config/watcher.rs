//! Filesystem watcher for hot reload of directory configurations.

use std::path::PathBuf;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::schema::ConfigurationEntry;
use crate::loader::LoaderKind;

/// Watches the roots of directory configurations declared with `watch = true`.
pub struct ConfigWatcher {
    roots: Vec<(String, PathBuf)>,
    change_tx: mpsc::UnboundedSender<String>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver yielding the name of each changed
    /// configuration.
    pub fn new(entries: &[ConfigurationEntry]) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let roots = entries
            .iter()
            .filter(|e| e.watch && e.kind == LoaderKind::Directory)
            .filter_map(|e| e.path.clone().map(|p| (e.name.clone(), p)))
            .collect();

        (Self { roots, change_tx }, change_rx)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Start watching in a background thread.
    ///
    /// The returned watcher must be kept alive for events to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx.clone();
        let roots = self.roots.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove()) {
                        return;
                    }
                    for (name, root) in &roots {
                        if event.paths.iter().any(|p| p.starts_with(root)) {
                            tracing::info!(configuration = %name, "Configuration change detected");
                            let _ = tx.send(name.clone());
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        for (name, root) in &self.roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
            tracing::info!(configuration = %name, path = ?root, "Configuration watcher started");
        }
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_watched_directories_are_tracked() {
        let entries = vec![
            ConfigurationEntry {
                name: "A".into(),
                kind: LoaderKind::Directory,
                path: Some("/srv/A".into()),
                base_path: None,
                parent: None,
                version: None,
                descriptor: None,
                watch: true,
            },
            ConfigurationEntry {
                name: "B".into(),
                kind: LoaderKind::Directory,
                path: Some("/srv/B".into()),
                base_path: None,
                parent: None,
                version: None,
                descriptor: None,
                watch: false,
            },
        ];
        let (watcher, _rx) = ConfigWatcher::new(&entries);
        assert_eq!(watcher.roots, vec![("A".to_string(), PathBuf::from("/srv/A"))]);
        assert!(!watcher.is_empty());
    }
}
