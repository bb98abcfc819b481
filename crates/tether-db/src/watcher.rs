use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsEvent {
    /// The database (or its write-ahead log) was modified.
    Changed,
}

/// Whether `path` is the database file or one of its SQLite companions
/// (`-wal`, `-shm`, `-journal`).
fn is_db_file(path: &Path, db_name: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(db_name))
}

/// Watch the settings database for changes made by any process.
/// Returns a receiver that emits SettingsEvents, plus a handle to keep the
/// watcher alive.
///
/// The containing directory is watched rather than the file itself, since
/// SQLite may replace or create its companion files at any time.
pub fn watch_settings(
    db_path: PathBuf,
) -> Result<(mpsc::Receiver<SettingsEvent>, RecommendedWatcher), String> {
    let (tx, rx) = mpsc::channel();

    let db_name = db_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format!("not a file path: {}", db_path.display()))?
        .to_string();
    let dir = db_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            let Ok(event) = res else {
                return;
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            if event.paths.iter().any(|p| is_db_file(p, &db_name)) {
                let _ = tx.send(SettingsEvent::Changed);
            }
        },
        Config::default(),
    )
    .map_err(|e| format!("failed to create watcher: {e}"))?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| format!("failed to watch {}: {e}", dir.display()))?;

    Ok((rx, watcher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_is_db_file() {
        assert!(is_db_file(Path::new("/x/tether.db"), "tether.db"));
        assert!(is_db_file(Path::new("/x/tether.db-wal"), "tether.db"));
        assert!(!is_db_file(Path::new("/x/other.db"), "tether.db"));
    }

    #[test]
    fn test_write_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tether.db");
        let conn = crate::open(&path).unwrap();

        let (rx, _watcher) = watch_settings(path.clone()).unwrap();
        crate::settings::set(&conn, "command", "/bin/sh").unwrap();

        let event = rx.recv_timeout(Duration::from_secs(5));
        assert_eq!(event, Ok(SettingsEvent::Changed));
    }

    #[test]
    fn test_unrelated_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tether.db");
        let (rx, _watcher) = watch_settings(path).unwrap();

        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }
}
