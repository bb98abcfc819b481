//! tether-db: the settings store.
//!
//! Settings live in a small SQLite database as string key/value pairs. The
//! server reads a handful of them at startup, uploads all of them to
//! browsers as one JSON object, and watches the database file so edits made
//! by another process are picked up.

pub mod schema;
pub mod settings;
pub mod watcher;

use rusqlite::Connection;
use std::fs;
use std::path::Path;

pub use watcher::{watch_settings, SettingsEvent};

pub fn open(path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent) {
            log::warn!("could not create {}: {e}", parent.display());
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    schema::initialize(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    schema::initialize(&conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tether.db");

        let conn = open(&path).unwrap();
        settings::set(&conn, "command", "/bin/zsh").unwrap();
        drop(conn);

        let conn = open(&path).unwrap();
        assert_eq!(
            settings::get(&conn, "command").unwrap().as_deref(),
            Some("/bin/zsh")
        );
    }
}
