//! Keeps browsers in step with the settings database.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;
use tether_db::settings;

use crate::driver::{Event, EventSender};

const RELOAD_DELAY: Duration = Duration::from_millis(50);

/// The settings the running server reacts to, read in one go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsSnapshot {
    /// Every setting as a JSON object, uploaded to browsers.
    pub json: String,
    pub browser_command: Option<String>,
    pub geometry: Option<String>,
}

pub fn snapshot(conn: &Connection) -> rusqlite::Result<SettingsSnapshot> {
    Ok(SettingsSnapshot {
        json: settings::to_json(conn)?,
        browser_command: settings::get(conn, settings::BROWSER_COMMAND)?,
        geometry: settings::get(conn, settings::GEOMETRY)?,
    })
}

/// Watch the database file and send a [`Event::SettingsChanged`] whenever
/// its contents differ from the last snapshot sent.
pub fn start_settings_watcher(
    db: Arc<Mutex<Connection>>,
    db_path: PathBuf,
    events: EventSender,
    initial: SettingsSnapshot,
) {
    let (changes, watcher) = match tether_db::watch_settings(db_path) {
        Ok(pair) => pair,
        Err(e) => {
            log::warn!("settings will not be reloaded: {e}");
            return;
        }
    };

    let spawned = std::thread::Builder::new()
        .name("settings-watch".to_string())
        .spawn(move || {
            // Keep the watcher alive for the lifetime of this thread.
            let _keep_alive = watcher;
            let mut last = initial;
            while changes.recv().is_ok() {
                // Coalesce a burst of file events into one reload.
                std::thread::sleep(RELOAD_DELAY);
                while changes.try_recv().is_ok() {}

                let current = {
                    let conn = match db.lock() {
                        Ok(c) => c,
                        Err(_) => return,
                    };
                    match snapshot(&conn) {
                        Ok(s) => s,
                        Err(e) => {
                            log::warn!("reloading settings: {e}");
                            continue;
                        }
                    }
                };
                if current == last {
                    continue;
                }
                last = current.clone();
                if events.send(Event::SettingsChanged(current)).is_err() {
                    return;
                }
            }
        });
    if let Err(e) = spawned {
        log::warn!("settings will not be reloaded: {e}");
    }
}
