use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};

/// Command run in sessions started without an explicit command.
pub const COMMAND: &str = "command";
/// Default geometry for new browser windows, e.g. `800x600`.
pub const GEOMETRY: &str = "geometry";
/// Browser launch pattern; `%U` is replaced by the URL and `%g` by the geometry.
pub const BROWSER_COMMAND: &str = "browser.command";
pub const PAUSE_THRESHOLD: &str = "flow.pause-threshold";
pub const RESUME_THRESHOLD: &str = "flow.resume-threshold";
pub const TEARDOWN_GRACE_MS: &str = "teardown.grace-ms";

pub fn get(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

/// Read a setting and parse it, logging and ignoring values that do not
/// parse.
pub fn get_parsed<T: std::str::FromStr>(conn: &Connection, key: &str) -> rusqlite::Result<Option<T>> {
    Ok(get(conn, key)?.and_then(|raw| match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring setting {key}: cannot parse '{raw}'");
            None
        }
    }))
}

pub fn set(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now')) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value],
    )?;
    Ok(())
}

/// All settings, ordered by key.
pub fn all(conn: &Connection) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

/// All settings as one JSON object of strings, as uploaded to browsers.
pub fn to_json(conn: &Connection) -> rusqlite::Result<String> {
    let object: Map<String, Value> = all(conn)?
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    Ok(Value::Object(object).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_in_memory;

    #[test]
    fn test_get_missing() {
        let conn = open_in_memory().unwrap();
        assert_eq!(get(&conn, "nope").unwrap(), None);
    }

    #[test]
    fn test_set_overwrites() {
        let conn = open_in_memory().unwrap();
        set(&conn, COMMAND, "/bin/bash").unwrap();
        set(&conn, COMMAND, "/bin/zsh").unwrap();
        assert_eq!(get(&conn, COMMAND).unwrap().as_deref(), Some("/bin/zsh"));
        assert_eq!(all(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_get_parsed() {
        let conn = open_in_memory().unwrap();
        set(&conn, PAUSE_THRESHOLD, " 4000 ").unwrap();
        set(&conn, RESUME_THRESHOLD, "lots").unwrap();
        assert_eq!(get_parsed::<u32>(&conn, PAUSE_THRESHOLD).unwrap(), Some(4000));
        assert_eq!(get_parsed::<u32>(&conn, RESUME_THRESHOLD).unwrap(), None);
        assert_eq!(get_parsed::<u64>(&conn, TEARDOWN_GRACE_MS).unwrap(), None);
    }

    #[test]
    fn test_to_json() {
        let conn = open_in_memory().unwrap();
        assert_eq!(to_json(&conn).unwrap(), "{}");

        set(&conn, "style.user", "div { color: \"red\" }").unwrap();
        set(&conn, GEOMETRY, "800x600").unwrap();
        let json: Value = serde_json::from_str(&to_json(&conn).unwrap()).unwrap();
        assert_eq!(json[GEOMETRY], "800x600");
        assert_eq!(json["style.user"], "div { color: \"red\" }");
    }
}
