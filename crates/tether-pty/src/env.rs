//! Environment handed to a session's child process.

/// Value forced for `TERM`.
pub const TERM: &str = "xterm-256color";
/// Value forced for `COLORTERM`.
pub const COLORTERM: &str = "truecolor";
/// Name of the variable describing the hosting server.
pub const DOMTERM: &str = "DOMTERM";

/// Runtime tag embedded in the `DOMTERM` value.
const RUNTIME_TAG: &str = "portable-pty";

/// Split `KEY=VALUE` strings into pairs, skipping entries without `=`.
pub fn parse_entries<I, S>(entries: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .filter_map(|entry| {
            let (key, value) = entry.as_ref().split_once('=')?;
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// `DOMTERM` value up to (not including) the trailing `;pid=<pid>`, which is
/// only known once the child runs.
pub fn domterm_value(version: &str, tty: Option<&str>, session_number: u32) -> String {
    let mut value = format!("version={version};{RUNTIME_TAG}");
    if let Some(tty) = tty.filter(|t| !t.is_empty()) {
        value.push_str(";tty=");
        value.push_str(tty);
    }
    value.push_str(&format!(";session#={session_number}"));
    value
}

/// Set `key` to `value`, replacing the first existing entry in place and
/// dropping any duplicates, or appending if absent.
pub fn put(env: &mut Vec<(String, String)>, key: &str, value: &str) {
    let mut found = false;
    env.retain_mut(|(k, v)| {
        if k != key {
            return true;
        }
        if found {
            return false;
        }
        found = true;
        *v = value.to_string();
        true
    });
    if !found {
        env.push((key.to_string(), value.to_string()));
    }
}

/// Derive the child environment from `base`.
pub fn build_environment(base: &[(String, String)], domterm: &str) -> Vec<(String, String)> {
    let mut env = base.to_vec();
    put(&mut env, "TERM", TERM);
    put(&mut env, "COLORTERM", COLORTERM);
    put(&mut env, DOMTERM, domterm);
    env
}
