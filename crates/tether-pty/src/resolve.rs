//! Program and working directory resolution for new sessions.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// True if `path` is a regular file with any execute bit set.
fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Locate `program` the way `execvp` would: names containing `/` are used as
/// given, bare names are searched for on `search_path`.
pub fn find_executable(program: &str, search_path: Option<&str>) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }
    let search_path = search_path.unwrap_or("/usr/local/bin:/usr/bin:/bin");
    search_path
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(program))
        .find(|candidate| is_executable(candidate))
}

/// Get the user's home directory.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Directory the child starts in: the requested one if it is usable, else the
/// home directory, else `/`.
pub fn working_dir(requested: Option<&Path>) -> PathBuf {
    requested
        .filter(|dir| dir.is_dir())
        .map(Path::to_path_buf)
        .or_else(|| home_dir().filter(|home| home.is_dir()))
        .unwrap_or_else(|| PathBuf::from("/"))
}
