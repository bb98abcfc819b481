//! Opens browser windows and links with an external program.

use std::process::Stdio;

use tokio::process::Command;

/// Launches browser windows for sessions and the handler for links.
#[derive(Debug, Clone, Default)]
pub struct Launcher {
    /// Pattern from `--browser` or the `browser.command` setting.
    pub command: Option<String>,
    /// Geometry used when a request names none.
    pub geometry: Option<String>,
}

impl Launcher {
    pub fn new(command: Option<String>, geometry: Option<String>) -> Self {
        Self { command, geometry }
    }

    pub fn open_window(&self, url: &str, geometry: Option<&str>) {
        let geometry = geometry.or(self.geometry.as_deref());
        let argv = match self.command.as_deref() {
            Some(pattern) => expand(pattern, url, geometry),
            None => vec![default_opener().to_string(), url.to_string()],
        };
        launch(argv);
    }

    /// Links go to the desktop's default handler, not the session browser.
    pub fn open_link(&self, url: &str) {
        launch(vec![default_opener().to_string(), url.to_string()]);
    }
}

fn default_opener() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}

/// Split a browser pattern into argv, substituting `%U` and `%g`.
///
/// The URL is appended when the pattern has no `%U`. Words mentioning `%g`
/// are dropped when there is no geometry.
pub fn expand(pattern: &str, url: &str, geometry: Option<&str>) -> Vec<String> {
    let mut saw_url = false;
    let mut argv = Vec::new();
    for word in pattern.split_whitespace() {
        if word.contains("%g") {
            match geometry {
                Some(g) => argv.push(word.replace("%g", g).replace("%U", url)),
                None => continue,
            }
        } else {
            argv.push(word.replace("%U", url));
        }
        saw_url |= word.contains("%U");
    }
    if !saw_url {
        argv.push(url.to_string());
    }
    argv
}

/// Start `argv` detached from our stdio and reap it in the background.
fn launch(argv: Vec<String>) {
    let Some((program, args)) = argv.split_first() else {
        return;
    };
    log::info!("opening browser: {}", argv.join(" "));
    let spawned = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            log::error!("failed to run {program}: {e}");
            return;
        }
    };
    let program = program.clone();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if !status.success() => log::warn!("{program} exited with {status}"),
            Ok(_) => {}
            Err(e) => log::warn!("waiting for {program}: {e}"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_substitutes_url_and_geometry() {
        let argv = expand(
            "firefox --new-window --geometry=%g %U",
            "http://x/#connect-pid=5",
            Some("800x600"),
        );
        assert_eq!(
            argv,
            vec![
                "firefox",
                "--new-window",
                "--geometry=800x600",
                "http://x/#connect-pid=5"
            ]
        );
    }

    #[test]
    fn test_expand_appends_url() {
        assert_eq!(expand("chromium --app", "http://x/", None), vec!["chromium", "--app", "http://x/"]);
    }

    #[test]
    fn test_expand_drops_geometry_without_value() {
        assert_eq!(
            expand("browser --size %g %U", "http://x/", None),
            vec!["browser", "--size", "http://x/"]
        );
    }

    #[test]
    fn test_expand_embedded_url() {
        assert_eq!(expand("open-url=%U", "u", None), vec!["open-url=u"]);
    }
}
