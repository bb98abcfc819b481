//! Builds the multiplexer configuration from command-line flags, stored
//! settings and built-in defaults, in that order of priority.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use rusqlite::Connection;
use tether_db::settings;
use tether_mux::MuxConfig;
use tether_pty::{default_shell, resolve, CommandSpec};

use crate::cli::ServeArgs;

/// `~/.tether`, holding the settings database and the command socket.
pub fn tether_home() -> anyhow::Result<PathBuf> {
    let home = resolve::home_dir().context("could not determine home directory")?;
    Ok(home.join(".tether"))
}

pub fn default_db_path() -> anyhow::Result<PathBuf> {
    Ok(tether_home()?.join("tether.db"))
}

pub fn default_socket_path() -> anyhow::Result<PathBuf> {
    Ok(tether_home()?.join("tether.socket"))
}

/// Read a setting, logging and ignoring database errors and unparsable values.
fn read_setting<T: std::str::FromStr>(conn: &Connection, key: &str) -> Option<T> {
    match settings::get_parsed(conn, key) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("reading setting {key}: {e}");
            None
        }
    }
}

/// Program run for sessions started without an explicit command.
fn default_argv(conn: &Connection, args: &ServeArgs) -> Vec<String> {
    if !args.command.is_empty() {
        return args.command.clone();
    }
    let configured = read_setting::<String>(conn, settings::COMMAND)
        .map(|cmd| cmd.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .filter(|argv| !argv.is_empty());
    configured.unwrap_or_else(|| vec![default_shell()])
}

pub fn mux_config(conn: &Connection, args: &ServeArgs, server_key: String, port: u16) -> MuxConfig {
    let defaults = MuxConfig::default();

    let pause_threshold =
        read_setting(conn, settings::PAUSE_THRESHOLD).unwrap_or(defaults.pause_threshold);
    let mut resume_threshold =
        read_setting(conn, settings::RESUME_THRESHOLD).unwrap_or(defaults.resume_threshold);
    if resume_threshold > pause_threshold {
        log::warn!(
            "{} ({resume_threshold}) exceeds {} ({pause_threshold}), using {pause_threshold}",
            settings::RESUME_THRESHOLD,
            settings::PAUSE_THRESHOLD,
        );
        resume_threshold = pause_threshold;
    }
    let teardown_grace = read_setting::<u64>(conn, settings::TEARDOWN_GRACE_MS)
        .map(Duration::from_millis)
        .unwrap_or(defaults.teardown_grace);

    let default_command = CommandSpec {
        argv: default_argv(conn, args),
        cwd: std::env::current_dir().ok(),
        env: std::env::vars().collect(),
    };

    MuxConfig {
        main_url: format!("http://127.0.0.1:{port}/?server-key={server_key}"),
        server_key,
        pause_threshold,
        resume_threshold,
        teardown_grace,
        close_signal: args.signal,
        readonly: args.readonly,
        once: args.once,
        exit_when_idle: !args.no_exit_when_idle,
        default_command,
        ..defaults
    }
}
