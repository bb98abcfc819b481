use std::time::Duration;

use tether_pty::CommandSpec;

/// Tunables for the multiplexer.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Pre-shared token every connection must present.
    pub server_key: String,
    /// Stop reading the pty once every viewer owes at least this many bytes.
    pub pause_threshold: u32,
    /// Resume reading once an acknowledgment brings a backlog below this.
    pub resume_threshold: u32,
    /// Capacity of each connection's outbound buffer.
    pub outbound_capacity: usize,
    /// Initial capacity of a session's replay capture buffer.
    pub preserved_capacity: usize,
    /// Longest incomplete event held back between messages. A longer one is
    /// dropped along with the rest of its line.
    pub max_event_len: usize,
    /// Delay between losing the last viewer and tearing the session down.
    pub teardown_grace: Duration,
    /// Signal sent to a session's process on teardown.
    pub close_signal: i32,
    /// Ignore all input from browsers.
    pub readonly: bool,
    /// Refuse a second concurrent connection.
    pub once: bool,
    /// Exit when no sessions and no connections remain.
    pub exit_when_idle: bool,
    /// Page that browsers load; fragments such as `connect-pid=` are appended.
    pub main_url: String,
    /// Command for sessions started implicitly by a connecting browser.
    pub default_command: CommandSpec,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            server_key: String::new(),
            pause_threshold: 2000,
            resume_threshold: 1000,
            outbound_capacity: 2048,
            preserved_capacity: 1024,
            max_event_len: 16 << 20,
            teardown_grace: Duration::from_secs(2),
            close_signal: libc::SIGHUP,
            readonly: false,
            once: false,
            exit_when_idle: true,
            main_url: String::new(),
            default_command: CommandSpec::new(vec![tether_pty::default_shell()]),
        }
    }
}
