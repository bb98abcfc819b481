use std::fmt;
use std::os::fd::RawFd;
use std::time::Duration;

/// Sequence number of a session; assigned once and never reused.
pub type SessionNumber = u32;

/// Stable handle for a browser connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Work the core asks the reactor to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write bytes to a connection, in order.
    Send { connection: ConnectionId, data: Vec<u8> },
    /// Deliver a writable notification to the connection.
    RequestWritable(ConnectionId),
    /// Stop delivering readable notifications for the session's pty.
    SuspendReadable(SessionNumber),
    ResumeReadable(SessionNumber),
    /// Start watching a newly spawned session's pty descriptor.
    WatchPty { session: SessionNumber, fd: RawFd },
    /// The session is gone; stop watching its pty.
    ReleasePty(SessionNumber),
    /// Call `teardown_due` with `generation` once `after` has elapsed.
    /// A later attach or departure supersedes the timer.
    ScheduleTeardown {
        session: SessionNumber,
        generation: u64,
        after: Duration,
    },
    /// Open a browser window at `url`.
    OpenWindow {
        url: String,
        geometry: Option<String>,
    },
    /// Open a link with the default handler.
    OpenLink(String),
    /// Nothing is left to serve; shut the server down.
    Exit,
}
