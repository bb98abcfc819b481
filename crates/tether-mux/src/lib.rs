//! tether-mux: sessions, connections and the flow-control core.
//!
//! Everything here is synchronous and owned by a single task. The reactor
//! feeds notifications in (connection established / closed, inbound bytes,
//! writable, pty readable) and drains the [`Action`]s the core queues in
//! response: bytes to send, readiness to suspend or resume, processes to
//! watch, windows to open.
//!
//! # Architecture
//!
//! - [`Multiplexer`] — Owns every session and connection; implements fan-out,
//!   backpressure, the event protocol handlers and the lifecycle rules.
//! - [`SessionRegistry`] — Ordered collection of live sessions with
//!   pid / name / `:number` lookup.
//! - [`Session`] — One pty process plus its attached connections, geometry
//!   and replay state.
//! - [`Connection`] — One browser stream: counters, outbound buffer, pending
//!   one-shot notifications.
//! - [`command`] — Requests arriving on the command socket.

pub mod action;
pub mod command;
pub mod config;
pub mod connection;
pub mod multiplexer;
pub mod registry;
pub mod session;

#[cfg(test)]
mod testing;

pub use action::{Action, ConnectionId, SessionNumber};
pub use command::{Command, CommandRequest, DisplayOptions, Placement};
pub use config::MuxConfig;
pub use connection::{Connection, ContentsRequest};
pub use multiplexer::{ConnectParams, Multiplexer, ReadOutcome, Rejection};
pub use registry::{SessionRegistry, SessionSummary};
pub use session::{Geometry, ReplayBuffer, Session};
