//! tether-pty: pseudo-terminal processes for tether sessions.
//!
//! This crate owns everything that touches the child process directly:
//! allocating the pty, building the child's environment, resolving the
//! program and working directory, and later signalling and reaping it.
//!
//! # Architecture
//!
//! - [`PtyProcess`] — The operations a session needs from its process.
//! - [`PtyHandle`] — `portable-pty` backed implementation of `PtyProcess`.
//! - [`Spawner`] / [`NativeSpawner`] — Session-number aware process creation.
//! - [`env`] — Environment construction (`TERM`, `COLORTERM`, `DOMTERM`).
//! - [`resolve`] — Program lookup on `PATH` and working directory fallback.

pub mod env;
pub mod pty;
pub mod resolve;

pub use pty::{
    default_shell, CommandSpec, LineMode, NativeSpawner, PtyError, PtyHandle, PtyProcess, Spawner, TermSize,
};
