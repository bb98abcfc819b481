//! tether-proto: the byte-level protocol spoken between the server and a
//! browser-side terminal.
//!
//! Browser -> server traffic is raw keystroke data with control events
//! embedded behind a reserved sentinel byte. Server -> browser traffic is
//! pty output interleaved with control sequences framed by urgent /
//! out-of-band markers.
//!
//! # Architecture
//!
//! - [`count`] — 28-bit wrap-around byte counters used for flow control.
//! - [`Scanner`] — Incremental splitter of inbound bytes into literal chunks
//!   and raw events.
//! - [`ClientEvent`] — Typed, validated form of a raw event.
//! - [`outbound`] — Builders for every control sequence the server emits.

pub mod count;
pub mod event;
pub mod outbound;
pub mod scan;

pub use event::{ClientEvent, ProtocolError};
pub use scan::{RawEvent, Scanner, Token};
