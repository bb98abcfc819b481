use tether_proto::event::WindowSize;
use tether_pty::{PtyProcess, TermSize};

use crate::action::{ConnectionId, SessionNumber};

/// Terminal geometry as last reported by a viewer; `-1` until the first
/// resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub rows: i32,
    pub cols: i32,
    pub pixel_width: f32,
    pub pixel_height: f32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            rows: -1,
            cols: -1,
            pixel_width: -1.0,
            pixel_height: -1.0,
        }
    }
}

impl Geometry {
    pub fn is_set(&self) -> bool {
        self.rows >= 0 && self.cols >= 0
    }

    /// The size to push to the pty. Out-of-range values saturate.
    pub fn term_size(&self) -> TermSize {
        fn clamp(v: i32) -> u16 {
            v.clamp(0, i32::from(u16::MAX)) as u16
        }
        TermSize {
            rows: clamp(self.rows),
            cols: clamp(self.cols),
            pixel_width: clamp(self.pixel_width as i32),
            pixel_height: clamp(self.pixel_height as i32),
        }
    }
}

impl From<WindowSize> for Geometry {
    fn from(ws: WindowSize) -> Self {
        Self {
            rows: ws.rows,
            cols: ws.cols,
            pixel_width: ws.pixel_width,
            pixel_height: ws.pixel_height,
        }
    }
}

/// Output captured while a viewer snapshots its window, replayed to the next
/// viewer that attaches.
///
/// `[start, len)` is the replay window. Growth is by half again the current
/// capacity, or to the exact size needed when that is larger.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    bytes: Vec<u8>,
    start: usize,
}

impl ReplayBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            start: 0,
        }
    }

    pub fn append(&mut self, data: &[u8]) {
        let needed = self.bytes.len() + data.len();
        let capacity = self.bytes.capacity();
        if needed > capacity {
            let target = ((3 * capacity) >> 1).max(needed);
            self.bytes.reserve_exact(target - self.bytes.len());
        }
        self.bytes.extend_from_slice(data);
    }

    /// Move the start of the window forward, never past the end.
    pub fn advance_start(&mut self, delta: usize) {
        self.start = self.start.saturating_add(delta).min(self.bytes.len());
    }

    pub fn window(&self) -> &[u8] {
        &self.bytes[self.start..]
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.bytes.len()
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }
}

/// A running process on a pty and the viewers attached to it.
pub struct Session {
    number: SessionNumber,
    pid: u32,
    pub(crate) process: Option<Box<dyn PtyProcess>>,
    pub(crate) name: Option<String>,
    pub(crate) geometry: Geometry,
    /// Attached connections in attach order.
    pub(crate) attached: Vec<ConnectionId>,
    pub(crate) detached: bool,
    pub(crate) detach_on_close: bool,
    pub(crate) paused: bool,
    /// Bumped whenever the viewer set changes; a teardown timer only acts
    /// on the generation it was armed with.
    pub(crate) teardown_generation: u64,
    pub(crate) saved_window_contents: Option<String>,
    pub(crate) preserved: Option<ReplayBuffer>,
    pub(crate) preserved_sent_count: u32,
}

impl Session {
    pub fn new(number: SessionNumber, process: Box<dyn PtyProcess>) -> Self {
        Self {
            number,
            pid: process.pid(),
            process: Some(process),
            name: None,
            geometry: Geometry::default(),
            attached: Vec::new(),
            detached: false,
            detach_on_close: false,
            paused: false,
            teardown_generation: 0,
            saved_window_contents: None,
            preserved: None,
            preserved_sent_count: 0,
        }
    }

    pub fn number(&self) -> SessionNumber {
        self.number
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn attached(&self) -> &[ConnectionId] {
        &self.attached
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn detach_on_close(&self) -> bool {
        self.detach_on_close
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn saved_window_contents(&self) -> Option<&str> {
        self.saved_window_contents.as_deref()
    }

    pub fn preserved(&self) -> Option<&ReplayBuffer> {
        self.preserved.as_ref()
    }

    /// Record a new geometry and push it to the pty.
    pub(crate) fn resize(&mut self, geometry: Geometry) {
        self.geometry = geometry;
        if let Some(process) = &self.process {
            if let Err(e) = process.resize(geometry.term_size()) {
                log::error!("session {}: {e}", self.number);
            }
        }
    }

    /// Remove a connection from the attached list, keeping the order of the
    /// rest. Returns whether it was attached.
    pub(crate) fn unlink(&mut self, id: ConnectionId) -> bool {
        match self.attached.iter().position(|&c| c == id) {
            Some(index) => {
                self.attached.remove(index);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("number", &self.number)
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("attached", &self.attached)
            .field("detached", &self.detached)
            .field("paused", &self.paused)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePty;

    #[test]
    fn test_replay_growth_keeps_bytes() {
        let mut buf = ReplayBuffer::with_capacity(4);
        buf.append(b"abc");
        buf.append(b"de");
        assert!(buf.capacity() >= 6);
        buf.append(&[b'x'; 100]);
        assert!(buf.capacity() >= 105);
        assert_eq!(&buf.window()[..5], b"abcde");
        assert_eq!(buf.end(), 105);
    }

    #[test]
    fn test_replay_grows_by_half() {
        let mut buf = ReplayBuffer::with_capacity(1024);
        let cap = buf.capacity();
        buf.append(&vec![0u8; cap]);
        buf.append(b"z");
        assert!(buf.capacity() >= cap + cap / 2);
    }

    #[test]
    fn test_replay_start_clamped() {
        let mut buf = ReplayBuffer::with_capacity(16);
        buf.append(b"0123456789");
        buf.advance_start(4);
        assert_eq!(buf.window(), b"456789");
        buf.advance_start(1000);
        assert_eq!(buf.start(), buf.end());
        assert!(buf.window().is_empty());
    }

    #[test]
    fn test_geometry_unset_by_default() {
        let geometry = Geometry::default();
        assert!(!geometry.is_set());
        assert_eq!(geometry.rows, -1);
    }

    #[test]
    fn test_resize_reaches_pty() {
        let (pty, state) = FakePty::new(42);
        let mut session = Session::new(1, Box::new(pty));
        session.resize(Geometry {
            rows: 30,
            cols: 100,
            pixel_width: 800.0,
            pixel_height: 600.5,
        });
        let size = state.lock().unwrap().size.unwrap();
        assert_eq!((size.rows, size.cols), (30, 100));
        assert_eq!((size.pixel_width, size.pixel_height), (800, 600));
    }

    #[test]
    fn test_unlink_preserves_order() {
        let (pty, _) = FakePty::new(1);
        let mut session = Session::new(1, Box::new(pty));
        session.attached = vec![ConnectionId(1), ConnectionId(2), ConnectionId(3)];
        assert!(session.unlink(ConnectionId(2)));
        assert!(!session.unlink(ConnectionId(2)));
        assert_eq!(session.attached(), &[ConnectionId(1), ConnectionId(3)]);
    }
}
