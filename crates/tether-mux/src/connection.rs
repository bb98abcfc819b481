use tether_proto::count;

use crate::action::SessionNumber;

/// Progress of a window-contents capture on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentsRequest {
    #[default]
    None,
    /// Send the capture-start marker at the next writable opportunity.
    Requested,
    /// Output written to this connection is also kept for replay.
    Capturing,
}

/// Fixed-capacity queue of pty output awaiting a writable notification.
#[derive(Debug, Clone)]
pub struct OutboundBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl OutboundBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn used(&self) -> usize {
        self.data.len()
    }

    pub fn available(&self) -> usize {
        self.capacity - self.data.len()
    }

    /// Queue as much of `bytes` as fits; returns how much was queued.
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.available());
        self.data.extend_from_slice(&bytes[..n]);
        n
    }

    pub fn take(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.data, Vec::with_capacity(self.capacity))
    }
}

/// One browser viewer.
#[derive(Debug)]
pub struct Connection {
    pub(crate) sent_count: u32,
    pub(crate) confirmed_count: u32,
    /// Released once the termination marker has been sent.
    pub(crate) outbound: Option<OutboundBuffer>,
    /// Inbound bytes held back until the rest of an event arrives.
    pub(crate) inbound: Vec<u8>,
    /// Skipping the tail of an oversized event up to its line feed.
    pub(crate) discarding: bool,
    pub(crate) initialized: bool,
    pub(crate) contents: ContentsRequest,
    pub(crate) upload_settings_needed: bool,
    pub(crate) detach_save_send: bool,
    pub(crate) version_info: Option<String>,
    pub(crate) session: Option<SessionNumber>,
}

impl Connection {
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            sent_count: 0,
            confirmed_count: 0,
            outbound: Some(OutboundBuffer::new(outbound_capacity)),
            inbound: Vec::new(),
            discarding: false,
            initialized: false,
            contents: ContentsRequest::None,
            upload_settings_needed: true,
            detach_save_send: false,
            version_info: None,
            session: None,
        }
    }

    pub fn session(&self) -> Option<SessionNumber> {
        self.session
    }

    pub fn sent_count(&self) -> u32 {
        self.sent_count
    }

    pub fn version_info(&self) -> Option<&str> {
        self.version_info.as_deref()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn contents_request(&self) -> ContentsRequest {
        self.contents
    }

    /// Bytes written to the browser but not yet acknowledged.
    pub fn backlog(&self) -> u32 {
        count::backlog(self.sent_count, self.confirmed_count)
    }

    pub fn queued(&self) -> usize {
        self.outbound.as_ref().map_or(0, OutboundBuffer::used)
    }

    /// Worst-case unconfirmed debt: acknowledged backlog plus queued bytes.
    pub fn debt(&self) -> u64 {
        u64::from(self.backlog()) + self.queued() as u64
    }

    pub fn available(&self) -> usize {
        self.outbound.as_ref().map_or(0, OutboundBuffer::available)
    }

    /// Account for bytes handed to the transport.
    pub(crate) fn record_sent(&mut self, n: usize) {
        self.sent_count = count::advance(self.sent_count, n);
    }
}
