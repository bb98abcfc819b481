//! Per-session readiness watcher for a pty master.
//!
//! Each session gets a small task that waits for its pty to become readable
//! and asks the driver to service it. The read itself happens on the driver,
//! which owns the session; the watcher only learns whether the pty was
//! drained (clear readiness) or may hold more (poll again). While the
//! session is paused the watcher sleeps on a `watch` flag instead of
//! polling.

use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use tether_mux::{ReadOutcome, SessionNumber};

use crate::driver::Event;

pub struct PtyWatcher {
    active: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PtyWatcher {
    /// Start watching `fd`. The descriptor is duplicated, so the session
    /// keeps ownership of its own copy.
    pub fn start(
        session: SessionNumber,
        fd: RawFd,
        events: mpsc::UnboundedSender<Event>,
    ) -> io::Result<Self> {
        // SAFETY: dup has no memory-safety preconditions; the result is
        // checked before it is wrapped.
        let dup = unsafe { libc::dup(fd) };
        if dup < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `dup` is a fresh descriptor owned by nobody else.
        let owned = unsafe { OwnedFd::from_raw_fd(dup) };
        let fd = AsyncFd::with_interest(owned, Interest::READABLE)?;

        let (active, active_rx) = watch::channel(true);
        let task = tokio::spawn(watch_loop(session, fd, active_rx, events));
        Ok(Self { active, task })
    }

    pub fn suspend(&self) {
        self.active.send_replace(false);
    }

    pub fn resume(&self) {
        self.active.send_replace(true);
    }
}

impl Drop for PtyWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn watch_loop(
    session: SessionNumber,
    fd: AsyncFd<OwnedFd>,
    mut active: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<Event>,
) {
    loop {
        if active.wait_for(|active| *active).await.is_err() {
            return;
        }

        let mut guard = tokio::select! {
            ready = fd.readable() => match ready {
                Ok(guard) => guard,
                Err(e) => {
                    log::error!("session {session}: pty poll: {e}");
                    return;
                }
            },
            changed = active.changed() => {
                if changed.is_err() {
                    return;
                }
                continue;
            }
        };

        let (reply, outcome) = oneshot::channel();
        if events.send(Event::PtyReadable { session, reply }).is_err() {
            return;
        }
        match outcome.await {
            Ok(ReadOutcome::WouldBlock) => guard.clear_ready(),
            // More may be waiting; a paused session parks on the flag above.
            Ok(ReadOutcome::Read(_) | ReadOutcome::Paused) => {}
            Ok(ReadOutcome::Closed) | Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn pipe() -> (OwnedFd, OwnedFd) {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        unsafe {
            (
                OwnedFd::from_raw_fd(fds[0]),
                OwnedFd::from_raw_fd(fds[1]),
            )
        }
    }

    fn write_byte(fd: &OwnedFd) {
        use std::os::fd::AsRawFd;
        let byte = [b'x'];
        assert_eq!(unsafe { libc::write(fd.as_raw_fd(), byte.as_ptr().cast(), 1) }, 1);
    }

    #[tokio::test]
    async fn test_readable_is_reported() {
        use std::os::fd::AsRawFd;
        let (read_end, write_end) = pipe();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = PtyWatcher::start(3, read_end.as_raw_fd(), tx).unwrap();

        write_byte(&write_end);
        let event = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        let Event::PtyReadable { session, reply } = event else {
            panic!("expected a readable event");
        };
        assert_eq!(session, 3);
        reply.send(ReadOutcome::Closed).unwrap();
    }

    #[tokio::test]
    async fn test_suspended_watcher_stays_quiet() {
        use std::os::fd::AsRawFd;
        let (read_end, write_end) = pipe();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = PtyWatcher::start(1, read_end.as_raw_fd(), tx).unwrap();
        watcher.suspend();
        tokio::task::yield_now().await;

        write_byte(&write_end);
        assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());

        watcher.resume();
        let event = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        let Event::PtyReadable { reply, .. } = event else {
            panic!("expected a readable event");
        };
        reply.send(ReadOutcome::Closed).unwrap();
    }

    #[tokio::test]
    async fn test_unread_data_is_reported_again() {
        use std::os::fd::AsRawFd;
        let (read_end, write_end) = pipe();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = PtyWatcher::start(2, read_end.as_raw_fd(), tx).unwrap();
        write_byte(&write_end);

        for _ in 0..2 {
            let event = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
            let Event::PtyReadable { reply, .. } = event else {
                panic!("expected a readable event");
            };
            reply.send(ReadOutcome::Read(0)).unwrap();
        }
    }
}
