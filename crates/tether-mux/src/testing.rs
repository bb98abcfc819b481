//! Scripted stand-ins for pty processes used by the unit tests.

use std::collections::VecDeque;
use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tether_pty::{CommandSpec, LineMode, PtyError, PtyProcess, Spawner, TermSize};

use crate::action::{Action, ConnectionId};
use crate::config::MuxConfig;
use crate::multiplexer::{ConnectParams, Multiplexer};

pub const TEST_KEY: &str = "test-key";

#[derive(Debug, Default)]
pub struct FakeState {
    /// Output the "process" has produced and not yet been read.
    pub pending: VecDeque<u8>,
    pub eof: bool,
    /// Everything written to the pty.
    pub input: Vec<u8>,
    pub line_mode: Option<LineMode>,
    pub size: Option<TermSize>,
    pub signals: Vec<i32>,
    pub waited: bool,
    pub fail_writes: bool,
}

impl FakeState {
    pub fn produce(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes.iter().copied());
    }
}

pub type Shared = Arc<Mutex<FakeState>>;

pub struct FakePty {
    pid: u32,
    state: Shared,
}

impl FakePty {
    pub fn new(pid: u32) -> (Self, Shared) {
        let state = Shared::default();
        (
            Self {
                pid,
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl PtyProcess for FakePty {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.pending.is_empty() {
            if state.eof {
                return Ok(0);
            }
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(state.pending.len());
        for (slot, byte) in buf.iter_mut().zip(state.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(PtyError::IoError(io::ErrorKind::BrokenPipe.into()));
        }
        state.input.extend_from_slice(data);
        Ok(())
    }

    fn resize(&self, size: TermSize) -> Result<(), PtyError> {
        self.state.lock().unwrap().size = Some(size);
        Ok(())
    }

    fn line_mode(&self) -> Option<LineMode> {
        self.state.lock().unwrap().line_mode
    }

    fn queued_output(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    fn signal(&self, signal: i32) -> Result<(), PtyError> {
        self.state.lock().unwrap().signals.push(signal);
        Ok(())
    }

    fn wait(&mut self) -> Result<u32, PtyError> {
        self.state.lock().unwrap().waited = true;
        Ok(0)
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(1000 + self.pid as RawFd)
    }
}

/// Hands out [`FakePty`]s with pids 100, 200, 300, ...
#[derive(Clone, Default)]
pub struct FakeSpawner {
    pub spawned: Arc<Mutex<Vec<(CommandSpec, u32, Shared)>>>,
    /// Make every spawn fail.
    pub fail: Arc<AtomicBool>,
}

impl FakeSpawner {
    pub fn state(&self, index: usize) -> Shared {
        Arc::clone(&self.spawned.lock().unwrap()[index].2)
    }
}

impl Spawner for FakeSpawner {
    fn spawn(
        &mut self,
        spec: &CommandSpec,
        session_number: u32,
    ) -> Result<Box<dyn PtyProcess>, PtyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PtyError::SpawnFailed("forkpty: out of ptys".to_string()));
        }
        let mut spawned = self.spawned.lock().unwrap();
        let pid = 100 * (spawned.len() as u32 + 1);
        let (pty, state) = FakePty::new(pid);
        spawned.push((spec.clone(), session_number, state));
        Ok(Box::new(pty))
    }
}

pub fn test_config() -> MuxConfig {
    MuxConfig {
        server_key: TEST_KEY.to_string(),
        main_url: "http://localhost:7000/".to_string(),
        default_command: CommandSpec::new(vec!["/bin/sh".to_string()]),
        ..MuxConfig::default()
    }
}

pub fn fake_mux(config: MuxConfig) -> (Multiplexer, FakeSpawner) {
    let spawner = FakeSpawner::default();
    let mux = Multiplexer::new(config, Box::new(spawner.clone()));
    (mux, spawner)
}

pub fn connect(mux: &mut Multiplexer, pid: Option<u32>) -> ConnectionId {
    mux.connection_established(&ConnectParams {
        server_key: Some(TEST_KEY.to_string()),
        connect_pid: pid.map(|p| p.to_string()),
    })
    .unwrap()
}

/// An inbound event line as a browser would send it.
pub fn event(name: &str, data: &str) -> Vec<u8> {
    let mut bytes = vec![0x92];
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(b' ');
    bytes.extend_from_slice(data.as_bytes());
    bytes.push(b'\n');
    bytes
}

/// Everything sent to `id`, concatenated in order.
pub fn sent_to(actions: &[Action], id: ConnectionId) -> Vec<u8> {
    let mut out = Vec::new();
    for action in actions {
        if let Action::Send { connection, data } = action {
            if *connection == id {
                out.extend_from_slice(data);
            }
        }
    }
    out
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
