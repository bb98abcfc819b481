use std::io::{self, Read, Write};
use std::os::fd::RawFd;
use std::path::PathBuf;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use crate::env;
use crate::resolve;

/// Errors from PTY operations.
#[derive(Debug)]
pub enum PtyError {
    SpawnFailed(String),
    NotExecutable(String),
    IoError(std::io::Error),
    ResizeFailed(String),
    SignalFailed { pid: u32, source: std::io::Error },
}

impl std::fmt::Display for PtyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PtyError::SpawnFailed(msg) => write!(f, "PTY spawn failed: {msg}"),
            PtyError::NotExecutable(program) => write!(f, "cannot execute '{program}'"),
            PtyError::IoError(err) => write!(f, "PTY I/O error: {err}"),
            PtyError::ResizeFailed(msg) => write!(f, "PTY resize failed: {msg}"),
            PtyError::SignalFailed { pid, source } => {
                write!(f, "failed to signal process {pid}: {source}")
            }
        }
    }
}

impl std::error::Error for PtyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PtyError::IoError(err) => Some(err),
            PtyError::SignalFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PtyError {
    fn from(err: std::io::Error) -> Self {
        PtyError::IoError(err)
    }
}

/// Terminal geometry in character cells and pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub rows: u16,
    pub cols: u16,
    pub pixel_width: u16,
    pub pixel_height: u16,
}

impl Default for TermSize {
    fn default() -> Self {
        Self {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

impl From<TermSize> for PtySize {
    fn from(size: TermSize) -> Self {
        PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: size.pixel_width,
            pixel_height: size.pixel_height,
        }
    }
}

/// The pty's line discipline settings relevant to key handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMode {
    pub canonical: bool,
    pub echo: bool,
    /// The configured interrupt character (normally ^C).
    pub interrupt: u8,
}

/// What to run in a new session.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            ..Self::default()
        }
    }

    fn search_path(&self) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == "PATH")
            .map(|(_, v)| v.as_str())
    }
}

/// Operations a session performs on its child process.
///
/// Implemented by [`PtyHandle`]; tests substitute scripted fakes.
pub trait PtyProcess: Send {
    /// Process id of the child.
    fn pid(&self) -> u32;

    /// Read pending output. The descriptor is non-blocking, so this returns
    /// `WouldBlock` when nothing is queued.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write input; anything short of a complete write is an error.
    fn write(&mut self, data: &[u8]) -> Result<(), PtyError>;

    fn resize(&self, size: TermSize) -> Result<(), PtyError>;

    /// Current line discipline, if it can be queried.
    fn line_mode(&self) -> Option<LineMode>;

    /// Bytes already queued for reading in the kernel.
    fn queued_output(&self) -> usize;

    fn signal(&self, signal: i32) -> Result<(), PtyError>;

    /// Block until the child exits, returning its exit code.
    fn wait(&mut self) -> Result<u32, PtyError>;

    /// Descriptor to register with the reactor for readability.
    fn raw_fd(&self) -> Option<RawFd>;
}

/// Creates session processes.
pub trait Spawner: Send {
    fn spawn(
        &mut self,
        spec: &CommandSpec,
        session_number: u32,
    ) -> Result<Box<dyn PtyProcess>, PtyError>;
}

/// Shell prologue run in the child: append the child's own pid to `DOMTERM`
/// and replace the shell with the requested program, keeping that pid.
const EXEC_PROLOGUE: &str = "DOMTERM=\"$DOMTERM;pid=$$\"; export DOMTERM; exec \"$@\"";

/// Owns a portable-pty child process, master pair, reader, and writer.
pub struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    pid: u32,
}

impl PtyHandle {
    /// Spawn `spec` on a new pty of the given size.
    ///
    /// The program must be executable (looked up on the spec's `PATH` when it
    /// has no `/`). The child gets the spec's environment with `TERM`,
    /// `COLORTERM` and `DOMTERM` overridden, and starts in the spec's
    /// directory, falling back to `$HOME` and then `/`.
    pub fn spawn(
        spec: &CommandSpec,
        session_number: u32,
        size: TermSize,
    ) -> Result<Self, PtyError> {
        let program = spec
            .argv
            .first()
            .ok_or_else(|| PtyError::SpawnFailed("empty command line".to_string()))?;
        if resolve::find_executable(program, spec.search_path()).is_none() {
            return Err(PtyError::NotExecutable(program.clone()));
        }

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(size.into())
            .map_err(|e| PtyError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let tty = pair.master.tty_name();
        let domterm = env::domterm_value(
            env!("CARGO_PKG_VERSION"),
            tty.as_deref().and_then(|p| p.to_str()),
            session_number,
        );

        let mut cmd = CommandBuilder::new("/bin/sh");
        cmd.args(["-c", EXEC_PROLOGUE, "tether"]);
        cmd.args(&spec.argv);
        cmd.env_clear();
        for (key, value) in env::build_environment(&spec.env, &domterm) {
            cmd.env(key, value);
        }
        cmd.cwd(resolve::working_dir(spec.cwd.as_deref()));

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(format!("failed to spawn command: {e}")))?;

        let pid = child
            .process_id()
            .ok_or_else(|| PtyError::SpawnFailed("child has no process id".to_string()))?;

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to clone reader: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to take writer: {e}")))?;

        // The reader is a dup of the master, so this covers both.
        if let Some(fd) = pair.master.as_raw_fd() {
            set_nonblocking(fd)?;
        }

        log::info!("started process, pid: {pid}");

        Ok(Self {
            master: pair.master,
            reader,
            writer,
            child,
            pid,
        })
    }
}

impl PtyProcess for PtyHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    fn resize(&self, size: TermSize) -> Result<(), PtyError> {
        self.master
            .resize(size.into())
            .map_err(|e| PtyError::ResizeFailed(format!("{e}")))
    }

    fn line_mode(&self) -> Option<LineMode> {
        let fd = self.master.as_raw_fd()?;
        // SAFETY: termios is plain old data and tcgetattr fully initializes
        // it on success.
        let mut termios: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut termios) } != 0 {
            return None;
        }
        Some(LineMode {
            canonical: termios.c_lflag & libc::ICANON != 0,
            echo: termios.c_lflag & libc::ECHO != 0,
            interrupt: termios.c_cc[libc::VINTR],
        })
    }

    fn queued_output(&self) -> usize {
        let Some(fd) = self.master.as_raw_fd() else {
            return 0;
        };
        let mut queued: libc::c_int = 0;
        // SAFETY: FIONREAD writes a single c_int through the pointer.
        if unsafe { libc::ioctl(fd, libc::FIONREAD, &mut queued) } != 0 {
            return 0;
        }
        usize::try_from(queued).unwrap_or(0)
    }

    fn signal(&self, signal: i32) -> Result<(), PtyError> {
        let pid = libc::pid_t::try_from(self.pid).map_err(|_| PtyError::SignalFailed {
            pid: self.pid,
            source: io::Error::from(io::ErrorKind::InvalidInput),
        })?;
        // SAFETY: kill has no memory-safety preconditions.
        if unsafe { libc::kill(pid, signal) } != 0 {
            return Err(PtyError::SignalFailed {
                pid: self.pid,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn wait(&mut self) -> Result<u32, PtyError> {
        let status = self.child.wait()?;
        Ok(status.exit_code())
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.master.as_raw_fd()
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own; no pointers involved.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 || unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Spawns real processes on native ptys.
#[derive(Debug, Clone, Default)]
pub struct NativeSpawner {
    pub initial_size: TermSize,
}

impl Spawner for NativeSpawner {
    fn spawn(
        &mut self,
        spec: &CommandSpec,
        session_number: u32,
    ) -> Result<Box<dyn PtyProcess>, PtyError> {
        let handle = PtyHandle::spawn(spec, session_number, self.initial_size)?;
        Ok(Box::new(handle))
    }
}

/// Returns the user's default shell, falling back to `/bin/sh`.
pub fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    fn base_env() -> Vec<(String, String)> {
        env::parse_entries(["PATH=/usr/bin:/bin", "TERM=dumb", "COLORTERM=none"])
    }

    /// Collect output until `done` matches, EOF, or a 3 second deadline.
    fn collect_output(handle: &mut PtyHandle, done: impl Fn(&str) -> bool) -> String {
        let mut output = Vec::new();
        let mut buf = [0u8; 4096];
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            match handle.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    output.extend_from_slice(&buf[..n]);
                    if done(&String::from_utf8_lossy(&output)) {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(20));
                }
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&output).into_owned()
    }

    fn spawn_sh(script: &str, session_number: u32) -> PtyHandle {
        let spec = CommandSpec {
            argv: vec!["/bin/sh".into(), "-c".into(), script.into()],
            cwd: None,
            env: base_env(),
        };
        PtyHandle::spawn(&spec, session_number, TermSize::default()).unwrap()
    }

    #[test]
    fn test_spawn_pty() {
        let handle = PtyHandle::spawn(
            &CommandSpec::new(vec!["/bin/sh".into()]),
            1,
            TermSize::default(),
        );
        assert!(handle.is_ok(), "Failed to spawn PTY: {:?}", handle.err());
        let handle = handle.unwrap();
        assert!(handle.pid() > 0);
        assert!(handle.raw_fd().is_some());
    }

    #[test]
    fn test_not_executable() {
        let spec = CommandSpec::new(vec!["no-such-program-xyz".into()]);
        let err = PtyHandle::spawn(&spec, 1, TermSize::default()).err().unwrap();
        assert!(matches!(err, PtyError::NotExecutable(ref p) if p == "no-such-program-xyz"));
        assert_eq!(err.to_string(), "cannot execute 'no-such-program-xyz'");
    }

    #[test]
    fn test_child_environment() {
        let mut handle = spawn_sh("env; echo ENV_DONE", 7);
        let pid = handle.pid();
        let text = collect_output(&mut handle, |t| t.contains("ENV_DONE"));

        let lines: Vec<&str> = text.lines().map(|l| l.trim_end_matches('\r')).collect();
        let with_prefix = |p: &str| lines.iter().filter(|l| l.starts_with(p)).count();

        assert_eq!(with_prefix("TERM="), 1, "output: {text}");
        assert!(lines.contains(&"TERM=xterm-256color"));
        assert_eq!(with_prefix("COLORTERM="), 1);
        assert!(lines.contains(&"COLORTERM=truecolor"));
        assert_eq!(with_prefix("DOMTERM="), 1);

        let domterm = lines.iter().find(|l| l.starts_with("DOMTERM=")).unwrap();
        assert!(
            domterm.ends_with(&format!(";session#=7;pid={pid}")),
            "unexpected DOMTERM: {domterm}"
        );
        assert!(domterm.contains(";tty=/dev/"));
    }

    #[test]
    fn test_working_directory() {
        let spec = CommandSpec {
            argv: vec!["/bin/sh".into(), "-c".into(), "pwd".into()],
            cwd: Some(PathBuf::from("/tmp")),
            env: base_env(),
        };
        let mut handle = PtyHandle::spawn(&spec, 1, TermSize::default()).unwrap();
        let text = collect_output(&mut handle, |t| t.contains("/tmp"));
        assert!(text.contains("/tmp"), "got: {text}");
    }

    #[test]
    fn test_write_read_echo() {
        let mut handle = spawn_sh("read line; echo \"got:$line\"", 1);
        handle.write(b"TETHER_TEST_OK\n").unwrap();
        let text = collect_output(&mut handle, |t| t.contains("got:TETHER_TEST_OK"));
        assert!(
            text.contains("got:TETHER_TEST_OK"),
            "Expected echoed line, got: {text}"
        );
    }

    #[test]
    fn test_line_mode_defaults() {
        let handle = spawn_sh("sleep 2", 1);
        let mode = handle.line_mode().expect("termios should be readable");
        assert!(mode.canonical);
        assert_eq!(mode.interrupt, 3);
    }

    #[test]
    fn test_resize() {
        let handle = spawn_sh("sleep 1", 1);
        let result = handle.resize(TermSize {
            rows: 40,
            cols: 120,
            pixel_width: 960,
            pixel_height: 640,
        });
        assert!(result.is_ok(), "Resize failed: {:?}", result.err());
    }

    #[test]
    fn test_signal_and_wait() {
        let mut handle = spawn_sh("sleep 30", 1);
        handle.signal(libc::SIGKILL).unwrap();
        let code = handle.wait().unwrap();
        assert_ne!(code, 0);
    }

    #[test]
    fn test_exit_code() {
        let mut handle = spawn_sh("exit 3", 1);
        let _ = collect_output(&mut handle, |_| false);
        assert_eq!(handle.wait().unwrap(), 3);
    }

    #[test]
    fn test_default_shell_detection() {
        let shell = default_shell();
        assert!(!shell.is_empty(), "Default shell should not be empty");
        assert!(
            shell.starts_with('/'),
            "Default shell should be an absolute path, got: {shell}"
        );
    }
}
