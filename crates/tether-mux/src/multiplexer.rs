use std::collections::HashMap;
use std::io;

use tether_proto::outbound;
use tether_proto::{count, ClientEvent, RawEvent, Scanner, Token};
use tether_pty::{env, resolve, CommandSpec, PtyError, Spawner};

use crate::action::{Action, ConnectionId, SessionNumber};
use crate::command::{Command, CommandRequest, DisplayOptions, Placement};
use crate::config::MuxConfig;
use crate::connection::{Connection, ContentsRequest, OutboundBuffer};
use crate::registry::SessionRegistry;
use crate::session::{ReplayBuffer, Session};

/// Parameters from a connection's handshake URL.
#[derive(Debug, Clone, Default)]
pub struct ConnectParams {
    /// Value of `server-key=`.
    pub server_key: Option<String>,
    /// Value of `connect-pid=`: attach to the session with this pid.
    pub connect_pid: Option<String>,
}

/// Why a connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    BadServerKey,
    /// The server only serves a single connection.
    Once,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::BadServerKey => write!(f, "missing or non-matching server-key"),
            Rejection::Once => write!(f, "refusing new client due to the once option"),
        }
    }
}

impl std::error::Error for Rejection {}

/// Result of servicing a readable pty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Bytes were read and queued for every attached connection. The pty may
    /// have more.
    Read(usize),
    /// Nothing to read right now.
    WouldBlock,
    /// Reading is suspended until a viewer catches up.
    Paused,
    /// The session has ended.
    Closed,
}

/// Owns all sessions and connections and implements the protocol between
/// them.
///
/// The multiplexer never performs I/O on connections itself: it queues
/// [`Action`]s which the reactor drains with [`Multiplexer::take_actions`]
/// after every notification.
pub struct Multiplexer {
    config: MuxConfig,
    spawner: Box<dyn Spawner>,
    sessions: SessionRegistry,
    connections: HashMap<ConnectionId, Connection>,
    connections_made: u64,
    focused: Option<ConnectionId>,
    settings_json: Option<String>,
    actions: Vec<Action>,
}

impl Multiplexer {
    pub fn new(config: MuxConfig, spawner: Box<dyn Spawner>) -> Self {
        Self {
            config,
            spawner,
            sessions: SessionRegistry::new(),
            connections: HashMap::new(),
            connections_made: 0,
            focused: None,
            settings_json: None,
            actions: Vec::new(),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn focused(&self) -> Option<ConnectionId> {
        self.focused
    }

    /// Drain the actions queued since the last call.
    pub fn take_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }

    fn session_of(&self, id: ConnectionId) -> Option<SessionNumber> {
        self.connections.get(&id).and_then(Connection::session)
    }

    // -- Sessions -----------------------------------------------------------

    /// Start a process and register it as a new session with no viewers.
    pub fn spawn_session(&mut self, spec: &CommandSpec) -> Result<SessionNumber, PtyError> {
        let number = self.sessions.next_number();
        let process = self.spawner.spawn(spec, number)?;
        let fd = process.raw_fd();
        log::info!("session {number} started, pid: {}", process.pid());
        self.sessions.insert(Session::new(number, process));
        if let Some(fd) = fd {
            self.actions.push(Action::WatchPty { session: number, fd });
        }
        Ok(number)
    }

    /// Attach a connection to a session.
    ///
    /// When this makes two viewers, both are told they need not save their
    /// state on detach. A detached or paused session is revived.
    pub fn attach(&mut self, id: ConnectionId, number: SessionNumber) {
        if self.session_of(id).is_some() || !self.connections.contains_key(&id) {
            return;
        }
        let Some(session) = self.sessions.get_mut(number) else {
            return;
        };

        let prior_only = match session.attached.as_slice() {
            [only] => Some(*only),
            _ => None,
        };
        let notify_new =
            prior_only.is_some() || (session.attached.is_empty() && session.detach_on_close);

        session.attached.push(id);
        session.teardown_generation += 1;
        if session.detached {
            session.detach_on_close = false;
        }
        session.detached = false;
        if std::mem::replace(&mut session.paused, false) {
            self.actions.push(Action::ResumeReadable(number));
        }

        if let Some(conn) = self.connections.get_mut(&id) {
            conn.session = Some(number);
            conn.detach_save_send |= notify_new;
        }
        if let Some(only) = prior_only {
            if let Some(other) = self.connections.get_mut(&only) {
                other.detach_save_send = true;
            }
            self.actions.push(Action::RequestWritable(only));
        }
        self.focused = Some(id);
        self.actions.push(Action::RequestWritable(id));
    }

    /// Remove a connection from its session's viewers and apply the
    /// last-viewer policy.
    fn detach(&mut self, id: ConnectionId, number: SessionNumber, was_capturing: bool) {
        let Some(session) = self.sessions.get_mut(number) else {
            return;
        };
        if !session.unlink(id) {
            return;
        }

        if was_capturing && session.saved_window_contents.is_none() {
            // The snapshot this capture was for will never arrive.
            session.preserved = None;
            for &other in &session.attached {
                self.actions.push(Action::RequestWritable(other));
            }
        }

        match session.attached.as_slice() {
            [] if session.detach_on_close => {
                session.detached = true;
                log::info!("session {number} detached");
            }
            [] => {
                session.teardown_generation += 1;
                self.actions.push(Action::ScheduleTeardown {
                    session: number,
                    generation: session.teardown_generation,
                    after: self.config.teardown_grace,
                });
            }
            [only] => {
                let only = *only;
                if let Some(conn) = self.connections.get_mut(&only) {
                    conn.detach_save_send = true;
                }
                self.actions.push(Action::RequestWritable(only));
            }
            _ => {}
        }
    }

    /// Grace period after losing the last viewer has elapsed. Timers armed
    /// before the most recent attach or departure are ignored.
    pub fn teardown_due(&mut self, number: SessionNumber, generation: u64) {
        let Some(session) = self.sessions.get(number) else {
            return;
        };
        if session.teardown_generation != generation
            || !session.attached.is_empty()
            || session.detached
        {
            log::debug!("teardown of session {number} cancelled");
            return;
        }
        self.destroy(number);
    }

    /// The session's pty reported end of file.
    pub fn pty_closed(&mut self, number: SessionNumber) {
        log::info!("session {number} pty closed");
        self.destroy(number);
    }

    /// Signal and reap the session's process, then forget the session.
    /// Attached connections are sent the termination marker on their next
    /// writable notification.
    pub fn destroy(&mut self, number: SessionNumber) {
        let Some(mut session) = self.sessions.remove(number) else {
            return;
        };
        for &id in &session.attached {
            if let Some(conn) = self.connections.get_mut(&id) {
                conn.session = None;
            }
            self.actions.push(Action::RequestWritable(id));
        }

        let pid = session.pid();
        if let Some(mut process) = session.process.take() {
            let signal = self.config.close_signal;
            log::info!("sending signal {signal} to process {pid}");
            if let Err(e) = process.signal(signal) {
                log::error!("{e}");
            }
            match process.wait() {
                Ok(code) => log::info!("process exited with code {code}, pid: {pid}"),
                Err(e) => log::error!("waiting for process {pid}: {e}"),
            }
        }

        self.actions.push(Action::ReleasePty(number));
        self.maybe_exit();
    }

    fn maybe_exit(&mut self) {
        if self.config.exit_when_idle && self.sessions.is_empty() && self.connections.is_empty() {
            log::info!("no sessions or connections left, exiting");
            self.actions.push(Action::Exit);
        }
    }

    // -- Connections --------------------------------------------------------

    /// A browser connected. Validates the handshake and, with
    /// `connect-pid`, attaches it to that session.
    pub fn connection_established(
        &mut self,
        params: &ConnectParams,
    ) -> Result<ConnectionId, Rejection> {
        if self.config.once && !self.connections.is_empty() {
            log::info!("{}", Rejection::Once);
            return Err(Rejection::Once);
        }
        if params.server_key.as_deref() != Some(self.config.server_key.as_str()) {
            log::warn!("{}", Rejection::BadServerKey);
            return Err(Rejection::BadServerKey);
        }

        self.connections_made += 1;
        let id = ConnectionId(self.connections_made);
        self.connections
            .insert(id, Connection::new(self.config.outbound_capacity));

        let connect_pid = params
            .connect_pid
            .as_deref()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|&pid| pid != 0);
        if let Some(pid) = connect_pid {
            match self.sessions.by_pid(pid).map(Session::number) {
                Some(number) => self.attach(id, number),
                None => log::warn!("client {id}: no session with pid {pid}"),
            }
        }

        log::info!("client {id} connected, total: {}", self.connections.len());
        Ok(id)
    }

    /// A browser went away. Idempotent.
    pub fn connection_closed(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.remove(&id) else {
            return;
        };
        if self.focused == Some(id) {
            self.focused = None;
        }
        if let Some(number) = conn.session {
            let was_capturing = conn.contents != ContentsRequest::None;
            self.detach(id, number, was_capturing);
        }
        log::info!("client {id} disconnected, total: {}", self.connections.len());
        self.maybe_exit();
    }

    /// Hand bytes to the transport, keeping the flow-control count and any
    /// replay capture in step.
    fn write_to_browser(&mut self, id: ConnectionId, data: Vec<u8>) {
        if data.is_empty() {
            return;
        }
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        conn.record_sent(data.len());
        if conn.contents == ContentsRequest::Capturing {
            let preserved = conn
                .session
                .and_then(|number| self.sessions.get_mut(number))
                .and_then(|session| session.preserved.as_mut());
            if let Some(preserved) = preserved {
                preserved.append(&data);
            }
        }
        self.actions.push(Action::Send {
            connection: id,
            data,
        });
    }

    /// The connection can take more data. Pending one-shot notifications go
    /// out first, then queued output.
    pub fn writable(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.get(&id) else {
            return;
        };
        let number = conn.session;

        if let Some(number) = number.filter(|_| !conn.initialized) {
            if let Some(greeting) = self.take_greeting(number) {
                for chunk in greeting {
                    self.write_to_browser(id, chunk);
                }
                if let Some(conn) = self.connections.get_mut(&id) {
                    conn.initialized = true;
                }
            }
        }

        let upload = self
            .connections
            .get_mut(&id)
            .is_some_and(|c| std::mem::take(&mut c.upload_settings_needed));
        if upload {
            if let Some(message) = self.settings_json.as_deref().map(outbound::settings) {
                self.write_to_browser(id, message);
            }
        }

        let detach_save = self
            .connections
            .get_mut(&id)
            .is_some_and(|c| std::mem::take(&mut c.detach_save_send));
        if detach_save {
            if let Some(session) = number.and_then(|n| self.sessions.get(n)) {
                let code = if session.attached.len() >= 2 {
                    0
                } else if session.detach_on_close {
                    2
                } else {
                    1
                };
                self.write_to_browser(id, outbound::detach_save(code));
            }
        }

        let queued = self
            .connections
            .get_mut(&id)
            .and_then(|c| c.outbound.as_mut())
            .map(OutboundBuffer::take)
            .unwrap_or_default();
        self.write_to_browser(id, queued);

        if let Some(number) = number {
            let requested = self
                .connections
                .get(&id)
                .is_some_and(|c| c.contents == ContentsRequest::Requested);
            if requested {
                self.begin_capture(id, number);
            }
        } else {
            let released = self
                .connections
                .get_mut(&id)
                .is_some_and(|c| c.outbound.take().is_some());
            if released {
                self.write_to_browser(id, outbound::EOF_MESSAGE.to_vec());
            }
        }
    }

    /// Banner for a connection's first writable notification, with any saved
    /// window contents and captured output replayed after it. `None` while a
    /// capture is still waiting for its snapshot.
    fn take_greeting(&mut self, number: SessionNumber) -> Option<Vec<Vec<u8>>> {
        let session = self.sessions.get_mut(number)?;
        if session.preserved.is_some() && session.saved_window_contents.is_none() {
            return None;
        }
        let banner = outbound::banner(number, session.pid());
        let mut chunks = vec![banner.clone()];
        if let Some(saved) = session.saved_window_contents.take() {
            chunks.push(outbound::saved_contents(&saved));
            if let Some(preserved) = session.preserved.take() {
                chunks.push(preserved.window().to_vec());
                chunks.push(banner);
            }
        }
        Some(chunks)
    }

    fn begin_capture(&mut self, id: ConnectionId, number: SessionNumber) {
        self.write_to_browser(id, outbound::REQUEST_CONTENTS.to_vec());
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        conn.contents = ContentsRequest::Capturing;
        let sent = conn.sent_count;
        if let Some(session) = self.sessions.get_mut(number) {
            if session.preserved.is_none() {
                session.preserved = Some(ReplayBuffer::with_capacity(
                    self.config.preserved_capacity,
                ));
            }
            session.preserved_sent_count = sent;
        }
    }

    // -- Pty output ---------------------------------------------------------

    /// The session's pty is readable: decide whether to read, and fan what is
    /// read out to every attached connection.
    pub fn pty_readable(&mut self, number: SessionNumber) -> ReadOutcome {
        let Some(session) = self.sessions.get_mut(number) else {
            return ReadOutcome::Closed;
        };

        let mut min_debt = u64::MAX;
        let mut avail = usize::MAX;
        for id in &session.attached {
            if let Some(conn) = self.connections.get(id) {
                min_debt = min_debt.min(conn.debt());
                avail = avail.min(conn.available());
            }
        }

        if min_debt >= u64::from(self.config.pause_threshold)
            || avail < outbound::EOF_MESSAGE.len()
            || session.paused
        {
            if !session.paused {
                session.paused = true;
                log::debug!("session {number} paused");
                self.actions.push(Action::SuspendReadable(number));
            }
            return ReadOutcome::Paused;
        }

        let Some(process) = session.process.as_mut() else {
            return ReadOutcome::Closed;
        };
        let mut buf = vec![0u8; avail];
        let n = match process.read(&mut buf) {
            Ok(0) => 0,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ReadOutcome::WouldBlock,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return ReadOutcome::Read(0),
            Err(e) => {
                log::debug!("session {number}: pty read: {e}");
                0
            }
        };
        if n == 0 {
            self.pty_closed(number);
            return ReadOutcome::Closed;
        }

        for &id in &session.attached {
            if let Some(out) = self.connections.get_mut(&id).and_then(|c| c.outbound.as_mut()) {
                out.push(&buf[..n]);
            }
            self.actions.push(Action::RequestWritable(id));
        }
        ReadOutcome::Read(n)
    }

    // -- Browser input ------------------------------------------------------

    /// Bytes arrived from a browser. Literal bytes go to the pty; embedded
    /// events are dispatched. An incomplete trailing event is kept for the
    /// next call.
    ///
    /// A failed pty write is returned; the caller should drop the connection.
    pub fn receive(&mut self, id: ConnectionId, bytes: &[u8]) -> Result<(), PtyError> {
        if self.config.readonly {
            return Ok(());
        }
        let Some(conn) = self.connections.get_mut(&id) else {
            return Ok(());
        };
        let mut bytes = bytes;
        if conn.discarding {
            match bytes.iter().position(|&b| b == b'\n') {
                Some(eol) => {
                    conn.discarding = false;
                    bytes = &bytes[eol + 1..];
                }
                None => return Ok(()),
            }
        }
        let mut buf = std::mem::take(&mut conn.inbound);
        buf.extend_from_slice(bytes);

        let mut scanner = Scanner::new(&buf);
        let mut result = Ok(());
        for token in scanner.by_ref() {
            match token {
                Token::Literal(data) => {
                    if let Err(e) = self.write_input(id, data) {
                        result = Err(e);
                        break;
                    }
                }
                Token::Event(raw) => self.dispatch(id, &raw),
            }
        }
        let consumed = scanner.consumed();

        buf.drain(..consumed);
        let limit = self.config.max_event_len;
        if let Some(conn) = self.connections.get_mut(&id) {
            if buf.len() > limit {
                log::debug!("client {id}: dropping event longer than {limit} bytes");
                buf.clear();
                conn.discarding = true;
            }
            conn.inbound = buf;
        }
        result
    }

    fn write_input(&mut self, id: ConnectionId, data: &[u8]) -> Result<(), PtyError> {
        let process = self
            .session_of(id)
            .and_then(|number| self.sessions.get_mut(number))
            .and_then(|session| session.process.as_mut());
        let Some(process) = process else {
            log::debug!("client {id}: dropping {} bytes of input, no session", data.len());
            return Ok(());
        };
        process.write(data).map_err(|e| {
            log::error!("client {id}: write input to pty: {e}");
            e
        })
    }

    fn dispatch(&mut self, id: ConnectionId, raw: &RawEvent<'_>) {
        let event = match ClientEvent::parse(raw) {
            Ok(event) => event,
            Err(e) => {
                log::debug!("client {id}: dropping event: {e}");
                return;
            }
        };

        match event {
            ClientEvent::WindowSize(size) => {
                if let Some(session) = self.session_of(id).and_then(|n| self.sessions.get_mut(n)) {
                    session.resize(size.into());
                }
            }
            ClientEvent::Version(info) => self.handle_version(id, info),
            ClientEvent::Received(confirmed) => self.handle_received(id, confirmed),
            ClientEvent::Key { raw, text } => self.handle_key(id, &raw, &text),
            ClientEvent::SessionName(name) => {
                if let Some(session) = self.session_of(id).and_then(|n| self.sessions.get_mut(n)) {
                    session.name = Some(name);
                }
            }
            ClientEvent::OpenWindow { geometry, fragment } => {
                let url = format!("{}#{}", self.config.main_url, fragment);
                self.actions.push(Action::OpenWindow { url, geometry });
            }
            ClientEvent::Detach => {
                if let Some(session) = self.session_of(id).and_then(|n| self.sessions.get_mut(n)) {
                    session.detach_on_close = true;
                }
            }
            ClientEvent::Focused => self.focused = Some(id),
            ClientEvent::Link(url) => self.actions.push(Action::OpenLink(url)),
            ClientEvent::WindowContents { count, contents } => {
                self.handle_window_contents(id, count, contents)
            }
            ClientEvent::Unknown(name) => log::debug!("client {id}: ignoring event {name}"),
        }
    }

    fn handle_version(&mut self, id: ConnectionId, info: String) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        conn.version_info = Some(info);

        let number = match conn.session {
            Some(number) => number,
            None => {
                let spec = self.config.default_command.clone();
                match self.spawn_session(&spec) {
                    Ok(number) => {
                        self.attach(id, number);
                        number
                    }
                    Err(e) => {
                        // No session to attach: the next writable sends the
                        // termination marker.
                        log::error!("client {id}: failed to start session: {e}");
                        self.actions.push(Action::RequestWritable(id));
                        return;
                    }
                }
            }
        };

        let has_saved = self
            .sessions
            .get(number)
            .is_some_and(|s| s.saved_window_contents.is_some());
        if has_saved {
            self.actions.push(Action::RequestWritable(id));
        }
    }

    fn handle_received(&mut self, id: ConnectionId, confirmed: u32) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        conn.confirmed_count = confirmed;
        let backlog = conn.backlog();
        let Some(number) = conn.session else {
            return;
        };
        if let Some(session) = self.sessions.get_mut(number) {
            if backlog < self.config.resume_threshold && session.paused {
                session.paused = false;
                log::debug!("session {number} resumed");
                self.actions.push(Action::ResumeReadable(number));
            }
        }
    }

    /// A key typed in the browser.
    ///
    /// While the pty is in canonical mode the browser edits the line itself,
    /// so ordinary keys are echoed back to it rather than written. Interrupt,
    /// end-of-file and suspend always reach the pty. An interrupt on a paused
    /// session also discards output that was already queued.
    fn handle_key(&mut self, id: ConnectionId, raw: &str, text: &str) {
        let Some(number) = self.session_of(id) else {
            return;
        };
        let Some(session) = self.sessions.get_mut(number) else {
            return;
        };
        let paused = session.paused;
        let Some(process) = session.process.as_mut() else {
            return;
        };

        let mode = process.line_mode();
        let single = match text.as_bytes() {
            [byte] => Some(*byte),
            _ => None,
        };

        if mode.is_some_and(|m| m.canonical) && !matches!(single, Some(3 | 4 | 26)) {
            let echoing = mode.is_some_and(|m| m.echo);
            self.write_to_browser(id, outbound::line_edit_echo(echoing, raw));
            return;
        }

        let mut to_drain = match (mode, single) {
            (Some(m), Some(key)) if paused && m.interrupt == key => process.queued_output(),
            _ => 0,
        };
        if let Err(e) = process.write(text.as_bytes()) {
            log::error!("client {id}: write key to pty: {e}");
        }
        let mut scratch = [0u8; 500];
        while to_drain > 0 {
            let want = to_drain.min(scratch.len());
            match process.read(&mut scratch[..want]) {
                Ok(n) if n > 0 => to_drain -= n,
                _ => break,
            }
        }
    }

    fn handle_window_contents(&mut self, id: ConnectionId, count: i64, contents: String) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        conn.contents = ContentsRequest::None;
        let Some(session) = conn.session.and_then(|n| self.sessions.get_mut(n)) else {
            return;
        };

        session.saved_window_contents = Some(contents);
        let reported = count::advance(count::from_wire(count), outbound::REQUEST_CONTENTS.len());
        let delta = count::backlog(reported, session.preserved_sent_count);
        if let Some(preserved) = session.preserved.as_mut() {
            preserved.advance_start(delta as usize);
        }

        // Viewers that attached during the capture are waiting for this.
        for &other in &session.attached {
            let waiting = other != id && self.connections.get(&other).is_some_and(|c| !c.initialized);
            if waiting {
                self.actions.push(Action::RequestWritable(other));
            }
        }
    }

    // -- Settings -----------------------------------------------------------

    /// Replace the settings object uploaded to browsers and push it to every
    /// attached connection.
    pub fn set_settings(&mut self, json: Option<String>) {
        self.settings_json = json;
        for session in self.sessions.iter() {
            for &id in &session.attached {
                if let Some(conn) = self.connections.get_mut(&id) {
                    conn.upload_settings_needed = true;
                }
                self.actions.push(Action::RequestWritable(id));
            }
        }
    }

    // -- Command channel ----------------------------------------------------

    /// Execute a command-socket request and return the text reply.
    pub fn handle_command(&mut self, request: &CommandRequest) -> String {
        let command = match Command::parse(&request.argv) {
            Ok(command) => command,
            Err(msg) => return format!("{msg}\n"),
        };
        match command {
            Command::New { argv, display } => self.new_command(argv, request, &display),
            Command::Attach { specifier, display } => self.attach_command(&specifier, &display),
            Command::List => self.list_text(),
            Command::Browse { url, display } => {
                self.display(None, Some(&url), &display);
                String::new()
            }
        }
    }

    fn new_command(
        &mut self,
        argv: Vec<String>,
        request: &CommandRequest,
        display: &DisplayOptions,
    ) -> String {
        let default = &self.config.default_command;
        let spec = CommandSpec {
            argv: if argv.is_empty() {
                default.argv.clone()
            } else {
                argv
            },
            cwd: request.cwd.clone().or_else(|| default.cwd.clone()),
            env: if request.env.is_empty() {
                default.env.clone()
            } else {
                env::parse_entries(&request.env)
            },
        };

        let Some(program) = spec.argv.first() else {
            return "no command to run\n".to_string();
        };
        let search_path = spec
            .env
            .iter()
            .find(|(k, _)| k == "PATH")
            .map(|(_, v)| v.as_str());
        if resolve::find_executable(program, search_path).is_none() {
            return format!("cannot execute '{program}'\n");
        }

        match self.spawn_session(&spec) {
            Ok(number) => {
                self.display(Some(number), None, display);
                String::new()
            }
            Err(e) => format!("{e}\n"),
        }
    }

    fn attach_command(&mut self, specifier: &str, display: &DisplayOptions) -> String {
        let Some(session) = self.sessions.find(specifier) else {
            return format!("no session '{specifier}' found\n");
        };
        let number = session.number();

        // Ask an existing viewer for its window contents so the new one can
        // start from them, unless a capture is already under way.
        let capturing = session.attached.iter().any(|id| {
            self.connections
                .get(id)
                .is_some_and(|c| c.contents != ContentsRequest::None)
        });
        let first = session.attached.first().copied();
        if let (false, Some(first)) = (capturing, first) {
            if let Some(conn) = self.connections.get_mut(&first) {
                conn.contents = ContentsRequest::Requested;
            }
            self.actions.push(Action::RequestWritable(first));
        }

        self.display(Some(number), None, display);
        String::new()
    }

    fn list_text(&self) -> String {
        let summaries = self.sessions.list();
        if summaries.is_empty() {
            return "(no sessions)\n".to_string();
        }
        summaries.iter().map(|s| format!("{s}\n")).collect()
    }

    /// Show a session (or a bare URL) to the user as `options` asks: a pane
    /// in the focused window, a new browser window, or nowhere.
    fn display(&mut self, number: Option<SessionNumber>, url: Option<&str>, options: &DisplayOptions) {
        let pid = number.and_then(|n| self.sessions.get(n)).map(Session::pid);
        let mut placement = options.placement;

        if placement == Placement::Detached {
            if let Some(session) = number.and_then(|n| self.sessions.get_mut(n)) {
                session.detached = true;
                return;
            }
            placement = Placement::Window;
        }

        match (placement, self.focused) {
            (Placement::Pane(op), Some(focused)) => {
                let message = match (pid, url) {
                    (Some(pid), _) => outbound::show_session(op, pid),
                    (None, Some(url)) => outbound::show_url(op, url),
                    (None, None) => return,
                };
                self.write_to_browser(focused, message);
            }
            _ => {
                let url = match (pid, url) {
                    (Some(pid), _) => format!("{}#connect-pid={pid}", self.config.main_url),
                    (None, Some(url)) => url.to_string(),
                    (None, None) => return,
                };
                self.actions.push(Action::OpenWindow {
                    url,
                    geometry: options.geometry.clone(),
                });
            }
        }
    }
}
