//! The reactor task that owns the [`Multiplexer`].
//!
//! Everything that touches sessions or connections runs here, one event at
//! a time. WebSocket handlers, pty watchers, timers, the command socket and
//! the settings watcher only send [`Event`]s. After each event the driver
//! carries out the actions the multiplexer queued; writable requests are
//! collected and delivered once per round, after the other actions.

use std::collections::HashMap;
use std::ops::ControlFlow;

use tokio::sync::{mpsc, oneshot};

use tether_mux::{
    Action, CommandRequest, ConnectParams, ConnectionId, Multiplexer, ReadOutcome, Rejection,
    SessionNumber,
};

use crate::browser::Launcher;
use crate::pty_watch::PtyWatcher;
use crate::settings::SettingsSnapshot;

pub type EventSender = mpsc::UnboundedSender<Event>;

/// Outbound byte stream of one browser connection.
pub type Outbound = mpsc::UnboundedSender<Vec<u8>>;

#[derive(Debug)]
pub enum Event {
    /// A browser completed the handshake.
    Connected {
        params: ConnectParams,
        outbound: Outbound,
        reply: oneshot::Sender<Result<ConnectionId, Rejection>>,
    },
    Received {
        connection: ConnectionId,
        data: Vec<u8>,
    },
    Closed(ConnectionId),
    /// A session's pty is readable; the reply tells the watcher what happened.
    PtyReadable {
        session: SessionNumber,
        reply: oneshot::Sender<ReadOutcome>,
    },
    /// A teardown grace period armed with `generation` has elapsed.
    TeardownDue {
        session: SessionNumber,
        generation: u64,
    },
    Command {
        request: CommandRequest,
        reply: oneshot::Sender<String>,
    },
    SettingsChanged(SettingsSnapshot),
}

pub struct Driver {
    mux: Multiplexer,
    events: mpsc::UnboundedReceiver<Event>,
    sender: EventSender,
    outbound: HashMap<ConnectionId, Outbound>,
    watchers: HashMap<SessionNumber, PtyWatcher>,
    launcher: Launcher,
    /// `--browser` given on the command line; settings never replace it.
    browser_pinned: bool,
}

impl Driver {
    pub fn new(mux: Multiplexer, launcher: Launcher, browser_pinned: bool) -> (Self, EventSender) {
        let (sender, events) = mpsc::unbounded_channel();
        let driver = Self {
            mux,
            events,
            sender: sender.clone(),
            outbound: HashMap::new(),
            watchers: HashMap::new(),
            launcher,
            browser_pinned,
        };
        (driver, sender)
    }

    /// Execute a command before the event loop starts.
    pub fn run_command(&mut self, request: &CommandRequest) -> String {
        let reply = self.mux.handle_command(request);
        // An exit here would mean nothing was ever served.
        let _ = self.apply_actions();
        reply
    }

    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            if self.handle(event).is_break() {
                break;
            }
        }
        log::info!("driver stopped");
    }

    fn handle(&mut self, event: Event) -> ControlFlow<()> {
        match event {
            Event::Connected {
                params,
                outbound,
                reply,
            } => {
                let result = self.mux.connection_established(&params);
                if let Ok(id) = result {
                    self.outbound.insert(id, outbound);
                }
                if reply.send(result).is_err() {
                    if let Ok(id) = result {
                        self.close(id);
                    }
                }
            }
            Event::Received { connection, data } => {
                if let Err(e) = self.mux.receive(connection, &data) {
                    log::error!("client {connection}: {e}, closing");
                    self.close(connection);
                }
            }
            Event::Closed(id) => self.close(id),
            Event::PtyReadable { session, reply } => {
                let outcome = self.mux.pty_readable(session);
                let flow = self.apply_actions();
                // The watcher may already be gone along with its session.
                let _ = reply.send(outcome);
                return flow;
            }
            Event::TeardownDue {
                session,
                generation,
            } => self.mux.teardown_due(session, generation),
            Event::Command { request, reply } => {
                let text = self.mux.handle_command(&request);
                let flow = self.apply_actions();
                if reply.send(text).is_err() {
                    log::debug!("command client went away before the reply");
                }
                return flow;
            }
            Event::SettingsChanged(snapshot) => {
                log::info!("settings changed, uploading to clients");
                if !self.browser_pinned {
                    self.launcher.command = snapshot.browser_command;
                }
                self.launcher.geometry = snapshot.geometry;
                self.mux.set_settings(Some(snapshot.json));
            }
        }
        self.apply_actions()
    }

    fn close(&mut self, id: ConnectionId) {
        // Dropping the sender ends the connection's writer task.
        self.outbound.remove(&id);
        self.mux.connection_closed(id);
    }

    /// Carry out queued actions until the multiplexer has nothing more to
    /// say. Breaks when the server should exit.
    fn apply_actions(&mut self) -> ControlFlow<()> {
        let mut flow = ControlFlow::Continue(());
        loop {
            let actions = self.mux.take_actions();
            if actions.is_empty() {
                return flow;
            }

            let mut writable: Vec<ConnectionId> = Vec::new();
            for action in actions {
                match action {
                    Action::Send { connection, data } => self.send(connection, data),
                    Action::RequestWritable(id) => {
                        if !writable.contains(&id) {
                            writable.push(id);
                        }
                    }
                    Action::SuspendReadable(session) => {
                        if let Some(watcher) = self.watchers.get(&session) {
                            watcher.suspend();
                        }
                    }
                    Action::ResumeReadable(session) => {
                        if let Some(watcher) = self.watchers.get(&session) {
                            watcher.resume();
                        }
                    }
                    Action::WatchPty { session, fd } => {
                        match PtyWatcher::start(session, fd, self.sender.clone()) {
                            Ok(watcher) => {
                                self.watchers.insert(session, watcher);
                            }
                            Err(e) => log::error!("session {session}: cannot watch pty: {e}"),
                        }
                    }
                    Action::ReleasePty(session) => {
                        self.watchers.remove(&session);
                    }
                    Action::ScheduleTeardown {
                        session,
                        generation,
                        after,
                    } => {
                        let sender = self.sender.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(after).await;
                            let _ = sender.send(Event::TeardownDue {
                                session,
                                generation,
                            });
                        });
                    }
                    Action::OpenWindow { url, geometry } => {
                        self.launcher.open_window(&url, geometry.as_deref())
                    }
                    Action::OpenLink(url) => self.launcher.open_link(&url),
                    Action::Exit => flow = ControlFlow::Break(()),
                }
            }

            for id in writable {
                self.mux.writable(id);
            }
        }
    }

    fn send(&mut self, id: ConnectionId, data: Vec<u8>) {
        let Some(outbound) = self.outbound.get(&id) else {
            return;
        };
        if outbound.send(data).is_err() {
            // The socket task is gone; its Closed event is on the way.
            log::debug!("client {id}: dropping output, connection closing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tether_mux::MuxConfig;
    use tether_proto::outbound::EOF_MESSAGE;
    use tether_pty::{CommandSpec, NativeSpawner};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    const KEY: &str = "driver-test-key";

    fn config() -> MuxConfig {
        MuxConfig {
            server_key: KEY.to_string(),
            main_url: "http://127.0.0.1:1/".to_string(),
            teardown_grace: Duration::from_millis(50),
            default_command: CommandSpec {
                argv: vec!["/bin/sh".to_string()],
                cwd: None,
                env: vec![("PATH".to_string(), "/usr/bin:/bin".to_string())],
            },
            ..MuxConfig::default()
        }
    }

    fn start(config: MuxConfig) -> (EventSender, JoinHandle<()>) {
        let mux = Multiplexer::new(config, Box::new(NativeSpawner::default()));
        let (driver, events) = Driver::new(mux, Launcher::default(), false);
        (events, tokio::spawn(driver.run()))
    }

    async fn connect(
        events: &EventSender,
        key: &str,
    ) -> (Result<ConnectionId, Rejection>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (reply, result) = oneshot::channel();
        let params = ConnectParams {
            server_key: Some(key.to_string()),
            connect_pid: None,
        };
        events
            .send(Event::Connected {
                params,
                outbound,
                reply,
            })
            .unwrap();
        (result.await.unwrap(), outbound_rx)
    }

    async fn command(events: &EventSender, argv: &[&str]) -> String {
        let (reply, text) = oneshot::channel();
        let request = CommandRequest {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            ..CommandRequest::default()
        };
        events.send(Event::Command { request, reply }).unwrap();
        text.await.unwrap()
    }

    /// Collect output until `needle` shows up or the deadline passes.
    async fn read_until(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>, needle: &[u8]) -> Vec<u8> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            match timeout(Duration::from_millis(100), rx.recv()).await {
                Ok(Some(chunk)) => seen.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(_) => {}
            }
            if seen.windows(needle.len()).any(|w| w == needle) {
                break;
            }
        }
        seen
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[tokio::test]
    async fn test_bad_key_is_rejected() {
        let (events, _driver) = start(config());
        let (result, _rx) = connect(&events, "wrong").await;
        assert_eq!(result, Err(Rejection::BadServerKey));
    }

    #[tokio::test]
    async fn test_list_without_sessions() {
        let (events, _driver) = start(config());
        assert_eq!(command(&events, &["list"]).await, "(no sessions)\n");
        assert_eq!(
            command(&events, &["frobnicate"]).await,
            "unknown command 'frobnicate'\n"
        );
    }

    #[tokio::test]
    async fn test_detached_session_is_listed() {
        let (events, _driver) = start(config());
        assert_eq!(command(&events, &["new", "--detached", "/bin/sh"]).await, "");
        let listing = command(&events, &["list"]).await;
        assert!(listing.contains("session#: 1"), "{listing}");
        assert!(listing.contains("#windows: 0"), "{listing}");
    }

    #[tokio::test]
    async fn test_shell_round_trip_and_exit() {
        let (events, driver) = start(config());
        let (result, mut rx) = connect(&events, KEY).await;
        let id = result.unwrap();

        // VERSION starts a session running the default command.
        events
            .send(Event::Received {
                connection: id,
                data: b"\x92VERSION test\n".to_vec(),
            })
            .unwrap();
        let greeting = read_until(&mut rx, b"DomTerm:1").await;
        assert!(contains(&greeting, b"\x1b]30;DomTerm:1\x07"));

        events
            .send(Event::Received {
                connection: id,
                data: b"echo tether-$((40+2))\n".to_vec(),
            })
            .unwrap();
        let output = read_until(&mut rx, b"tether-42").await;
        assert!(contains(&output, b"tether-42"));

        events
            .send(Event::Received {
                connection: id,
                data: b"exit\n".to_vec(),
            })
            .unwrap();
        let tail = read_until(&mut rx, EOF_MESSAGE).await;
        assert!(contains(&tail, EOF_MESSAGE));

        // With no sessions left, losing the last connection stops the driver.
        events.send(Event::Closed(id)).unwrap();
        timeout(Duration::from_secs(5), driver).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_teardown_after_last_viewer_leaves() {
        let (events, _driver) = start(MuxConfig {
            exit_when_idle: false,
            ..config()
        });
        let (result, mut rx) = connect(&events, KEY).await;
        let id = result.unwrap();
        events
            .send(Event::Received {
                connection: id,
                data: b"\x92VERSION test\n".to_vec(),
            })
            .unwrap();
        read_until(&mut rx, b"DomTerm:1").await;

        events.send(Event::Closed(id)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if command(&events, &["list"]).await == "(no sessions)\n" {
                break;
            }
            assert!(Instant::now() < deadline, "session was not torn down");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
