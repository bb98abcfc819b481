use crate::action::SessionNumber;
use crate::session::Session;

/// One line of a session listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub pid: u32,
    pub number: SessionNumber,
    pub name: Option<String>,
    pub windows: usize,
}

impl std::fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pid: {}, session#: {}", self.pid, self.number)?;
        if let Some(name) = &self.name {
            write!(f, ", name: {name}")?;
        }
        write!(f, ", #windows: {}", self.windows)
    }
}

/// Live sessions in registration order.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
    last_number: SessionNumber,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next session number. Numbers are never handed out twice,
    /// even if the spawn that requested one fails.
    pub fn next_number(&mut self) -> SessionNumber {
        self.last_number += 1;
        self.last_number
    }

    pub fn insert(&mut self, session: Session) {
        self.sessions.push(session);
    }

    /// Remove a session, keeping the others in order.
    pub fn remove(&mut self, number: SessionNumber) -> Option<Session> {
        let index = self.sessions.iter().position(|s| s.number() == number)?;
        Some(self.sessions.remove(index))
    }

    pub fn get(&self, number: SessionNumber) -> Option<&Session> {
        self.sessions.iter().find(|s| s.number() == number)
    }

    pub fn get_mut(&mut self, number: SessionNumber) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.number() == number)
    }

    pub fn by_pid(&self, pid: u32) -> Option<&Session> {
        self.sessions.iter().find(|s| s.pid() == pid)
    }

    /// Resolve a user-supplied session specifier.
    ///
    /// A specifier made only of digits is a pid and matches exactly.
    /// Otherwise it matches a session name exactly, or `:N` matches session
    /// number `N`. More than one match counts as no match.
    pub fn find(&self, specifier: &str) -> Option<&Session> {
        let pid = if !specifier.is_empty() && specifier.bytes().all(|b| b.is_ascii_digit()) {
            specifier.parse::<u32>().ok()
        } else {
            None
        };
        let number = specifier
            .strip_prefix(':')
            .and_then(|rest| rest.parse::<SessionNumber>().ok());

        let mut found = None;
        for session in &self.sessions {
            if pid == Some(session.pid()) {
                return Some(session);
            }
            let matched =
                session.name() == Some(specifier) || number == Some(session.number());
            if matched {
                if found.is_some() {
                    return None;
                }
                found = Some(session);
            }
        }
        found
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|s| SessionSummary {
                pid: s.pid(),
                number: s.number(),
                name: s.name().map(str::to_owned),
                windows: s.attached().len(),
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
