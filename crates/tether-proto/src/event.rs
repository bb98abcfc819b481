//! Typed control events sent by the browser.

use crate::count;
use crate::scan::RawEvent;

/// Errors from decoding an event payload. None of them is fatal: the
/// offending event is dropped and the connection carries on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Event data was not valid UTF-8.
    BadUtf8(String),
    /// A numeric field was missing or unparsable.
    BadField { event: String, data: String },
    /// A JSON string payload could not be decoded.
    BadJson { event: String, reason: String },
    /// A required delimiter or field was absent.
    MissingField { event: String, field: &'static str },
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::BadUtf8(event) => write!(f, "{event}: data is not UTF-8"),
            ProtocolError::BadField { event, data } => {
                write!(f, "{event}: malformed numeric data '{data}'")
            }
            ProtocolError::BadJson { event, reason } => write!(f, "{event}: bad JSON ({reason})"),
            ProtocolError::MissingField { event, field } => write!(f, "{event}: missing {field}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Terminal geometry reported by a `WS` event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSize {
    pub rows: i32,
    pub cols: i32,
    pub pixel_height: f32,
    pub pixel_width: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// `WS rows cols pixh pixw`
    WindowSize(WindowSize),
    /// `VERSION info`
    Version(String),
    /// `RECEIVED count` — peer's confirmed byte count, already masked.
    Received(u32),
    /// `KEY "json"` — `raw` is the event data as sent, `text` the decoded key.
    Key { raw: String, text: String },
    /// `SESSION-NAME "json"`
    SessionName(String),
    /// `OPEN-WINDOW geometry=...&open=...`
    OpenWindow {
        geometry: Option<String>,
        fragment: String,
    },
    /// `DETACH`
    Detach,
    /// `FOCUSED`
    Focused,
    /// `ALINK "json-url"`
    Link(String),
    /// `WINDOW-CONTENTS count,snapshot`
    WindowContents { count: i64, contents: String },
    /// Any name not listed above; ignored by the server.
    Unknown(String),
}

impl ClientEvent {
    /// Decode a raw event line.
    pub fn parse(raw: &RawEvent<'_>) -> Result<Self, ProtocolError> {
        let name = raw.name();
        let data = std::str::from_utf8(raw.data)
            .map_err(|_| ProtocolError::BadUtf8(name.to_string()))?;

        let event = match name {
            "WS" => ClientEvent::WindowSize(parse_window_size(data).ok_or_else(|| {
                ProtocolError::BadField {
                    event: name.to_string(),
                    data: data.to_string(),
                }
            })?),
            "VERSION" => ClientEvent::Version(data.to_string()),
            "RECEIVED" => {
                let value = leading_int(data).ok_or_else(|| ProtocolError::BadField {
                    event: name.to_string(),
                    data: data.to_string(),
                })?;
                ClientEvent::Received(count::from_wire(value))
            }
            "KEY" => ClientEvent::Key {
                raw: data.to_string(),
                text: quoted_json_string(name, data)?,
            },
            "SESSION-NAME" => ClientEvent::SessionName(quoted_json_string(name, data)?),
            "OPEN-WINDOW" => {
                let geometry = data.find("geometry=").map(|pos| {
                    let rest = &data[pos + "geometry=".len()..];
                    rest.split('&').next().unwrap_or("").to_string()
                });
                let fragment = data
                    .find("open=")
                    .map(|pos| data[pos..].to_string())
                    .unwrap_or_default();
                ClientEvent::OpenWindow { geometry, fragment }
            }
            "DETACH" => ClientEvent::Detach,
            "FOCUSED" => ClientEvent::Focused,
            "ALINK" => ClientEvent::Link(json_string(name, data)?),
            "WINDOW-CONTENTS" => {
                let comma = data.find(',').ok_or_else(|| ProtocolError::MissingField {
                    event: name.to_string(),
                    field: "',' separator",
                })?;
                let count = leading_int(data).ok_or_else(|| ProtocolError::BadField {
                    event: name.to_string(),
                    data: data[..comma].to_string(),
                })?;
                ClientEvent::WindowContents {
                    count,
                    contents: data[comma + 1..].to_string(),
                }
            }
            other => ClientEvent::Unknown(other.to_string()),
        };
        Ok(event)
    }
}

fn parse_window_size(data: &str) -> Option<WindowSize> {
    let mut fields = data.split_whitespace();
    Some(WindowSize {
        rows: fields.next()?.parse().ok()?,
        cols: fields.next()?.parse().ok()?,
        pixel_height: fields.next()?.parse().ok()?,
        pixel_width: fields.next()?.parse().ok()?,
    })
}

/// Parse the integer at the start of `data`, ignoring anything after it.
fn leading_int(data: &str) -> Option<i64> {
    let s = data.trim_start();
    let digits_start = usize::from(s.starts_with(['-', '+']));
    let end = s[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(s.len(), |off| digits_start + off);
    if end == digits_start {
        return None;
    }
    s[..end].parse().ok()
}

/// Decode the first JSON value in `data` as a string; trailing text is ignored.
fn json_string(event: &str, data: &str) -> Result<String, ProtocolError> {
    serde_json::Deserializer::from_str(data)
        .into_iter::<String>()
        .next()
        .ok_or_else(|| ProtocolError::MissingField {
            event: event.to_string(),
            field: "JSON string",
        })?
        .map_err(|e| ProtocolError::BadJson {
            event: event.to_string(),
            reason: e.to_string(),
        })
}

/// Like [`json_string`], starting from the first double quote in `data`.
fn quoted_json_string(event: &str, data: &str) -> Result<String, ProtocolError> {
    let quote = data.find('"').ok_or_else(|| ProtocolError::MissingField {
        event: event.to_string(),
        field: "quoted string",
    })?;
    json_string(event, &data[quote..])
}
