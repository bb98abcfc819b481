//! Requests arriving on the command socket.
//!
//! A request is a JSON object `{"argv": [...], "cwd": "...", "env": [...]}`.
//! The first word of `argv` selects the command; options such as `--tab`
//! choose where the resulting session is displayed.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Raw request as sent by a `tether` client process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub argv: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// `KEY=VALUE` entries.
    #[serde(default)]
    pub env: Vec<String>,
}

impl CommandRequest {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Where a session or URL should be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// A new browser window.
    #[default]
    Window,
    /// Nowhere: the session is left detached.
    Detached,
    /// Inside the focused browser window, using a placement code.
    Pane(u8),
}

impl Placement {
    fn from_flag(flag: &str) -> Option<Self> {
        let placement = match flag {
            "--detached" => Placement::Detached,
            "--window" => Placement::Window,
            "--pane" => Placement::Pane(1),
            "--tab" => Placement::Pane(2),
            "--left" => Placement::Pane(10),
            "--right" => Placement::Pane(11),
            "--above" => Placement::Pane(12),
            "--below" => Placement::Pane(13),
            _ => return None,
        };
        Some(placement)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayOptions {
    pub placement: Placement,
    pub geometry: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a session running `argv` (the default command when empty).
    New {
        argv: Vec<String>,
        display: DisplayOptions,
    },
    Attach {
        specifier: String,
        display: DisplayOptions,
    },
    List,
    Browse {
        url: String,
        display: DisplayOptions,
    },
}

/// Split leading display options off `args`.
fn parse_options(args: &[String]) -> Result<(DisplayOptions, &[String]), String> {
    let mut options = DisplayOptions::default();
    let mut rest = args;
    while let Some((first, tail)) = rest.split_first() {
        if first == "--" {
            rest = tail;
            break;
        }
        if !first.starts_with("--") {
            break;
        }
        if let Some(geometry) = first.strip_prefix("--geometry=") {
            options.geometry = Some(geometry.to_string());
        } else if first == "--geometry" {
            let (value, after) = tail
                .split_first()
                .ok_or_else(|| "missing value for --geometry".to_string())?;
            options.geometry = Some(value.clone());
            rest = after;
            continue;
        } else if let Some(placement) = Placement::from_flag(first) {
            options.placement = placement;
        } else {
            return Err(format!("unknown option '{first}'"));
        }
        rest = tail;
    }
    Ok((options, rest))
}

impl Command {
    /// Interpret a request's argv. An empty argv, or one whose first word is
    /// a path, starts a new session directly.
    pub fn parse(argv: &[String]) -> Result<Self, String> {
        let Some((name, args)) = argv.split_first() else {
            return Ok(Command::New {
                argv: Vec::new(),
                display: DisplayOptions::default(),
            });
        };
        if name.contains('/') {
            return Ok(Command::New {
                argv: argv.to_vec(),
                display: DisplayOptions::default(),
            });
        }
        match name.as_str() {
            "new" => {
                let (display, rest) = parse_options(args)?;
                Ok(Command::New {
                    argv: rest.to_vec(),
                    display,
                })
            }
            "attach" => {
                let (display, rest) = parse_options(args)?;
                let specifier = rest
                    .first()
                    .ok_or_else(|| "attach: missing session specifier".to_string())?;
                Ok(Command::Attach {
                    specifier: specifier.clone(),
                    display,
                })
            }
            "list" => Ok(Command::List),
            "browse" => {
                let (display, rest) = parse_options(args)?;
                let url = rest
                    .first()
                    .ok_or_else(|| "browse: missing URL".to_string())?;
                Ok(Command::Browse {
                    url: url.clone(),
                    display,
                })
            }
            other => Err(format!("unknown command '{other}'")),
        }
    }
}
