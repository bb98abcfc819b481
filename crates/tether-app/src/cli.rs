//! Command-line interface: `tether serve` runs the server, the other
//! subcommands talk to a running server over its command socket.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Terminal sessions served to browser windows")]
#[command(version)]
pub struct Cli {
    /// Command socket of the server
    #[arg(long, global = true, env = "TETHER_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the server
    Serve(ServeArgs),

    /// Start a new session in the running server
    New {
        /// Display options (--tab, --pane, --detached, ...) then the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Show an existing session again
    Attach {
        /// Display options then a pid, a session name or `:number`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },

    /// List sessions
    #[command(visible_alias = "ls")]
    List,

    /// Open a URL in a browser window or pane
    Browse {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
}

impl Commands {
    /// The argv sent to the server for a client subcommand.
    pub fn request_argv(&self) -> Option<Vec<String>> {
        let (name, args) = match self {
            Commands::Serve(_) => return None,
            Commands::New { args } => ("new", args.as_slice()),
            Commands::Attach { args } => ("attach", args.as_slice()),
            Commands::List => ("list", &[][..]),
            Commands::Browse { args } => ("browse", args.as_slice()),
        };
        let mut argv = vec![name.to_string()];
        argv.extend(args.iter().cloned());
        Some(argv)
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// HTTP port; 0 picks a free one
    #[arg(short, long, default_value_t = 0)]
    pub port: u16,

    /// Settings database [default: ~/.tether/tether.db]
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Signal sent to a session's process when it is torn down
    #[arg(long, value_parser = parse_signal, default_value = "HUP")]
    pub signal: i32,

    /// Ignore all input from browsers
    #[arg(long)]
    pub readonly: bool,

    /// Accept a single connection at a time
    #[arg(long)]
    pub once: bool,

    /// Keep running when no sessions or connections are left
    #[arg(long)]
    pub no_exit_when_idle: bool,

    /// Browser command; `%U` is replaced by the URL and `%g` by the geometry
    #[arg(long)]
    pub browser: Option<String>,

    /// Start the first session without opening a browser window
    #[arg(long)]
    pub detached: bool,

    /// Program for the first session [default: the `command` setting or $SHELL]
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Accepts `HUP`, `SIGHUP` or a plain number.
pub fn parse_signal(value: &str) -> Result<i32, String> {
    if let Ok(number) = value.parse::<i32>() {
        return if number > 0 {
            Ok(number)
        } else {
            Err(format!("invalid signal number {number}"))
        };
    }
    let upper = value.to_ascii_uppercase();
    let name = upper.strip_prefix("SIG").unwrap_or(&upper);
    let signal = match name {
        "HUP" => libc::SIGHUP,
        "INT" => libc::SIGINT,
        "QUIT" => libc::SIGQUIT,
        "KILL" => libc::SIGKILL,
        "TERM" => libc::SIGTERM,
        "USR1" => libc::SIGUSR1,
        "USR2" => libc::SIGUSR2,
        _ => return Err(format!("unknown signal '{value}'")),
    };
    Ok(signal)
}
