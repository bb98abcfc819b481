mod browser;
mod cli;
mod command;
mod config;
mod driver;
mod pty_watch;
mod settings;
mod ws;

use std::future::IntoFuture;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

use browser::Launcher;
use cli::{Cli, Commands, ServeArgs};
use driver::Driver;
use tether_mux::{CommandRequest, Multiplexer};
use tether_pty::NativeSpawner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let socket = match cli.socket {
        Some(path) => path,
        None => config::default_socket_path()?,
    };

    match cli.command {
        Commands::Serve(args) => serve(args, socket).await,
        client => run_client(&socket, client.request_argv().unwrap_or_default()).await,
    }
}

/// Forward a client subcommand to the running server and print its reply.
async fn run_client(socket: &Path, argv: Vec<String>) -> anyhow::Result<()> {
    let request = CommandRequest {
        argv,
        cwd: std::env::current_dir().ok(),
        env: std::env::vars().map(|(k, v)| format!("{k}={v}")).collect(),
    };
    let reply = command::send(socket, &request).await?;
    print!("{reply}");
    Ok(())
}

/// The request that starts the first session.
fn initial_request(args: &ServeArgs) -> CommandRequest {
    let mut argv = vec!["new".to_string()];
    if args.detached {
        argv.push("--detached".to_string());
    }
    if !args.command.is_empty() {
        argv.push("--".to_string());
        argv.extend(args.command.iter().cloned());
    }
    CommandRequest {
        argv,
        ..CommandRequest::default()
    }
}

async fn serve(args: ServeArgs, socket: PathBuf) -> anyhow::Result<()> {
    let db_path = match &args.db {
        Some(path) => path.clone(),
        None => config::default_db_path()?,
    };
    let db = tether_db::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;

    let listener = TcpListener::bind(("127.0.0.1", args.port))
        .await
        .with_context(|| format!("failed to listen on port {}", args.port))?;
    let port = listener.local_addr()?.port();

    let server_key = uuid::Uuid::new_v4().simple().to_string();
    let mux_config = config::mux_config(&db, &args, server_key, port);
    let main_url = mux_config.main_url.clone();

    let snapshot = settings::snapshot(&db).context("failed to read settings")?;
    let launcher = Launcher::new(
        args.browser.clone().or_else(|| snapshot.browser_command.clone()),
        snapshot.geometry.clone(),
    );

    let mut mux = Multiplexer::new(mux_config, Box::new(NativeSpawner::default()));
    mux.set_settings(Some(snapshot.json.clone()));
    let (mut driver, events) = Driver::new(mux, launcher, args.browser.is_some());

    let commands = command::bind(&socket)?;

    let reply = driver.run_command(&initial_request(&args));
    if !reply.is_empty() {
        let _ = std::fs::remove_file(&socket);
        anyhow::bail!("{}", reply.trim_end());
    }
    log::info!("serving {main_url}");
    log::info!("command socket: {}", socket.display());

    tokio::spawn(command::serve(commands, events.clone()));
    settings::start_settings_watcher(Arc::new(Mutex::new(db)), db_path, events.clone(), snapshot);

    let driver_task = tokio::spawn(driver.run());
    let server = axum::serve(listener, ws::router(events)).into_future();

    let result = tokio::select! {
        served = server => served.context("http server failed"),
        _ = driver_task => Ok(()),
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupted");
            Ok(())
        }
    };

    if let Err(e) = std::fs::remove_file(&socket) {
        log::debug!("removing {}: {e}", socket.display());
    }
    result
}
