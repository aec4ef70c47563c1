use std::path::PathBuf;

use anyhow::{bail, Context};
use stackboard_host::config::{BackendKind, Config};
use stackboard_host::server::{open_backend, RunningHost};
use tokio::signal;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command line options
#[derive(Debug, Default, PartialEq, Eq)]
struct Cli {
    config: Option<PathBuf>,
    memory: bool,
    db: Option<PathBuf>,
    help: bool,
    version: bool,
}

fn parse_args(args: &[String]) -> anyhow::Result<Cli> {
    let mut cli = Cli::default();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => cli.help = true,
            "--version" | "-v" => cli.version = true,
            "--memory" => cli.memory = true,
            "--config" | "-c" => {
                let path = iter.next().context("--config needs a path")?;
                cli.config = Some(PathBuf::from(path));
            }
            "--db" => {
                let path = iter.next().context("--db needs a path")?;
                cli.db = Some(PathBuf::from(path));
            }
            other => bail!("unknown argument: {other}"),
        }
    }
    if cli.memory && cli.db.is_some() {
        bail!("--memory and --db are mutually exclusive");
    }
    Ok(cli)
}

fn print_help() {
    println!("stackboard - collaborative folder and item board");
    println!();
    println!("USAGE:");
    println!("    stackboard [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config FILE  Config file (default ~/.config/stackboard/config.toml)");
    println!("    --memory           Keep data in memory only");
    println!("    --db FILE          SQLite database file");
    println!("    -h, --help         Print help information");
    println!("    -v, --version      Print version");
    println!();
    println!("ENVIRONMENT:");
    println!("    PORT               HTTP port (default 5000)");
    println!("    STACKBOARD_WS_PORT Sync channel port (default 5001)");
    println!("    RUST_LOG           Log filter (default info)");
}

fn print_connection_info(host: &RunningHost) {
    eprintln!();
    eprintln!("  \x1b[1;32m[http]\x1b[0m   REST API at \x1b[1;96m{}/api\x1b[0m", host.http_url());
    eprintln!("  \x1b[1;32m[ws]\x1b[0m     Sync channel at \x1b[1;96m{}\x1b[0m", host.ws_url());
    eprintln!("  \x1b[1;32m[store]\x1b[0m  Backend: {}", host.service.backend_name());
    eprintln!();
    eprintln!("  \x1b[2mPress Ctrl+C to stop\x1b[0m");
    eprintln!();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging (tracing)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let cli = parse_args(&args)?;
    if cli.version {
        println!("stackboard {VERSION}");
        return Ok(());
    }
    if cli.help {
        print_help();
        return Ok(());
    }

    // === LOAD CONFIGURATION ===
    let mut config = if let Some(path) = &cli.config {
        Config::load_from_path(path)?
    } else {
        Config::create_default_if_missing();
        Config::load()
    };
    config.apply_env();
    if cli.memory {
        config.storage.backend = BackendKind::Memory;
    }
    if let Some(db) = cli.db {
        config.storage.backend = BackendKind::Sqlite;
        config.storage.path = Some(db);
    }

    let backend = open_backend(&config.storage)?;
    let mut host = RunningHost::start(&config, backend).await?;
    print_connection_info(&host);

    tokio::select! {
        result = host.wait() => {
            result?;
        }
        () = shutdown_signal() => {
            eprintln!("  \x1b[1;33m[stop]\x1b[0m   Graceful shutdown initiated...");
        }
    }

    let clients = host.service.hub().client_count().await;
    drop(host);
    tracing::info!(clients, "Host stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("stackboard")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_storage_flags() {
        let cli = parse_args(&args(&["--db", "/tmp/b.db", "-c", "cfg.toml"])).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/b.db")));
        assert_eq!(cli.config, Some(PathBuf::from("cfg.toml")));
        assert!(!cli.memory);

        assert!(parse_args(&args(&["--memory"])).unwrap().memory);
        assert_eq!(parse_args(&args(&[])).unwrap(), Cli::default());
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_args(&args(&["--db"])).is_err());
        assert!(parse_args(&args(&["--memory", "--db", "x.db"])).is_err());
        assert!(parse_args(&args(&["serve"])).is_err());
    }
}
