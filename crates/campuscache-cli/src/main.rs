//! campuscache - a command-line view over the LMS query cache.
//!
//! Lists and approves courses, fetches arbitrary endpoints through the same
//! cache the dashboards use, and manages the stored session and preferences.

mod commands;

use std::io;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory for rolling log files. Unset means stderr only.
const ENV_LOG_DIR: &str = "CAMPUSCACHE_LOG_DIR";

const USAGE: &str = "\
Usage: campuscache <command> [args]

Commands:
  login [email]                 Sign in and store the session
  logout                        Forget the stored session
  whoami                        Show the signed-in user
  courses [page] [limit]        List courses
  approve <course-id>           Approve a pending course
  get <endpoint> [--watch SECS] Fetch an endpoint as JSON, optionally polling
  watch [page] [limit]          List courses and refetch on realtime events read from stdin
  pref list | get <key> | set <key> <value> | rm <key>

Environment:
  CAMPUSCACHE_API_URL, CAMPUSCACHE_TOKEN, CAMPUSCACHE_TIMEOUT_SECS, CAMPUSCACHE_CACHE_DIR,
  CAMPUSCACHE_LOG_DIR, RUST_LOG";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=campuscache_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "campuscache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    let rest = &args[1..];

    info!(command = %command, "campuscache starting");
    let result = match command.as_str() {
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        "login" => commands::login(rest.first().map(String::as_str)).await,
        "logout" => commands::logout(),
        "whoami" => commands::whoami(),
        "courses" => commands::courses(parse_page(rest)?).await,
        "approve" => match rest.first() {
            Some(id) => commands::approve(id).await,
            None => Err(anyhow::anyhow!("approve needs a course id")),
        },
        "get" => {
            let endpoint = rest
                .first()
                .ok_or_else(|| anyhow::anyhow!("get needs an endpoint"))?;
            commands::get(endpoint, parse_watch(&rest[1..])?).await
        }
        "watch" => commands::watch(parse_page(rest)?).await,
        "pref" => commands::pref(rest),
        other => Err(anyhow::anyhow!("Unknown command '{}'\n\n{}", other, USAGE)),
    };

    info!(ok = result.is_ok(), "campuscache finished");
    result
}

fn parse_page(args: &[String]) -> Result<(u32, u32)> {
    let page = match args.first() {
        Some(raw) => raw.parse()?,
        None => 1,
    };
    let limit = match args.get(1) {
        Some(raw) => raw.parse()?,
        None => 10,
    };
    Ok((page, limit))
}

fn parse_watch(args: &[String]) -> Result<Option<u64>> {
    match args {
        [] => Ok(None),
        [flag, secs] if flag == "--watch" => Ok(Some(secs.parse()?)),
        _ => Err(anyhow::anyhow!("expected --watch SECS")),
    }
}
