//! stageload - drive the staged loading and prefetch engine over a
//! simulated tenant-portal session.
//!
//! Each step of the walk is printed to stdout as one JSON line. Logs go to
//! stderr (and optionally a file); use `RUST_LOG=debug` to see cache and
//! prefetch decisions.

mod config;
mod demo;

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;

/// Log file written when `log_dir` is configured
const LOG_FILE: &str = "stageload.log";

const USAGE: &str = "\
Usage: stageload [OPTIONS]

Options:
  --walk <pages>     Comma-separated page walk (default: a built-in tenant session)
  --print-config     Print the effective configuration and exit
  --write-config     Save the effective configuration to the config file and exit
  -h, --help         Show this help";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard must be held until exit so buffered file logs flush.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

struct Args {
    walk: Option<Vec<String>>,
    print_config: bool,
    write_config: bool,
    help: bool,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args {
        walk: None,
        print_config: false,
        write_config: false,
        help: false,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--walk" => {
                let value = iter
                    .next()
                    .context("--walk needs a comma-separated list of pages")?;
                let walk = demo::parse_walk(value);
                if walk.is_empty() {
                    bail!("--walk needs at least one page");
                }
                parsed.walk = Some(walk);
            }
            "--print-config" => parsed.print_config = true,
            "--write-config" => parsed.write_config = true,
            "-h" | "--help" => parsed.help = true,
            other => bail!("Unknown argument: {}\n\n{}", other, USAGE),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&args)?;
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let (config, config_error) = match Config::load() {
        Ok(c) => (c, None),
        Err(e) => (Config::default(), Some(e)),
    };

    let _log_guard = init_tracing(&config);
    if let Some(e) = config_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    if args.write_config {
        config.save()?;
        println!("Wrote {}", Config::config_path()?.display());
        return Ok(());
    }

    let walk = args
        .walk
        .unwrap_or_else(|| demo::DEFAULT_WALK.iter().map(|p| p.to_string()).collect());

    info!("stageload starting");
    let reports = demo::run_walk(&config, &walk).await?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for report in &reports {
        writeln!(out, "{}", serde_json::to_string(report)?)?;
    }

    let served = reports.iter().filter(|r| r.served_from_prefetch).count();
    let hits = reports.iter().filter(|r| r.cache_hit).count();
    info!(steps = reports.len(), cache_hits = hits, prefetch_hits = served, "stageload done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args_walk() {
        let parsed = parse_args(&args(&["--walk", "dashboard,leases"])).unwrap();
        assert_eq!(
            parsed.walk,
            Some(vec!["dashboard".to_string(), "leases".to_string()])
        );
        assert!(!parsed.print_config);
    }

    #[test]
    fn test_parse_args_rejects_unknown_and_empty() {
        assert!(parse_args(&args(&["--bogus"])).is_err());
        assert!(parse_args(&args(&["--walk"])).is_err());
        assert!(parse_args(&args(&["--walk", ","])).is_err());
    }

    #[test]
    fn test_parse_args_flags() {
        let parsed = parse_args(&args(&["--print-config", "-h"])).unwrap();
        assert!(parsed.print_config);
        assert!(parsed.help);
        assert!(!parsed.write_config);
    }
}
