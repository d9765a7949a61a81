//! Entry point: logging setup, config load, command dispatch.

mod cli;
mod run;

use clap::Parser;
use cli::{Cli, FILE_GUARD};
use encoder_config::{Config, load_toml};
use eyre::{Result, WrapErr};
use tracing_subscriber::EnvFilter;

fn load_config(args: &Cli) -> Result<Config> {
    let Some(path) = &args.config else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = load_toml(&text).wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .wrap_err_with(|| format!("validate config {}", path.display()))?;
    Ok(cfg)
}

fn init_logging(args: &Cli, cfg: &Config) -> Result<()> {
    let level = args
        .log_level
        .as_deref()
        .or(cfg.logging.level.as_deref())
        .unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    match &cfg.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .wrap_err_with(|| format!("open log file {path}"))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = FILE_GUARD.set(guard);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_writer(writer)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Latched encoder errors get a distinct exit code so scripts can tell a
/// calibration fault from an operational error.
fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(e) = err.downcast_ref::<encoder_core::EncoderError>()
        && e.flag().is_some()
    {
        return 2;
    }
    1
}

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    let args = Cli::parse();

    let result = load_config(&args)
        .and_then(|cfg| {
            init_logging(&args, &cfg)?;
            Ok(cfg)
        })
        .and_then(|cfg| run::dispatch(&args, &cfg));

    match result {
        Ok(value) => {
            if args.json {
                println!("{value}");
            } else {
                run::print_human(&value);
            }
        }
        Err(err) => {
            let code = exit_code_for_error(&err);
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({ "ok": false, "message": format!("{err:#}") })
                );
            } else {
                eprintln!("error: {err:#}");
            }
            std::process::exit(code);
        }
    }
}
