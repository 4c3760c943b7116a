//! crush-jail
//!
//! Runs one jailed file-tool request. The request is read as JSON from stdin,
//! the result is written as JSON to stdout, logs go to stderr.
//!
//! Exit status: 0 success, 1 tool failure, 2 rejected request, 3 jail failure.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use crush_jail::{ErrorKind, JailConfig, RawCommandRequest};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "crush-jail", version, about = "Run a file-tool command confined to a workspace")]
struct Args {
    /// TOML config file; `CRUSH_JAIL_*` variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => JailConfig::load(path)?,
        None => JailConfig::default(),
    };
    config.apply_env_overrides()?;
    let jail = config.build().context("failed to build jail")?;

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read request from stdin")?;

    let outcome = match RawCommandRequest::from_json(&input) {
        Ok(raw) => jail.run(raw).await,
        Err(e) => Err(e.into()),
    };

    let (body, code) = match outcome {
        Ok(result) => {
            let code = if result.success { 0 } else { 1 };
            (serde_json::to_value(&result)?, code)
        }
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::Validation | ErrorKind::PathEscape => 2,
                ErrorKind::Infrastructure | ErrorKind::Timeout | ErrorKind::OutputLimit => 3,
            };
            (err.to_json(), code)
        }
    };

    println!("{}", body);
    Ok(ExitCode::from(code))
}
