//! Binary entry point: a thin shim over the library runner.

use anyhow::Context as _;
use lumen::{Config, Runner};
use std::path::Path;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let url = args.next().context("usage: lumen <url> [config.toml]")?;
    let config = match args.next() {
        Some(path) => Config::load(Path::new(&path))?,
        None => Config::default(),
    };

    let report = Runner::new(config).run(&url).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
