#![cfg(not(tarpaulin_include))]

use clap::Parser;
use instant_analysis::app;
use instant_analysis::config::Config;

/// Main entry point for the analysis server
///
/// Settings come from flags or the environment (`DATA_FOLDER`, `BIND_ADDR`,
/// `MAX_UPLOAD_BYTES`, `MAX_SUGGESTIONS`, `OPENAI_API_KEY`). Log verbosity
/// follows `RUST_LOG` and defaults to `info`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    app::run(config).await
}
