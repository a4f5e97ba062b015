#![cfg(not(tarpaulin_include))]

use grocerz::{Config, app};
use std::env;
use std::path::PathBuf;

/// Main entry point for the web application
///
/// Loads configuration (defaults, then `grocerz.toml` or the file named by
/// the first command line argument, then `GROCERZ_*` environment variables)
/// and runs the web server until it is stopped.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_file = env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_file.as_deref())?;

    app::run(config).await
}
