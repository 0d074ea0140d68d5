//! Command-line arguments and configuration loading.
use clap::Parser;
use ext_config::{Config, File, FileFormat};
use pool_client::{
    config::ClientConfig,
    error::{ClientError, ClientResult},
};
use std::path::PathBuf;
use tracing::error;

/// Holds the parsed CLI arguments.
#[derive(Parser, Debug)]
#[command(author, version, about = "Mining pool client", long_about = None)]
pub struct Args {
    #[arg(
        short = 'c',
        long = "config",
        help = "Path to the TOML configuration file",
        default_value = "pool-client-config.toml"
    )]
    pub config_path: PathBuf,
    #[arg(
        short = 'f',
        long = "log-file",
        help = "Path to the log file. If not set, logs will only be written to stdout."
    )]
    pub log_file: Option<PathBuf>,
}

/// Process CLI args and load the configuration file they point to.
pub fn process_cli_args() -> ClientResult<ClientConfig> {
    let args = Args::parse();

    let config_path = args.config_path.to_str().ok_or_else(|| {
        error!("Invalid configuration path.");
        ClientError::BadCliArgs
    })?;

    let settings = Config::builder()
        .add_source(File::new(config_path, FileFormat::Toml))
        .build()?;

    let mut config = settings.try_deserialize::<ClientConfig>()?;
    config.set_log_file(args.log_file);
    Ok(config)
}
