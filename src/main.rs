mod args;

use args::process_cli_args;
use pool_client::{logging::init_logging, PoolClient};
use tracing::error;

#[tokio::main]
async fn main() {
    let config = match process_cli_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(config.log_file()) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = PoolClient::new(config).start().await {
        error!("Pool client failed: {e}");
        std::process::exit(1);
    }
}
