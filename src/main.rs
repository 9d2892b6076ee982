use clap::Parser;
use tracing_subscriber::EnvFilter;

use bb8_drive::config::Config;

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=debug to see every packet)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Config::parse();
    if let Err(e) = bb8_drive::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
