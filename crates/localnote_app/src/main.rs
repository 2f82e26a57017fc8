mod app;

use localnote_bridge::BridgeConfig;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let config = BridgeConfig::from_env().unwrap_or_default();
    if let Err(err) = app::run(config) {
        eprintln!("Failed to run notification host: {err:#}");
    }
}
