use emberkv::config::Config;
use emberkv::persistence::aof::{self, Aof};
use emberkv::server;
use emberkv::store::Store;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Parse command line args
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_args(&args);

    // RUST_LOG wins over --loglevel
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.loglevel)),
        )
        .init();

    let store = Arc::new(Store::new());

    let aof = if config.appendonly {
        let aof_path = config.aof_path();
        let aof = Aof::open(&aof_path, config.appendfsync)?;
        info!("AOF enabled: {}", aof_path.display());

        // Replay must finish before the first client is accepted
        match aof::replay(&aof_path, &store, &aof).await {
            Ok(count) => info!("AOF replayed {count} commands"),
            Err(e) => warn!("Failed to replay AOF: {e}"),
        }
        aof
    } else {
        Aof::disabled()
    };

    server::run_server(store, Arc::new(aof), &config).await
}
