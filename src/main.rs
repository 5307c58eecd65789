use tracing::{error, info};

use fileshare::{Config, FileService, WebServer};

#[tokio::main]
async fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    // Load configuration
    let config = match Config::load_with_env(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = fileshare::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        fileshare::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let service = match FileService::new(&config.storage) {
        Ok(service) => service,
        Err(e) => {
            error!(
                "Failed to open shared directory {}: {}",
                config.storage.root.display(),
                e
            );
            std::process::exit(1);
        }
    };

    info!("Serving: {}", service.sandbox().root().display());
    info!(
        "Access: http://<your-ip>:{} (capacity policy: {:?}, delete policy: {:?})",
        config.server.port, config.storage.capacity, config.storage.delete_policy
    );

    let server = match WebServer::new(&config, service) {
        Ok(server) => server,
        Err(e) => {
            error!("Invalid server address: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Web server error: {}", e);
        std::process::exit(1);
    }
}
