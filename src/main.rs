use anyhow::Context;
use clap::Parser;
use pingora_core::server::configuration::Opt;
use pingora_core::server::Server;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kagami::config::Config;
use kagami::fetch::ReqwestFetcher;
use kagami::metrics::Metrics;
use kagami::proxy::KagamiProxy;
use kagami::service::{ImageService, ServiceDeps};
use kagami::storage::{ObjectStore, S3ObjectStore};

/// Kagami - edge image resizing front end built with Cloudflare's Pingora
#[derive(Parser, Debug)]
#[command(name = "kagami")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Daemon mode
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Test configuration and exit
    #[arg(long)]
    test: bool,

    /// Upgrade workers gracefully
    #[arg(long)]
    upgrade: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .and_then(|config| config.validate().map(|_| config))
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("invalid configuration in {}", args.config.display()))?;

    if args.test {
        println!(
            "configuration {} is valid: environment={}, origin={:?}, derivatives={}, cache classes={}, routes={}",
            args.config.display(),
            config.environment,
            config.origin.mode,
            config.derivatives.len(),
            config.cache.len(),
            config.routes.len()
        );
        return Ok(());
    }

    kagami::logging::init_subscriber(&config.logging)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    tracing::info!(
        config_file = %args.config.display(),
        server_address = %config.server.address,
        server_port = config.server.port,
        environment = %config.environment,
        origin_mode = ?config.origin.mode,
        "Configuration loaded successfully"
    );

    // Runtime for startup I/O (AWS credential and region resolution)
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let storage: Option<Arc<dyn ObjectStore>> = match &config.origin.storage {
        Some(storage) if config.origin.mode.uses_storage() => {
            let store = runtime.block_on(S3ObjectStore::connect(storage));
            Some(Arc::new(store))
        }
        _ => None,
    };
    let fetcher = ReqwestFetcher::new(Duration::from_secs(config.resizing.timeout_secs))
        .context("failed to build HTTP client")?;

    let listen_addr = config.server.listen_addr();
    let threads = config.server.threads;
    let service = ImageService::new(
        config,
        ServiceDeps {
            storage,
            fetcher: Arc::new(fetcher),
        },
        Arc::new(Metrics::new()),
    )
    .context("failed to build image service")?;

    // Build Pingora server options
    let opt = Opt {
        daemon: args.daemon,
        upgrade: args.upgrade,
        ..Default::default()
    };

    let mut server = Server::new(Some(opt)).context("failed to create Pingora server")?;
    server.bootstrap();

    let mut proxy_service = pingora_proxy::http_proxy_service(
        &server.configuration,
        KagamiProxy::new(Arc::new(service)),
    );
    proxy_service.threads = Some(threads);
    proxy_service.add_tcp(&listen_addr);

    tracing::info!(address = %listen_addr, threads, "Starting Kagami");

    server.add_service(proxy_service);

    // Blocks until shutdown; keep the startup runtime alive alongside it
    let _runtime = runtime;
    server.run_forever();
}
