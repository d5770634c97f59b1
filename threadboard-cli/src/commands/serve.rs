//! HTTP server command
//!
//! Configuration comes from the environment (and `.env`), with flags taking
//! precedence.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;

use threadboard_server::http::{run_server, ServerConfig};
use threadboard_server::{open_storage, BoardConfig, BoardService, CommentBroadcaster, StorageKind};

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (default: 127.0.0.1:8080)
    #[arg(long, short = 'b', env = "SERVER_ADDR")]
    pub bind: Option<SocketAddr>,

    /// Storage engine: inmemory or postgres
    #[arg(long, short = 's', env = "STORAGE_TYPE")]
    pub storage: Option<StorageKind>,

    /// Database URL for postgres storage
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,
}

impl ServeArgs {
    fn apply(self, mut config: BoardConfig) -> (BoardConfig, bool) {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(storage) = self.storage {
            config.storage = storage;
        }
        if let Some(url) = self.database_url.filter(|url| !url.trim().is_empty()) {
            config.database_url = Some(url);
        }
        (config, self.cors_permissive)
    }
}

/// Run the HTTP server until Ctrl+C or SIGTERM
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = BoardConfig::from_env().context("Invalid board configuration")?;
    let (config, cors_permissive) = args.apply(config);

    tracing::info!(
        storage = %config.storage,
        bind = %config.bind_addr,
        "Starting threadboard server"
    );

    let store = open_storage(&config)
        .await
        .context("Failed to open storage")?;
    let service = BoardService::new(store, CommentBroadcaster::new(config.subscriber_buffer));

    let server_config = ServerConfig {
        bind_addr: config.bind_addr,
        cors_permissive,
    };

    run_server(service, server_config)
        .await
        .context("Server error")?;

    Ok(())
}
