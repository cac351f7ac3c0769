//! Subscriber endpoint lifecycle.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::{FeedConfig, WS_PATH};
use crate::error::Error;
use crate::state::AppState;

/// A bound, not yet serving, feed endpoint.
pub struct FeedServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
}

impl FeedServer {
    /// Bind the listener. Failure here is fatal for startup.
    pub async fn bind(config: &FeedConfig, state: AppState) -> Result<Self, Error> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| Error::Startup {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        tracing::info!(
            addr = %local_addr,
            path = WS_PATH,
            primary_shard_only = config.primary_shard_only,
            rules = ?config.listen_source,
            "change feed endpoint bound"
        );

        Ok(Self {
            listener,
            router: crate::create_router(state),
            local_addr,
        })
    }

    /// Address actually bound, useful when the configured port is `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `ws://` URL subscribers connect to.
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.local_addr, WS_PATH)
    }

    /// Serve until the process exits.
    pub async fn serve(self) -> Result<(), Error> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
