//! Taskmarket Server Library
//!
//! Configuration, logging and the axum HTTP surface around
//! [`taskmarket_core::Marketplace`].

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

pub use config::{Config, ConfigError, Environment};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(state.config.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, env = %state.config.environment, "taskmarket listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
