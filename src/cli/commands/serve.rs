//! `emberdrop serve` — run the HTTP service.
//!
//! Startup order: storage driver, repository and service, expiry sweeper,
//! rate limiter janitor, listener.  Shutdown runs in reverse once the
//! server has drained: background tasks are joined before the storage
//! connection is closed.

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::Settings;
use crate::errors::Result;
use crate::ratelimit::{Janitor, RateLimiter};
use crate::secret::{ExpirySweeper, SecretRepository, SecretService};
use crate::server::{self, AppState};
use crate::store;

pub async fn execute(settings: Settings) -> Result<()> {
    settings.validate()?;

    let store = store::connect(&settings.database).await?;
    let repository = SecretRepository::new(store).with_timeout(settings.secrets.timeout);
    let service = Arc::new(SecretService::from_settings(repository, &settings.secrets)?);

    let sweeper = ExpirySweeper::start(service.clone(), settings.secrets.cleanup_interval);

    let mut state = AppState::new(service.clone());
    let janitor = if settings.rate_limiter.enabled {
        let limiter = Arc::new(RateLimiter::from_settings(&settings.rate_limiter));
        state = state.with_limiter(limiter.clone());
        Some(Janitor::start(limiter, settings.rate_limiter.cleanup_interval))
    } else {
        None
    };

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        address = %addr,
        driver = service.repository().driver(),
        rate_limited = settings.rate_limiter.enabled,
        "emberdrop listening"
    );

    let served = server::serve(listener, state, shutdown_signal()).await;

    tracing::info!("shutting down");
    sweeper.shutdown().await;
    if let Some(janitor) = janitor {
        janitor.shutdown().await;
    }
    if let Err(e) = service.close().await {
        tracing::warn!(error = %e, "failed to close storage cleanly");
    }

    served
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
