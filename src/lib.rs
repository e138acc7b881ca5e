//! Self-signed certificate for TLS servers started without a certificate file.
//!
//! ```no_run
//! use selfsigned::{make_provider, server_config};
//!
//! let provider = make_provider("example.org,127.0.0.1").unwrap();
//! let config = server_config(provider);
//! ```

pub mod handler;
pub mod model;
pub mod tls;

use std::time::Duration;

use axum::{routing::get, Router};
use tokio::signal;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use model::error::GenerationError;
pub use model::options::{CertificateOptions, HostArgument};
pub use tls::cert::{generate, GeneratedCertificate};
pub use tls::provider::{make_provider, make_provider_with_rng, server_config, CertificateProvider};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Routes of the example server.
pub fn router() -> Router {
    Router::new()
        .route("/", get(handler::example::handler))
        .route("/live", get(handler::live::handler))
        .layer((
            TraceLayer::new_for_http(),
            TimeoutLayer::new(REQUEST_TIMEOUT),
        ))
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Ctrl-C received, shutting down");
        },
        _ = terminate => {
            log::info!("SIGTERM received, shutting down");
        },
    }
}
