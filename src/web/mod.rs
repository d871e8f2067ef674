//! Read-only snapshot API.

mod handlers;

pub use handlers::*;

use crate::environment::Environment;
use crate::logging::Logger;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub environments: Arc<Vec<Arc<Environment>>>,
}

/// Web server exposing environment, target and metric snapshots.
pub struct Server {
    port: u16,
    state: AppState,
    logger: Logger,
}

impl Server {
    pub fn new(port: u16, environments: Vec<Arc<Environment>>, logger: Logger) -> Self {
        Self {
            port,
            state: AppState {
                environments: Arc::new(environments),
            },
            logger,
        }
    }

    /// Build the router with all routes.
    pub fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/api/health", get(handlers::handle_health))
            .route("/api/environments", get(handlers::handle_list_environments))
            .route("/api/environments/{name}", get(handlers::handle_get_environment))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve on the configured port until the listener fails.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let router = self.routes();

        self.logger.info(&format!("Snapshot API listening on {}", addr));

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
