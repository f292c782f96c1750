//! HTTP request handlers for the tutorgate API

use crate::config::Config;
use crate::context_cache::ContextStore;
use crate::error::{AppError, AppResult};
use crate::ledger::{UsageLedger, UsageStore};
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::models::ModelGateway;
use crate::router::TutorRouter;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod chat;
pub mod context;
pub mod extractor;
pub mod health;
pub mod metrics;
pub mod usage;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    router: Arc<TutorRouter>,
    contexts: Arc<dyn ContextStore>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Wire the router, ledger and metrics from configuration
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the Prometheus registry cannot be built.
    pub fn new(
        config: Arc<Config>,
        gateway: Arc<dyn ModelGateway>,
        usage_store: Arc<dyn UsageStore>,
        contexts: Arc<dyn ContextStore>,
    ) -> AppResult<Self> {
        let metrics = Arc::new(
            Metrics::new()
                .map_err(|e| AppError::Internal(format!("failed to create metrics: {}", e)))?,
        );
        let ledger = Arc::new(UsageLedger::new(usage_store, config.quota));
        Ok(Self::from_ledger(config, gateway, ledger, contexts, metrics))
    }

    /// Build state around an existing ledger (custom clock or store)
    pub fn from_ledger(
        config: Arc<Config>,
        gateway: Arc<dyn ModelGateway>,
        ledger: Arc<UsageLedger>,
        contexts: Arc<dyn ContextStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let router = Arc::new(
            TutorRouter::new(&config, gateway, ledger).with_metrics(Arc::clone(&metrics)),
        );

        Self {
            config,
            router,
            contexts,
            metrics,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &TutorRouter {
        &self.router
    }

    pub fn ledger(&self) -> &UsageLedger {
        self.router.ledger()
    }

    pub fn contexts(&self) -> &dyn ContextStore {
        self.contexts.as_ref()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Build the HTTP router with all endpoints and middleware
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat::handler))
        .route("/api/word-detail", post(chat::word_detail_handler))
        .route("/api/usage", get(usage::handler))
        .route("/api/usage/summary", get(usage::summary_handler))
        .route("/api/cache-context", post(context::handler))
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
