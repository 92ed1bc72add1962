//! # HTTP Server
//!
//! Combines the key and health routers behind the shared middleware stack:
//! request ids, access logging, panic recovery and the per-request deadline.

use std::any::Any;
use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    error_handling::HandleErrorLayer,
    extract::Request,
    response::{IntoResponse, Response as HttpResponse},
    BoxError, Router,
};
use tokio::net::TcpListener;
use tower::timeout::{error::Elapsed, TimeoutLayer};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn};

use crate::storage::KeyValueStore;

use super::config::HttpServerConfig;
use super::errors::ApiError;
use super::health_routes::health_routes;
use super::key_routes::{key_routes, request_id};

/// HTTP server for the key-value API
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a server over `store`
    pub fn new<S: KeyValueStore>(config: HttpServerConfig, store: Arc<S>) -> Self {
        let router = Self::build_router(&config, store);
        Self { config, router }
    }

    /// Build the combined router with all endpoints
    fn build_router<S: KeyValueStore>(config: &HttpServerConfig, store: Arc<S>) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    info_span!(
                        "http",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = request_id(request.headers()),
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(HandleErrorLayer::new(handle_middleware_error))
            .layer(TimeoutLayer::new(config.timeout()));

        Router::new()
            .merge(health_routes())
            .merge(key_routes(store))
            .method_not_allowed_fallback(method_not_allowed)
            .fallback(route_not_found)
            .layer(middleware)
    }

    /// Configured listen address
    pub fn address(&self) -> &str {
        &self.config.address
    }

    pub fn config(&self) -> &HttpServerConfig {
        &self.config
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Bind the configured address
    pub async fn bind(&self) -> io::Result<TcpListener> {
        TcpListener::bind(&self.config.address).await
    }

    /// Serve on `listener` until `shutdown` resolves and open connections finish.
    ///
    /// Once `shutdown` resolves the listener stops accepting; requests already
    /// being served run to completion.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "http server listening");
        }

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> HttpResponse {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    error!(panic = detail, "handler panicked");

    ApiError::Internal("internal error").into_response()
}

async fn route_not_found() -> ApiError {
    ApiError::RouteNotFound
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        warn!("request timed out");
        ApiError::Internal("request timed out")
    } else {
        error!(error = %err, "unhandled middleware error");
        ApiError::Internal("internal error")
    }
}
