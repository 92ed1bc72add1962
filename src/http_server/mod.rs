//! # HTTP Server Module
//!
//! The request pipeline for the key-value API, served with axum.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /keys` - Create a key
//! - `GET /keys/:key` - Read a value
//! - `PUT /keys/:key` - Replace a value
//! - `DELETE /keys/:key` - Remove a key

pub mod config;
pub mod errors;
pub mod health_routes;
pub mod key_routes;
pub mod response;
pub mod server;
pub mod validate;

pub use config::HttpServerConfig;
pub use errors::{ApiError, ApiResult};
pub use key_routes::{key_routes, X_REQUEST_ID};
pub use response::{GetResponse, Response, Status};
pub use server::HttpServer;
pub use validate::FieldError;
