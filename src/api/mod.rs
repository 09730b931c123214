//! API Module
//!
//! HTTP handlers and routing for the caching gateway.
//!
//! # Endpoints
//! - `POST /query` - Fetch marketplace data through the data manager
//! - `GET /stats` - Data manager statistics
//! - `GET /health` - Health check endpoint
//! - `DELETE /cache` - Clear all cached data

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
