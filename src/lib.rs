//! # tenant-cache
//!
//! A client-side HTTP response cache for multi-tenant applications where the
//! active tenant can change at runtime.
//!
//! - Keys are always scoped to a tenant ([`key::CacheKey`]).
//! - Concurrent identical requests share one network call ([`RequestCoordinator::fetch`]).
//! - A tenant switch clears everything atomically, and responses still on the
//!   wire are discarded on arrival ([`RequestCoordinator::on_tenant_change`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tenant_cache::client::HttpClient;
//! use tenant_cache::http::Request;
//! use tenant_cache::{CacheConfig, Method, QueryParams, RequestCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = RequestCoordinator::new(CacheConfig::default())?;
//!     let client = HttpClient::new("127.0.0.1:8080");
//!
//!     coordinator.switch_tenant(Some("restaurant-17"));
//!
//!     let params = QueryParams::new().with("status", "pending");
//!     let request = Request::new(Method::Get, "/orders").query(params.clone());
//!     let orders = coordinator
//!         .fetch("restaurant-17", &Method::Get, "/orders", &params, move || async move {
//!             client.send(&request).await
//!         })
//!         .await?;
//!
//!     println!("{}", orders.status());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod http;
pub mod key;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheStats, ResponseCache};
pub use client::{HttpClient, TransportError};
pub use config::{CacheConfig, ConfigError};
pub use coordinator::{FetchError, RequestCoordinator, TenantTransition};
pub use http::{Method, Response, StatusCode};
pub use key::{CacheKey, ParamValue, QueryParams};
