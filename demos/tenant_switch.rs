//! Walks through deduplication and a tenant switch against an in-process executor.
//!
//! Run with `RUST_LOG=tenant_cache=debug cargo run --example tenant_switch`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tenant_cache::{
    CacheConfig, Method, QueryParams, RequestCoordinator, Response, StatusCode, TransportError,
};
use tracing_subscriber::EnvFilter;

/// Pretends to be the orders endpoint of the given restaurant.
fn orders_endpoint(
    tenant: &'static str,
    calls: Arc<AtomicUsize>,
) -> impl FnOnce() -> BoxFuture<'static, Result<Response, TransportError>> + Send + 'static {
    move || {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, TransportError>(
                Response::new(StatusCode::Ok).with_body(format!("pending orders of {tenant}")),
            )
        }
        .boxed()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let coordinator = RequestCoordinator::new(CacheConfig::default().with_capacity(64))?;
    let calls = Arc::new(AtomicUsize::new(0));
    let params = QueryParams::new().with("status", "pending");

    coordinator.switch_tenant(Some("bistro"));

    let (a, b) = tokio::join!(
        coordinator.fetch(
            "bistro",
            &Method::Get,
            "/orders",
            &params,
            orders_endpoint("bistro", Arc::clone(&calls))
        ),
        coordinator.fetch(
            "bistro",
            &Method::Get,
            "/orders",
            &params,
            orders_endpoint("bistro", Arc::clone(&calls))
        ),
    );
    let (a, b) = (a?, b?);
    tracing::info!(
        first = a.text().unwrap_or_default(),
        second = b.text().unwrap_or_default(),
        network_calls = calls.load(Ordering::SeqCst),
        "two concurrent fetches"
    );

    let transition = coordinator.switch_tenant(Some("trattoria"));
    tracing::info!(%transition, stats = ?coordinator.stats(), "after switch");

    let response = coordinator
        .fetch(
            "trattoria",
            &Method::Get,
            "/orders",
            &params,
            orders_endpoint("trattoria", Arc::clone(&calls)),
        )
        .await?;
    tracing::info!(
        body = response.text().unwrap_or_default(),
        network_calls = calls.load(Ordering::SeqCst),
        "new tenant misses the old tenant's cache"
    );

    println!("{}", serde_json::to_string_pretty(&coordinator.stats())?);
    Ok(())
}
