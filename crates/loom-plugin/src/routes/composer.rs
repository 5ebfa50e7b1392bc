//! Route composer: holds the published route table.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use loom_core::AppResult;

use super::handler::{RouteRequest, RouteResponse};
use super::table::RouteTable;

/// Owner of the live [`RouteTable`].
///
/// Readers take a snapshot and dispatch against it without holding the
/// lock; writers stage a new table off to the side and publish it whole.
#[derive(Debug, Default)]
pub struct RouteComposer {
    current: RwLock<Arc<RouteTable>>,
}

impl RouteComposer {
    /// Creates a composer with an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the table in effect right now.
    pub async fn snapshot(&self) -> Arc<RouteTable> {
        self.current.read().await.clone()
    }

    /// Replaces the live table.
    pub async fn publish(&self, table: RouteTable) {
        let routes = table.routes().len();
        let middleware = table.middleware().len();
        *self.current.write().await = Arc::new(table);
        debug!(routes = routes, middleware = middleware, "Route table published");
    }

    /// Dispatches a request against the current table.
    pub async fn dispatch(&self, request: RouteRequest) -> AppResult<RouteResponse> {
        let table = self.snapshot().await;
        table.dispatch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{PluginBuilder, RouteOptions};
    use crate::traits::route_fn;

    #[tokio::test]
    async fn test_snapshot_is_unaffected_by_publish() {
        let composer = RouteComposer::new();
        let mut builder = PluginBuilder::new("search", "1.0.0");
        builder
            .add_route(
                "/search",
                route_fn(|_req: RouteRequest| async { Ok(RouteResponse::ok(serde_json::json!("hit"))) }),
                RouteOptions::default(),
            )
            .unwrap();
        let descriptor = builder.build().unwrap();

        let before = composer.snapshot().await;
        composer
            .publish(before.with_plugin(&descriptor, 1).unwrap())
            .await;

        assert!(before.routes().is_empty());
        let response = composer.dispatch(RouteRequest::get("/searching")).await.unwrap();
        assert_eq!(response.status, 404);
        let response = composer.dispatch(RouteRequest::get("/search/x")).await.unwrap();
        assert_eq!(response.status, 200);
    }
}
