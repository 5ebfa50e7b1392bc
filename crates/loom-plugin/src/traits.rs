//! Closure adapters for the handler traits.
//!
//! Plugin authors implement [`HookHandler`], [`RouteHandler`] or
//! [`Middleware`] directly for stateful handlers; for one-off handlers these
//! adapters wrap a closure instead.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use loom_core::AppResult;

use crate::hooks::definitions::HookPayload;
use crate::hooks::registry::HookHandler;
use crate::routes::handler::{Middleware, MiddlewareFlow, RouteHandler, RouteRequest, RouteResponse};

type AsyncHookFn =
    dyn for<'a> Fn(&'a mut HookPayload) -> BoxFuture<'a, AppResult<()>> + Send + Sync;
type SyncHookFn = dyn Fn(&mut HookPayload) -> AppResult<()> + Send + Sync;
type RouteFn = dyn Fn(RouteRequest) -> BoxFuture<'static, AppResult<RouteResponse>> + Send + Sync;
type AsyncMiddlewareFn =
    dyn for<'a> Fn(&'a mut RouteRequest) -> BoxFuture<'a, AppResult<MiddlewareFlow>> + Send + Sync;
type SyncMiddlewareFn = dyn Fn(&mut RouteRequest) -> AppResult<MiddlewareFlow> + Send + Sync;

/// A closure-based hook handler.
pub struct ClosureHook {
    handler: ClosureHookKind,
}

enum ClosureHookKind {
    Async(Arc<AsyncHookFn>),
    Sync(Arc<SyncHookFn>),
}

impl std::fmt::Debug for ClosureHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.handler {
            ClosureHookKind::Async(_) => "async",
            ClosureHookKind::Sync(_) => "sync",
        };
        f.debug_struct("ClosureHook")
            .field("kind", &kind)
            .field("handler", &"<closure>")
            .finish()
    }
}

#[async_trait]
impl HookHandler for ClosureHook {
    async fn handle(&self, payload: &mut HookPayload) -> AppResult<()> {
        match &self.handler {
            ClosureHookKind::Async(f) => f(payload).await,
            ClosureHookKind::Sync(f) => f(payload),
        }
    }
}

/// Wraps an async closure as a hook handler.
///
/// ```rust,ignore
/// let handler = hook_fn(|payload| Box::pin(async move {
///     payload.set("seen", json!(true));
///     Ok(())
/// }));
/// ```
pub fn hook_fn<F>(f: F) -> Arc<dyn HookHandler>
where
    F: for<'a> Fn(&'a mut HookPayload) -> BoxFuture<'a, AppResult<()>> + Send + Sync + 'static,
{
    Arc::new(ClosureHook {
        handler: ClosureHookKind::Async(Arc::new(f)),
    })
}

/// Wraps a synchronous closure as a hook handler.
pub fn sync_hook_fn<F>(f: F) -> Arc<dyn HookHandler>
where
    F: Fn(&mut HookPayload) -> AppResult<()> + Send + Sync + 'static,
{
    Arc::new(ClosureHook {
        handler: ClosureHookKind::Sync(Arc::new(f)),
    })
}

/// A closure-based route handler.
pub struct ClosureRoute {
    handler: Arc<RouteFn>,
}

impl std::fmt::Debug for ClosureRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureRoute")
            .field("handler", &"<closure>")
            .finish()
    }
}

#[async_trait]
impl RouteHandler for ClosureRoute {
    async fn handle(&self, request: &RouteRequest) -> AppResult<RouteResponse> {
        (self.handler)(request.clone()).await
    }
}

/// Wraps an async closure as a route handler. The closure receives its own
/// copy of the request.
pub fn route_fn<F, Fut>(f: F) -> Arc<dyn RouteHandler>
where
    F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<RouteResponse>> + Send + 'static,
{
    Arc::new(ClosureRoute {
        handler: Arc::new(
            move |request: RouteRequest| -> BoxFuture<'static, AppResult<RouteResponse>> {
                Box::pin(f(request))
            },
        ),
    })
}

/// A closure-based middleware.
pub struct ClosureMiddleware {
    handler: ClosureMiddlewareKind,
}

enum ClosureMiddlewareKind {
    Async(Arc<AsyncMiddlewareFn>),
    Sync(Arc<SyncMiddlewareFn>),
}

impl std::fmt::Debug for ClosureMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureMiddleware")
            .field("handler", &"<closure>")
            .finish()
    }
}

#[async_trait]
impl Middleware for ClosureMiddleware {
    async fn handle(&self, request: &mut RouteRequest) -> AppResult<MiddlewareFlow> {
        match &self.handler {
            ClosureMiddlewareKind::Async(f) => f(request).await,
            ClosureMiddlewareKind::Sync(f) => f(request),
        }
    }
}

/// Wraps an async closure as middleware.
pub fn middleware_fn<F>(f: F) -> Arc<dyn Middleware>
where
    F: for<'a> Fn(&'a mut RouteRequest) -> BoxFuture<'a, AppResult<MiddlewareFlow>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(ClosureMiddleware {
        handler: ClosureMiddlewareKind::Async(Arc::new(f)),
    })
}

/// Wraps a synchronous closure as middleware.
pub fn sync_middleware_fn<F>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(&mut RouteRequest) -> AppResult<MiddlewareFlow> + Send + Sync + 'static,
{
    Arc::new(ClosureMiddleware {
        handler: ClosureMiddlewareKind::Sync(Arc::new(f)),
    })
}
