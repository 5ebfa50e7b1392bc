//! Request/response types and the handler traits route contributions implement.
//!
//! The host's HTTP layer translates its own
//! request type into a [`RouteRequest`] and back from a [`RouteResponse`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use loom_core::AppResult;

use crate::principal::Principal;

/// A request handed to the composed dispatch pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteRequest {
    /// HTTP method, upper-case.
    pub method: String,
    /// Request path, always starting with `/`.
    pub path: String,
    /// Authenticated caller, usually filled in by an auth middleware.
    pub principal: Option<Principal>,
    /// Request headers, lower-cased names.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: serde_json::Value,
    /// Values attached by middleware for later middleware and the handler.
    pub extensions: HashMap<String, serde_json::Value>,
}

impl RouteRequest {
    /// Creates a `GET` request for `path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    /// Creates a request with an explicit method.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Attaches a principal.
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Sets a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }
}

/// A response produced by a handler or a short-circuiting middleware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: serde_json::Value,
    /// Response headers.
    pub headers: HashMap<String, String>,
}

impl RouteResponse {
    /// A response with the given status and body.
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body,
            headers: HashMap::new(),
        }
    }

    /// `200 OK` with a JSON body.
    pub fn ok(body: serde_json::Value) -> Self {
        Self::new(200, body)
    }

    /// `401 Unauthorized`.
    pub fn unauthorized() -> Self {
        Self::new(401, serde_json::json!({"error": "authentication required"}))
    }

    /// `403 Forbidden`.
    pub fn forbidden() -> Self {
        Self::new(403, serde_json::json!({"error": "insufficient role"}))
    }

    /// `404 Not Found`.
    pub fn not_found(path: &str) -> Self {
        Self::new(404, serde_json::json!({"error": "not found", "path": path}))
    }
}

/// Handles requests under a mounted path prefix.
#[async_trait]
pub trait RouteHandler: Send + Sync + std::fmt::Debug {
    /// Produces a response for a request that matched this route.
    async fn handle(&self, request: &RouteRequest) -> AppResult<RouteResponse>;
}

/// What a middleware wants the pipeline to do next.
#[derive(Debug, Clone)]
pub enum MiddlewareFlow {
    /// Run the next middleware (or the handler).
    Next,
    /// Stop here and return this response.
    Respond(RouteResponse),
}

/// Runs before route handlers; may annotate the request or short-circuit.
#[async_trait]
pub trait Middleware: Send + Sync + std::fmt::Debug {
    /// Inspects or mutates the request.
    async fn handle(&self, request: &mut RouteRequest) -> AppResult<MiddlewareFlow>;
}
