//! Route composition: merges active plugins' route mounts and middleware.

pub mod composer;
pub mod handler;
pub mod table;

pub use composer::RouteComposer;
pub use handler::{Middleware, MiddlewareFlow, RouteHandler, RouteRequest, RouteResponse};
pub use table::{MountedMiddleware, MountedRoute, RouteTable};

/// Strips a trailing slash (except for the root) and a trailing `/*`.
pub fn normalize_path(path: &str) -> &str {
    let path = path.strip_suffix("/*").unwrap_or(path);
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// Returns whether `path` lies under `prefix`, on a segment boundary.
///
/// `/admin/cache` matches `/admin/cache` and `/admin/cache/stats`, but
/// not `/admin/cachex`.
pub fn prefix_matches(prefix: &str, path: &str) -> bool {
    let prefix = normalize_path(prefix);
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/admin/cache/"), "/admin/cache");
        assert_eq!(normalize_path("/admin/cache/*"), "/admin/cache");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/*"), "/");
    }

    #[test]
    fn test_prefix_matches_on_segment_boundary() {
        assert!(prefix_matches("/admin/cache", "/admin/cache"));
        assert!(prefix_matches("/admin/cache", "/admin/cache/stats"));
        assert!(prefix_matches("/admin/cache/*", "/admin/cache/stats"));
        assert!(!prefix_matches("/admin/cache", "/admin/cachex"));
        assert!(!prefix_matches("/admin/cache", "/admin"));
        assert!(prefix_matches("/", "/anything"));
    }
}
