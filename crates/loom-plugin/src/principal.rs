//! The identity a request or admin view is evaluated for.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated caller with roles and fine-grained permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// User id, if the principal maps to a stored user.
    pub id: Option<Uuid>,
    /// Coarse roles (e.g. `admin`, `editor`).
    pub roles: HashSet<String>,
    /// Permission strings (e.g. `cache:manage`).
    pub permissions: HashSet<String>,
}

impl Principal {
    /// Creates an anonymous principal with no roles or permissions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the user id.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Adds a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Adds permissions.
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Returns whether the principal holds any of `roles`. An empty list always passes.
    pub fn has_any_role(&self, roles: &[String]) -> bool {
        roles.is_empty() || roles.iter().any(|r| self.roles.contains(r))
    }

    /// Returns whether the principal's permissions intersect `required`.
    /// An empty requirement list is visible to everyone.
    pub fn can_see(&self, required: &[String]) -> bool {
        required.is_empty() || required.iter().any(|p| self.permissions.contains(p))
    }
}
