//! Role and tenant authorization.
//!
//! Every service call receives an explicit [`AuthContext`] resolved once
//! from the acting user's row; nothing is looked up ambiently. Role names
//! stored in the database are parsed into [`Role`] at that single point,
//! and all checks afterwards go through capabilities — no string
//! comparisons in service code.

use serde::{Deserialize, Serialize};

use crate::db::{Db, DbError};

/// The three role bundles. Unknown role names resolve to `None` and deny
/// everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    SystemAdmin,
    ClientAdmin,
    Member,
}

/// Coarse permission bundle entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ManagePlatform,
    ManageClient,
    ViewClient,
}

impl Role {
    /// Parse the stored role name. Returns `None` for anything unrecognized.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "System-Admin" => Some(Role::SystemAdmin),
            "Client-Admin" => Some(Role::ClientAdmin),
            "Member" => Some(Role::Member),
            _ => None,
        }
    }

    /// The stored name for this role.
    pub fn name(&self) -> &'static str {
        match self {
            Role::SystemAdmin => "System-Admin",
            Role::ClientAdmin => "Client-Admin",
            Role::Member => "Member",
        }
    }

    /// The capability bundle for this role. Each tier includes the ones
    /// below it.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::SystemAdmin => &[
                Capability::ManagePlatform,
                Capability::ManageClient,
                Capability::ViewClient,
            ],
            Role::ClientAdmin => &[Capability::ManageClient, Capability::ViewClient],
            Role::Member => &[Capability::ViewClient],
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(&'static str),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// The acting user's identity, tenant, and role, resolved once per request
/// and passed explicitly into every service call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub user_id: String,
    pub client_id: String,
    pub role: Role,
}

/// Failure to resolve an authorization context for a user ID.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("User {user_id} has unrecognized role '{role_name}'")]
    UnknownRole { user_id: String, role_name: String },

    #[error(transparent)]
    Db(#[from] DbError),
}

impl AuthContext {
    /// Resolve the context for an authenticated user ID.
    pub fn resolve(db: &Db, user_id: &str) -> Result<Self, ResolveError> {
        let user = db
            .get_user(user_id)?
            .ok_or_else(|| ResolveError::UnknownUser(user_id.to_string()))?;
        let role_name = user.role_name.clone().unwrap_or_default();
        let role = Role::parse(&role_name).ok_or_else(|| ResolveError::UnknownRole {
            user_id: user.id.clone(),
            role_name,
        })?;
        Ok(Self {
            user_id: user.id,
            client_id: user.client_id,
            role,
        })
    }
}

/// Check a capability against the acting user's role.
pub fn check(ctx: &AuthContext, capability: Capability) -> Decision {
    if ctx.role.can(capability) {
        Decision::Allowed
    } else {
        Decision::Denied("Unauthorized")
    }
}

/// Check that a resource's tenant matches the acting user's tenant.
pub fn check_client(ctx: &AuthContext, resource_client_id: &str) -> Decision {
    if ctx.client_id == resource_client_id {
        Decision::Allowed
    } else {
        Decision::Denied("Unauthorized")
    }
}
