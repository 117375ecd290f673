//! User account management within a tenant.
//!
//! Role assignment is restricted: the platform role is never assignable
//! through this surface, and the role must exist by name. Email uniqueness
//! is enforced across all active users.

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{require, ServiceError, Validator};
use crate::auth::{self, AuthContext, Capability, Role};
use crate::db::{Db, DbUser};

/// Roles an admin can hand out. `System-Admin` is provisioned out of band.
const ASSIGNABLE_ROLES: [Role; 2] = [Role::ClientAdmin, Role::Member];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// List the tenant's active users, newest first.
pub fn list_users(db: &Db, ctx: &AuthContext) -> Result<Vec<DbUser>, ServiceError> {
    require(ctx, Capability::ViewClient)?;
    Ok(db.list_client_users(&ctx.client_id)?)
}

/// A single user in the actor's tenant.
pub fn get_user(db: &Db, ctx: &AuthContext, id: &str) -> Result<DbUser, ServiceError> {
    require(ctx, Capability::ViewClient)?;
    find_tenant_user(db, ctx, id)
}

/// Create a user in the actor's tenant.
pub fn create_user(
    db: &Db,
    ctx: &AuthContext,
    request: CreateUserRequest,
) -> Result<DbUser, ServiceError> {
    require(ctx, Capability::ManageClient)?;

    let mut v = Validator::new();
    let name = v.bounded_string(&request.name, "name", 1, 120);
    let email = validate_email(&mut v, &request.email);
    let role = validate_role(&mut v, &request.role);
    if let Some(ref email) = email {
        if db.email_taken(email, None)? {
            v.push("email", "is already in use");
        }
    }
    v.finish()?;
    let Some(role) = role else {
        return Err(ServiceError::validation("role", "must be one of: Client-Admin, Member"));
    };

    let role_row = db
        .get_role_by_name(role.name())?
        .ok_or_else(|| ServiceError::NotFound(format!("role {}", role.name())))?;

    let now = Utc::now().to_rfc3339();
    let user = DbUser {
        id: format!("user-{}", Uuid::new_v4()),
        client_id: ctx.client_id.clone(),
        role_id: role_row.id,
        name: name.unwrap_or_default(),
        email: email.unwrap_or_default(),
        created_at: now.clone(),
        updated_at: now,
        role_name: Some(role.name().to_string()),
    };
    db.insert_user(&user)?;
    tracing::info!(user_id = %user.id, client_id = %ctx.client_id, "User created");
    Ok(user)
}

/// Update a user's name, email, or role.
pub fn update_user(
    db: &Db,
    ctx: &AuthContext,
    id: &str,
    request: UpdateUserRequest,
) -> Result<DbUser, ServiceError> {
    require(ctx, Capability::ManageClient)?;
    let mut user = find_tenant_user(db, ctx, id)?;

    let mut v = Validator::new();
    let name = request
        .name
        .as_deref()
        .and_then(|n| v.bounded_string(n, "name", 1, 120));
    let email = request.email.as_deref().and_then(|e| validate_email(&mut v, e));
    let role = request.role.as_deref().and_then(|r| validate_role(&mut v, r));
    if let Some(ref email) = email {
        if db.email_taken(email, Some(&user.id))? {
            v.push("email", "is already in use");
        }
    }
    v.finish()?;

    if let Some(name) = name {
        user.name = name;
    }
    if let Some(email) = email {
        user.email = email;
    }
    if let Some(role) = role {
        let role_row = db
            .get_role_by_name(role.name())?
            .ok_or_else(|| ServiceError::NotFound(format!("role {}", role.name())))?;
        user.role_id = role_row.id;
        user.role_name = Some(role.name().to_string());
    }
    db.update_user(&user)?;
    tracing::info!(user_id = %user.id, client_id = %ctx.client_id, "User updated");
    Ok(user)
}

/// Soft-delete a user. Their past timeline and alert activity stays put.
pub fn delete_user(db: &Db, ctx: &AuthContext, id: &str) -> Result<(), ServiceError> {
    require(ctx, Capability::ManageClient)?;
    if id == ctx.user_id {
        return Err(ServiceError::validation("id", "cannot delete yourself"));
    }
    let user = find_tenant_user(db, ctx, id)?;
    db.soft_delete_user(&user.id)?;
    tracing::info!(user_id = %user.id, client_id = %ctx.client_id, "User deleted");
    Ok(())
}

fn find_tenant_user(db: &Db, ctx: &AuthContext, id: &str) -> Result<DbUser, ServiceError> {
    let user = db
        .get_user(id)?
        .ok_or_else(|| ServiceError::NotFound(format!("user {id}")))?;
    if !auth::check_client(ctx, &user.client_id).is_allowed() {
        return Err(ServiceError::Unauthorized);
    }
    Ok(user)
}

fn validate_email(v: &mut Validator, email: &str) -> Option<String> {
    let email = v.bounded_string(email, "email", 3, 254)?;
    // Deliberately loose: one '@' with something on both sides.
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        v.push("email", "must be a valid email address");
        return None;
    }
    Some(email.to_lowercase())
}

fn validate_role(v: &mut Validator, name: &str) -> Option<Role> {
    match Role::parse(name) {
        Some(role) if ASSIGNABLE_ROLES.contains(&role) => Some(role),
        _ => {
            v.push("role", "must be one of: Client-Admin, Member");
            None
        }
    }
}
