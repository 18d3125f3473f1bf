//! One-time provisioning of the bootstrap administrator.

use super::{InitError, Query, Vault};
use crate::auth::hash_password;
use crate::config::BootstrapAdmin;
use crate::policy::USERS;
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Outcome of [`ensure_bootstrap_admin`], carrying the account `_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    Created(String),
    AlreadyPresent(String),
}

impl Provisioned {
    pub fn id(&self) -> &str {
        match self {
            Provisioned::Created(id) | Provisioned::AlreadyPresent(id) => id,
        }
    }
}

/// The administrator document as stored.
pub fn bootstrap_document(email: &str, password_hash: &str, now: OffsetDateTime) -> Value {
    let now = now.format(&Rfc3339).unwrap_or_default();
    json!({
        "email": email,
        "password": password_hash,
        "role": "admin",
        "isVerified": true,
        "isActive": true,
        "firstName": "System",
        "lastName": "Administrator",
        "createdAt": now,
        "updatedAt": now,
    })
}

/// Creates the bootstrap administrator unless an account with its email
/// already exists.
///
/// Safe to run any number of times. A second writer racing on the same email
/// is stopped by the email uniqueness constraint and reported as
/// [`Provisioned::AlreadyPresent`].
///
/// # Errors
///
/// [`InitError::BootstrapEmailTaken`] if the email already belongs to a
/// non-admin account. Otherwise returns an error if the credential cannot be
/// hashed or the store refuses the write for any reason other than the email
/// already being taken.
pub fn ensure_bootstrap_admin(
    vault: &Vault,
    admin: &BootstrapAdmin,
) -> Result<Provisioned, InitError> {
    if let Some(id) = existing_admin(vault, &admin.email)? {
        return Ok(Provisioned::AlreadyPresent(id));
    }

    if admin.uses_default_password() {
        tracing::warn!(
            email = %admin.email,
            "bootstrap administrator uses the well-known default password; rotate it before production use"
        );
    }

    let password_hash = hash_password(&admin.password, admin.bcrypt_cost)?;
    let doc = bootstrap_document(&admin.email, &password_hash, OffsetDateTime::now_utc());

    match vault.insert(USERS, doc) {
        Ok(id) => Ok(Provisioned::Created(id)),
        Err(e) if e.is_conflict() => existing_admin(vault, &admin.email)?
            .map(Provisioned::AlreadyPresent)
            .ok_or_else(|| e.into()),
        Err(e) => Err(e.into()),
    }
}

/// The `_id` of the account holding `email`, provided it is an admin.
fn existing_admin(vault: &Vault, email: &str) -> Result<Option<String>, InitError> {
    let found = vault.find(USERS, &Query::new().where_eq("email", email).limit(1))?;
    let Some(doc) = found.first() else {
        return Ok(None);
    };
    let role = doc["role"].as_str().unwrap_or_default();
    if role != "admin" {
        tracing::error!(email, role, "bootstrap email belongs to a non-admin account");
        return Err(InitError::BootstrapEmailTaken {
            email: email.to_string(),
            role: role.to_string(),
        });
    }
    Ok(doc["_id"].as_str().map(str::to_string))
}
