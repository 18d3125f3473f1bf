use crate::db::{accounts, StoreError, Vault};
use crate::models::Account;
use bcrypt::{hash, verify};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email or wrong password. Deliberately the same error for both.
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account is deactivated")]
    Inactive,
    #[error("failed to hash password: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Hashes a plain credential so only the hash ever reaches the store.
pub fn hash_password(plain: &str, cost: u32) -> Result<String, AuthError> {
    Ok(hash(plain, cost)?)
}

/// Checks `credentials` against the stored account.
pub fn login(vault: &Vault, credentials: &Credentials) -> Result<Account, AuthError> {
    let account = accounts::find_account_by_email(vault, &credentials.email)?
        .ok_or(AuthError::InvalidCredentials)?;

    let matches = verify(&credentials.password, &account.password).unwrap_or_else(|e| {
        tracing::warn!(account = %account.id, error = %e, "stored password hash is unreadable");
        false
    });
    if !matches {
        return Err(AuthError::InvalidCredentials);
    }
    if !account.is_active {
        return Err(AuthError::Inactive);
    }
    Ok(account)
}
