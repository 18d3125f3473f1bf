//! Account repository over the `users` collection.
//!
//! Emails are stored trimmed and lower-cased, and every lookup normalises
//! the same way, so uniqueness holds regardless of how a user types them.

use super::{Query, SortOrder, StoreError, Vault};
use crate::models::{Account, NewAccount, Role};
use crate::policy::USERS;
use time::OffsetDateTime;
use uuid::Uuid;

/// The stored spelling of `email`: trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Registers a new account.
///
/// # Errors
///
/// [`StoreError::Conflict`] if the email (or a supplied Aadhaar number) is
/// already registered, [`StoreError::Validation`] if any field breaks the
/// `users` validator.
pub fn create_account(vault: &Vault, new: NewAccount) -> Result<Account, StoreError> {
    let now = OffsetDateTime::now_utc();
    let account = Account {
        id: Uuid::new_v4().to_string(),
        email: normalize_email(&new.email),
        password: new.password_hash,
        role: new.role,
        first_name: new.first_name,
        last_name: new.last_name,
        aadhaar_number: new.aadhaar_number,
        phone_number: new.phone_number,
        date_of_birth: new.date_of_birth,
        is_verified: false,
        is_active: true,
        created_at: Some(now),
        updated_at: Some(now),
    };
    vault.insert(USERS, serde_json::to_value(&account)?)?;
    tracing::info!(account = %account.id, role = account.role.as_str(), "account registered");
    Ok(account)
}

/// Fetches an account by `_id`. `None` if no such account exists.
pub fn get_account(vault: &Vault, id: &str) -> Result<Option<Account>, StoreError> {
    vault
        .get(USERS, id)?
        .map(serde_json::from_value)
        .transpose()
        .map_err(StoreError::from)
}

/// Looks an account up by email, ignoring case and surrounding whitespace.
///
/// Served by the unique email index.
pub fn find_account_by_email(vault: &Vault, email: &str) -> Result<Option<Account>, StoreError> {
    let query = Query::new().where_eq("email", normalize_email(email)).limit(1);
    let mut found = accounts(vault, &query)?;
    Ok(found.pop())
}

/// All accounts holding `role`, ordered by last name.
pub fn accounts_by_role(vault: &Vault, role: Role) -> Result<Vec<Account>, StoreError> {
    accounts(
        vault,
        &Query::new()
            .where_eq("role", role.as_str())
            .sort_by("lastName", SortOrder::Ascending),
    )
}

/// Accounts still awaiting verification, oldest registration first.
pub fn unverified_accounts(vault: &Vault) -> Result<Vec<Account>, StoreError> {
    accounts(
        vault,
        &Query::new()
            .where_eq("isVerified", false)
            .sort_by("createdAt", SortOrder::Ascending),
    )
}

/// Writes `account` back in place and returns it with a fresh `updatedAt`.
///
/// # Errors
///
/// [`StoreError::NotFound`] if the account was never stored,
/// [`StoreError::Conflict`] if the new email or Aadhaar number is taken,
/// [`StoreError::Validation`] if a field breaks the `users` validator. On
/// error the stored account is unchanged.
pub fn update_account(vault: &Vault, account: &Account) -> Result<Account, StoreError> {
    let mut updated = account.clone();
    updated.email = normalize_email(&updated.email);
    updated.updated_at = Some(OffsetDateTime::now_utc());
    vault.replace(USERS, &updated.id, serde_json::to_value(&updated)?)?;
    Ok(updated)
}

/// Marks an account verified or unverified.
///
/// # Errors
///
/// [`StoreError::NotFound`] if there is no account `id`.
pub fn set_verified(vault: &Vault, id: &str, verified: bool) -> Result<Account, StoreError> {
    let mut account = require(vault, id)?;
    account.is_verified = verified;
    update_account(vault, &account)
}

/// Enables or disables an account. Disabled accounts cannot log in.
///
/// # Errors
///
/// [`StoreError::NotFound`] if there is no account `id`.
pub fn set_active(vault: &Vault, id: &str, active: bool) -> Result<Account, StoreError> {
    let mut account = require(vault, id)?;
    account.is_active = active;
    update_account(vault, &account)
}

fn require(vault: &Vault, id: &str) -> Result<Account, StoreError> {
    get_account(vault, id)?.ok_or_else(|| StoreError::NotFound {
        collection: USERS.to_string(),
        id: id.to_string(),
    })
}

fn accounts(vault: &Vault, query: &Query) -> Result<Vec<Account>, StoreError> {
    vault
        .find(USERS, query)?
        .into_iter()
        .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
        .collect()
}
