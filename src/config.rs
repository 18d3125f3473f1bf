//! Runtime configuration.
//!
//! Defaults are overridden by environment variables:
//!
//! * `SWASTHVAULT_DB_PATH` – database file (default `swasthvault.db`)
//! * `SWASTHVAULT_ADMIN_PASSWORD` – bootstrap administrator credential
//! * `SWASTHVAULT_BCRYPT_COST` – bcrypt work factor (4..=31)

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

pub const APP_NAME: &str = "SwasthVault";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_DB_PATH: &str = "swasthvault.db";

/// Email of the provisioned administrator.
pub const BOOTSTRAP_EMAIL: &str = "admin@swasthvault.com";

/// Well-known first-run credential. Rotate it before production use.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

pub fn default_log_filter() -> &'static str {
    "swasthvault=info"
}

/// Credential used for the one-time administrator account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
    pub bcrypt_cost: u32,
}

impl BootstrapAdmin {
    pub fn uses_default_password(&self) -> bool {
        self.password == DEFAULT_ADMIN_PASSWORD
    }
}

impl Default for BootstrapAdmin {
    fn default() -> Self {
        Self {
            email: BOOTSTRAP_EMAIL.to_string(),
            password: DEFAULT_ADMIN_PASSWORD.to_string(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_path: PathBuf,
    pub bootstrap: BootstrapAdmin,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            bootstrap: BootstrapAdmin::default(),
        }
    }
}

impl Config {
    /// Builds the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = var("SWASTHVAULT_DB_PATH").filter(|p| !p.trim().is_empty()) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(password) = var("SWASTHVAULT_ADMIN_PASSWORD") {
            if password.is_empty() {
                bail!("SWASTHVAULT_ADMIN_PASSWORD must not be empty");
            }
            config.bootstrap.password = password;
        }
        if let Some(cost) = var("SWASTHVAULT_BCRYPT_COST") {
            let cost: u32 = cost
                .trim()
                .parse()
                .with_context(|| format!("Invalid SWASTHVAULT_BCRYPT_COST: {cost:?}"))?;
            if !(4..=31).contains(&cost) {
                bail!("SWASTHVAULT_BCRYPT_COST must be between 4 and 31, got {cost}");
            }
            config.bootstrap.bcrypt_cost = cost;
        }

        Ok(config)
    }
}
