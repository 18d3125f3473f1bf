//! SwasthVault record store.
//!
//! Declarative schema and index policy for account and visit records, and an
//! embedded document store that applies it once and enforces it on every
//! write.

pub mod auth;
pub mod config;
pub mod db;
pub mod models;
pub mod policy;

pub use db::{init_db, InitError, Provisioned, Query, SortOrder, StoreError, Vault};
pub use policy::{CollectionPolicy, Policy, ValidationError};
