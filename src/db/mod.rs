//! Database module for SwasthVault.
//!
//! This module owns the embedded document store. A [`Vault`] wraps a SQLite
//! connection together with the [`Policy`] it enforces: applying the policy
//! creates the backing tables and indexes once, and from then on every write
//! goes through the collection validator and the unique indexes. The typed
//! repositories in [`accounts`] and [`visits`] sit on top of the raw document
//! API, and [`init_db`] performs the whole run-once initialization.

pub mod accounts;
pub mod bootstrap;
mod error;
mod query;
mod schema;
pub mod visits;

pub use bootstrap::Provisioned;
pub use error::{InitError, StoreError};
pub use query::{Query, SortOrder};

use crate::config::Config;
use crate::policy::{
    canonical_id, CollectionPolicy, Policy, ValidationError, Violation, ViolationKind,
};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// A document store bound to a schema and index policy.
#[derive(Debug)]
pub struct Vault {
    conn: Connection,
    policy: Policy,
}

impl Vault {
    /// Opens (or creates) the database file at `path`.
    ///
    /// The policy is not applied yet; call [`Vault::apply_policy`] before
    /// serving any writes.
    pub fn open(path: &Path, policy: Policy) -> Result<Self, InitError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, policy)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory(policy: Policy) -> Result<Self, InitError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, policy)
    }

    fn with_connection(conn: Connection, policy: Policy) -> Result<Self, InitError> {
        conn.pragma_update(None, "synchronous", "FULL")?;
        Ok(Self { conn, policy })
    }

    /// The policy this vault enforces.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Applies the policy to the store.
    ///
    /// Creates every collection table, index and text index that is not
    /// already present, re-validates documents already stored, and records
    /// each validator in the `_collections` catalog. Everything happens in a
    /// single transaction: if any step fails, nothing is left behind.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::Policy`] for an inconsistent policy,
    /// [`InitError::InvalidExisting`] if stored documents violate a validator,
    /// and [`InitError::IndexBuild`] if an index cannot be built, most commonly
    /// because existing data already breaks a uniqueness constraint.
    pub fn apply_policy(&mut self) -> Result<(), InitError> {
        self.policy.check()?;

        let tx = self.conn.transaction()?;
        tx.execute_batch(schema::CATALOG_SQL)?;
        for collection in &self.policy.collections {
            apply_collection(&tx, collection)?;
        }
        tx.commit()?;

        tracing::info!(
            collections = self.policy.collections.len(),
            "schema and index policy applied"
        );
        Ok(())
    }

    fn collection(&self, name: &str) -> Result<&CollectionPolicy, StoreError> {
        self.policy
            .collection(name)
            .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))
    }

    /// Validates and inserts a document, returning its `_id`.
    ///
    /// A caller-supplied `_id` must be a UUID, the same form other documents
    /// use to reference it; when absent a fresh UUID is assigned. Timestamps
    /// are stored in UTC and UUIDs in lower-case hyphenated form.
    ///
    /// # Errors
    ///
    /// [`StoreError::Validation`] if the document breaks the collection
    /// validator or carries a malformed `_id`, [`StoreError::Conflict`] if a
    /// unique index already holds the value.
    pub fn insert(&self, collection: &str, mut doc: Value) -> Result<String, StoreError> {
        let policy = self.collection(collection)?;
        policy.validate(&doc)?;
        policy.canonicalize(&mut doc);

        let id = match doc.get("_id") {
            Some(Value::String(id)) => canonical_id(id).ok_or_else(|| bad_id(policy))?,
            None => Uuid::new_v4().to_string(),
            Some(_) => return Err(bad_id(policy)),
        };
        doc["_id"] = Value::String(id.clone());

        self.conn
            .execute(
                &format!("INSERT INTO {} (id, doc) VALUES (?1, ?2)", policy.name),
                params![id, serde_json::to_string(&doc)?],
            )
            .map_err(|e| classify(e, policy))?;

        tracing::debug!(collection, %id, "document inserted");
        Ok(id)
    }

    /// Replaces the document stored under `id`, with the same checks as
    /// [`Vault::insert`]. The stored `_id` always stays `id`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if nothing is stored under `id`, otherwise as
    /// for [`Vault::insert`].
    pub fn replace(&self, collection: &str, id: &str, mut doc: Value) -> Result<(), StoreError> {
        let policy = self.collection(collection)?;
        policy.validate(&doc)?;
        policy.canonicalize(&mut doc);
        doc["_id"] = Value::String(id.to_string());

        let changed = self
            .conn
            .execute(
                &format!("UPDATE {} SET doc = ?1 WHERE id = ?2", policy.name),
                params![serde_json::to_string(&doc)?, id],
            )
            .map_err(|e| classify(e, policy))?;

        if changed == 0 {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        tracing::debug!(collection, %id, "document replaced");
        Ok(())
    }

    /// Fetches the document stored under `id`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownCollection`] if the policy does not declare
    /// `collection`.
    pub fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let policy = self.collection(collection)?;
        let doc: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT doc FROM {} WHERE id = ?1", policy.name),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        doc.map(|d| serde_json::from_str(&d))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Runs `query` against `collection`.
    ///
    /// Timestamp filters match by instant, whatever offset the caller spells
    /// them with.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownField`] if the query filters or sorts on a field
    /// the collection does not declare.
    pub fn find(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        let policy = self.collection(collection)?;
        let (sql, params) = query.to_sql(policy)?;
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
            row.get::<_, String>(0)
        })?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(serde_json::from_str(&row?)?);
        }
        Ok(docs)
    }

    /// Keyword search over the collection's text index, best match first.
    ///
    /// Every term is matched as a prefix; punctuation in `terms` is dropped
    /// so user input can never form FTS operators. Blank input finds nothing.
    pub fn text_search(
        &self,
        collection: &str,
        terms: &str,
        limit: usize,
    ) -> Result<Vec<Value>, StoreError> {
        let policy = self.collection(collection)?;
        let index = policy
            .text_index()
            .ok_or_else(|| StoreError::NoTextIndex(collection.to_string()))?;

        let query = sanitize_fts_query(terms);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT c.doc FROM {fts} JOIN {table} c ON c.rowid = {fts}.rowid
             WHERE {fts} MATCH ?1
             ORDER BY {fts}.rank
             LIMIT ?2",
            fts = index.name,
            table = policy.name,
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![query, limit as i64], |row| row.get::<_, String>(0))?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(serde_json::from_str(&row?)?);
        }
        Ok(docs)
    }

    /// Number of documents in `collection`.
    pub fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let policy = self.collection(collection)?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", policy.name),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// `true` if an index (or text index table) named `name` exists.
    ///
    /// Looks at the SQLite catalog, not the policy, so it reports what
    /// [`Vault::apply_policy`] actually built.
    pub fn has_index(&self, name: &str) -> Result<bool, StoreError> {
        let found: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = ?1 AND type IN ('index', 'table')",
            params![name],
            |row| row.get(0),
        )?;
        Ok(found > 0)
    }

    /// The validator recorded for `collection` when the policy was applied.
    ///
    /// `None` until [`Vault::apply_policy`] has run against this database.
    pub fn recorded_validator(&self, collection: &str) -> Result<Option<Value>, StoreError> {
        let validator: Option<String> = self
            .conn
            .query_row(
                "SELECT validator FROM _collections WHERE name = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()?;
        validator
            .map(|v| serde_json::from_str(&v))
            .transpose()
            .map_err(StoreError::from)
    }
}

fn apply_collection(conn: &Connection, collection: &CollectionPolicy) -> Result<(), InitError> {
    conn.execute_batch(&schema::create_table_sql(collection))?;
    revalidate_existing(conn, collection)?;

    for index in &collection.indexes {
        for sql in schema::index_statements(collection, index) {
            conn.execute_batch(&sql)
                .map_err(|source| InitError::IndexBuild {
                    collection: collection.name.to_string(),
                    index: index.name.clone(),
                    source,
                })?;
        }
        tracing::info!(
            collection = collection.name,
            index = %index.name,
            unique = index.unique,
            sparse = index.sparse,
            "index ready"
        );
    }

    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    conn.execute(
        "INSERT INTO _collections (name, validator, applied_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET validator = excluded.validator, applied_at = excluded.applied_at",
        params![collection.name, serde_json::to_string(collection)?, now],
    )?;
    Ok(())
}

/// Checks stored documents against the validator and rewrites any whose
/// timestamps or references are not in canonical form.
fn revalidate_existing(conn: &Connection, collection: &CollectionPolicy) -> Result<(), InitError> {
    let mut stmt = conn.prepare(&format!("SELECT id, doc FROM {}", collection.name))?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut failures = Vec::new();
    let mut rewrites = Vec::new();
    for row in rows {
        let (id, raw) = row?;
        let mut doc: Value = serde_json::from_str(&raw)?;
        match collection.validate(&doc) {
            Err(e) => failures.push(e),
            Ok(()) if collection.canonicalize(&mut doc) => {
                rewrites.push((id, serde_json::to_string(&doc)?));
            }
            Ok(()) => {}
        }
    }

    if !failures.is_empty() {
        return Err(InitError::InvalidExisting {
            collection: collection.name.to_string(),
            count: failures.len(),
            first: failures.swap_remove(0),
        });
    }

    for (id, doc) in &rewrites {
        conn.execute(
            &format!("UPDATE {} SET doc = ?1 WHERE id = ?2", collection.name),
            params![doc, id],
        )?;
    }
    if !rewrites.is_empty() {
        tracing::info!(
            collection = collection.name,
            rewritten = rewrites.len(),
            "normalized stored timestamps and references"
        );
    }
    Ok(())
}

/// Turns unique-index failures into [`StoreError::Conflict`].
fn classify(err: rusqlite::Error, collection: &CollectionPolicy) -> StoreError {
    let (extended_code, message) = match &err {
        rusqlite::Error::SqliteFailure(code, Some(message)) => {
            (code.extended_code, message.clone())
        }
        _ => (0, String::new()),
    };
    match extended_code {
        rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => {
            let index = collection
                .indexes
                .iter()
                .find(|i| message.contains(&format!("'{}'", i.name)));
            match index {
                Some(index) => StoreError::Conflict {
                    collection: collection.name.to_string(),
                    index: index.name.clone(),
                    field: index.primary_path().to_string(),
                },
                None => err.into(),
            }
        }
        rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => StoreError::Conflict {
            collection: collection.name.to_string(),
            index: "primary".to_string(),
            field: "_id".to_string(),
        },
        _ => err.into(),
    }
}

fn bad_id(collection: &CollectionPolicy) -> StoreError {
    ValidationError {
        collection: collection.name.to_string(),
        violations: vec![Violation {
            path: "_id".to_string(),
            kind: ViolationKind::WrongType { expected: "UUID string" },
        }],
    }
    .into()
}

/// Reduces free text to a conjunction of quoted prefix terms for FTS5.
fn sanitize_fts_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .map(|w| format!("\"{w}\"*"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Initializes the vault.
///
/// Opens (or creates) the database named in `config`, applies the SwasthVault
/// schema and index policy, and provisions the bootstrap administrator if it
/// does not exist yet. Running it again against the same database changes
/// nothing.
///
/// # Errors
///
/// Any failure is fatal: the database cannot be opened, the policy cannot be
/// applied to the existing data, or the bootstrap account cannot be written.
pub fn init_db(config: &Config) -> Result<Vault> {
    let mut vault = Vault::open(&config.database_path, Policy::swasthvault()).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database_path.display()
        )
    })?;

    vault
        .apply_policy()
        .context("Failed to apply schema and index policy")?;

    let provisioned = bootstrap::ensure_bootstrap_admin(&vault, &config.bootstrap)
        .context("Failed to provision bootstrap administrator")?;
    match provisioned {
        Provisioned::Created(id) => tracing::info!(%id, "bootstrap administrator created"),
        Provisioned::AlreadyPresent(id) => {
            tracing::debug!(%id, "bootstrap administrator already present")
        }
    }

    Ok(vault)
}
