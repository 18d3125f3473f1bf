//! Renders a [`CollectionPolicy`] into SQLite DDL.
//!
//! Each collection is a table of `(id, doc)` rows where `doc` is the JSON
//! document. Indexes are expression indexes over `json_extract`, so the
//! query side must build its predicates with [`field_expr`] to hit them.
//! Timestamp fields are indexed by `julianday(...)` so that ordering follows
//! the instant and not the textual form of the RFC 3339 string.
//!
//! All names reaching this module have passed [`crate::policy::Policy::check`].

use crate::policy::{CollectionPolicy, FieldType, IndexOrder, IndexSpec};

/// Catalog of applied validators, one row per collection.
pub(crate) const CATALOG_SQL: &str = "CREATE TABLE IF NOT EXISTS _collections (
    name TEXT PRIMARY KEY NOT NULL,
    validator TEXT NOT NULL CHECK (json_valid(validator)),
    applied_at TEXT NOT NULL
)";

pub(crate) fn create_table_sql(collection: &CollectionPolicy) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
    id TEXT PRIMARY KEY NOT NULL,
    doc TEXT NOT NULL CHECK (json_valid(doc))
)",
        collection.name
    )
}

/// `json_extract` over `doc` for a dotted path.
pub(crate) fn extract(path: &str) -> String {
    format!("json_extract(doc, '$.{path}')")
}

/// The SQL expression a field is indexed and compared by.
pub(crate) fn field_expr(collection: &CollectionPolicy, path: &str) -> String {
    if path == "_id" {
        return "id".to_string();
    }
    match collection.field(path).map(|f| f.ty) {
        Some(FieldType::Timestamp) => format!("julianday({})", extract(path)),
        _ => extract(path),
    }
}

/// FTS5 column name for an indexed path (`diagnosis.primary` -> `diagnosis_primary`).
pub(crate) fn text_column(path: &str) -> String {
    path.replace('.', "_")
}

/// Statements that create `index`, in execution order.
pub(crate) fn index_statements(collection: &CollectionPolicy, index: &IndexSpec) -> Vec<String> {
    if index.is_text() {
        text_index_statements(collection, index)
    } else {
        vec![btree_index_sql(collection, index)]
    }
}

fn btree_index_sql(collection: &CollectionPolicy, index: &IndexSpec) -> String {
    let keys = index
        .keys
        .iter()
        .map(|key| {
            let direction = match key.order {
                IndexOrder::Descending => "DESC",
                _ => "ASC",
            };
            format!("{} {direction}", field_expr(collection, key.path))
        })
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({keys})",
        if index.unique { "UNIQUE " } else { "" },
        index.name,
        collection.name,
    );
    if index.sparse {
        let present = index
            .keys
            .iter()
            .map(|key| format!("{} IS NOT NULL", extract(key.path)))
            .collect::<Vec<_>>()
            .join(" AND ");
        sql.push_str(" WHERE ");
        sql.push_str(&present);
    }
    sql
}

fn text_index_statements(collection: &CollectionPolicy, index: &IndexSpec) -> Vec<String> {
    let table = collection.name;
    let fts = &index.name;
    let columns = index
        .keys
        .iter()
        .map(|k| text_column(k.path))
        .collect::<Vec<_>>()
        .join(", ");
    let values = |row: &str| {
        index
            .keys
            .iter()
            .map(|k| format!("json_extract({row}.doc, '$.{}')", k.path))
            .collect::<Vec<_>>()
            .join(", ")
    };

    vec![
        format!("CREATE VIRTUAL TABLE IF NOT EXISTS {fts} USING fts5({columns})"),
        format!(
            "CREATE TRIGGER IF NOT EXISTS {fts}_ai AFTER INSERT ON {table} BEGIN
    INSERT INTO {fts} (rowid, {columns}) VALUES (new.rowid, {new});
END",
            new = values("new")
        ),
        format!(
            "CREATE TRIGGER IF NOT EXISTS {fts}_au AFTER UPDATE ON {table} BEGIN
    DELETE FROM {fts} WHERE rowid = old.rowid;
    INSERT INTO {fts} (rowid, {columns}) VALUES (new.rowid, {new});
END",
            new = values("new")
        ),
        format!(
            "CREATE TRIGGER IF NOT EXISTS {fts}_ad AFTER DELETE ON {table} BEGIN
    DELETE FROM {fts} WHERE rowid = old.rowid;
END"
        ),
        format!(
            "INSERT INTO {fts} (rowid, {columns})
    SELECT c.rowid, {existing} FROM {table} c
    WHERE c.rowid NOT IN (SELECT rowid FROM {fts})",
            existing = values("c")
        ),
    ]
}
