use super::schema::field_expr;
use super::StoreError;
use crate::policy::{canonical_id, canonical_timestamp, CollectionPolicy, FieldType};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Equality filters, an optional sort and an optional limit over one collection.
///
/// Field paths must be declared by the collection policy (or be `_id`).
/// Predicates are rendered with the same expressions as the indexes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<(String, Value)>,
    sort: Option<(String, SortOrder)>,
    limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only documents whose `path` equals `value`. A `null` value
    /// matches documents where the field is absent.
    pub fn where_eq(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.filters.push((path.to_string(), value.into()));
        self
    }

    pub fn sort_by(mut self, path: &str, order: SortOrder) -> Self {
        self.sort = Some((path.to_string(), order));
        self
    }

    pub fn newest_first(self, path: &str) -> Self {
        self.sort_by(path, SortOrder::Descending)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn to_sql(
        &self,
        collection: &CollectionPolicy,
    ) -> Result<(String, Vec<SqlValue>), StoreError> {
        let mut sql = format!("SELECT doc FROM {}", collection.name);
        let mut params = Vec::new();
        let mut predicates = Vec::new();

        for (path, value) in &self.filters {
            let ty = field_type(collection, path)?;
            let expr = field_expr(collection, path);
            if value.is_null() {
                predicates.push(format!("{expr} IS NULL"));
                continue;
            }
            params.push(match (ty, value) {
                (Some(FieldType::Timestamp), Value::String(s)) => {
                    SqlValue::Text(canonical_timestamp(s).unwrap_or_else(|| s.clone()))
                }
                (Some(FieldType::Reference { .. }) | None, Value::String(s)) => {
                    SqlValue::Text(canonical_id(s).unwrap_or_else(|| s.clone()))
                }
                _ => to_sql_value(value),
            });
            let placeholder = format!("?{}", params.len());
            if ty == Some(FieldType::Timestamp) {
                predicates.push(format!("{expr} = julianday({placeholder})"));
            } else {
                predicates.push(format!("{expr} = {placeholder}"));
            }
        }
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }

        if let Some((path, order)) = &self.sort {
            field_type(collection, path)?;
            let direction = match order {
                SortOrder::Ascending => "ASC",
                SortOrder::Descending => "DESC",
            };
            sql.push_str(&format!(
                " ORDER BY {} {direction}",
                field_expr(collection, path)
            ));
        }

        if let Some(limit) = self.limit {
            params.push(SqlValue::Integer(limit as i64));
            sql.push_str(&format!(" LIMIT ?{}", params.len()));
        }

        Ok((sql, params))
    }
}

/// `Ok(None)` for `_id`, the declared type otherwise.
fn field_type(collection: &CollectionPolicy, path: &str) -> Result<Option<FieldType>, StoreError> {
    if path == "_id" {
        return Ok(None);
    }
    collection
        .field(path)
        .map(|f| Some(f.ty))
        .ok_or_else(|| StoreError::UnknownField {
            collection: collection.name.to_string(),
            field: path.to_string(),
        })
}

/// Maps a JSON scalar to what `json_extract` yields for it.
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
