//! Document validation against a [`CollectionPolicy`].

use super::{CollectionPolicy, FieldRule, FieldType};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    NotAnObject,
    Missing,
    WrongType { expected: &'static str },
    Empty,
    NotAllowed { value: String },
    PatternMismatch { expected: &'static str },
}

/// One field that failed its rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::NotAnObject => write!(f, "document is not an object"),
            ViolationKind::Missing => write!(f, "`{}` is required", self.path),
            ViolationKind::WrongType { expected } => {
                write!(f, "`{}` must be a {expected}", self.path)
            }
            ViolationKind::Empty => write!(f, "`{}` must not be empty", self.path),
            ViolationKind::NotAllowed { value } => {
                write!(f, "`{}` does not allow {value:?}", self.path)
            }
            ViolationKind::PatternMismatch { expected } => {
                write!(f, "`{}` must be a valid {expected}", self.path)
            }
        }
    }
}

/// A document was rejected by a collection validator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("document failed `{collection}` validation: {}", join(.violations))]
pub struct ValidationError {
    pub collection: String,
    pub violations: Vec<Violation>,
}

impl ValidationError {
    /// `true` if any violation concerns `path`.
    pub fn touches(&self, path: &str) -> bool {
        self.violations.iter().any(|v| v.path == path)
    }
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Resolves a dotted path inside a JSON document.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |value, segment| value.get(segment))
}

fn lookup_mut<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut value = doc;
    for segment in path.split('.') {
        value = value.get_mut(segment)?;
    }
    Some(value)
}

/// Re-renders an RFC 3339 timestamp in UTC with upper-case `T` and `Z`.
///
/// SQLite's date functions only read that spelling, so every stored and
/// queried timestamp goes through here. `None` if `text` does not parse.
pub fn canonical_timestamp(text: &str) -> Option<String> {
    OffsetDateTime::parse(text, &Rfc3339)
        .ok()?
        .to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .ok()
}

/// Re-renders a UUID in lower-case hyphenated form. `None` if `text` is not
/// a UUID.
pub fn canonical_id(text: &str) -> Option<String> {
    Uuid::parse_str(text).ok().map(|id| id.hyphenated().to_string())
}

impl CollectionPolicy {
    /// Checks `doc` against every field rule of this collection.
    ///
    /// All violations are reported, not only the first one. Fields the
    /// policy does not mention are accepted as-is.
    pub fn validate(&self, doc: &Value) -> Result<(), ValidationError> {
        let violations = if doc.is_object() {
            self.fields
                .iter()
                .filter_map(|rule| check_field(rule, lookup(doc, rule.path)))
                .collect()
        } else {
            vec![Violation {
                path: String::new(),
                kind: ViolationKind::NotAnObject,
            }]
        };

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                collection: self.name.to_string(),
                violations,
            })
        }
    }
}

impl CollectionPolicy {
    /// Rewrites timestamp and reference fields of a validated document into
    /// their canonical spelling. Returns `true` if anything changed.
    pub fn canonicalize(&self, doc: &mut Value) -> bool {
        let mut changed = false;
        for rule in &self.fields {
            let canonical: fn(&str) -> Option<String> = match rule.ty {
                FieldType::Timestamp => canonical_timestamp,
                FieldType::Reference { .. } => canonical_id,
                _ => continue,
            };
            if let Some(Value::String(text)) = lookup_mut(doc, rule.path) {
                if let Some(fixed) = canonical(text) {
                    if fixed != *text {
                        *text = fixed;
                        changed = true;
                    }
                }
            }
        }
        changed
    }
}

fn check_field(rule: &FieldRule, value: Option<&Value>) -> Option<Violation> {
    let violation = |kind| {
        Some(Violation {
            path: rule.path.to_string(),
            kind,
        })
    };

    let value = match value {
        None | Some(Value::Null) if rule.required => return violation(ViolationKind::Missing),
        None | Some(Value::Null) => return None,
        Some(value) => value,
    };

    if !has_type(rule.ty, value) {
        return violation(ViolationKind::WrongType {
            expected: rule.ty.describe(),
        });
    }

    if let Value::String(text) = value {
        if rule.non_empty && text.trim().is_empty() {
            return violation(ViolationKind::Empty);
        }
        if let Some(allowed) = rule.one_of {
            if !allowed.contains(&text.as_str()) {
                return violation(ViolationKind::NotAllowed {
                    value: text.clone(),
                });
            }
        }
        if let Some(pattern) = rule.pattern {
            if !pattern.is_match(text) {
                return violation(ViolationKind::PatternMismatch {
                    expected: pattern.name(),
                });
            }
        }
    }
    None
}

fn has_type(ty: FieldType, value: &Value) -> bool {
    match (ty, value) {
        (FieldType::String, Value::String(_)) => true,
        (FieldType::Boolean, Value::Bool(_)) => true,
        (FieldType::Timestamp, Value::String(s)) => canonical_timestamp(s).is_some(),
        (FieldType::Reference { .. }, Value::String(s)) => canonical_id(s).is_some(),
        (FieldType::Object, Value::Object(_)) => true,
        (FieldType::StringList, Value::Array(items)) => items.iter().all(Value::is_string),
        _ => false,
    }
}
