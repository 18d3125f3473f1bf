//! Schema and index policy for SwasthVault.
//!
//! This module describes, as plain data, what every collection in the vault
//! must look like: which fields a document carries, their types and
//! constraints, and which indexes the store has to build for it. Nothing in
//! here talks to a storage engine. The store in [`crate::db`] reads a
//! [`Policy`] and turns it into tables, indexes and write-time checks, and the
//! validator in [`validate`] checks documents against it directly.

pub mod validate;

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;

pub use validate::{canonical_id, canonical_timestamp, ValidationError, Violation, ViolationKind};

/// Collection holding account records.
pub const USERS: &str = "users";

/// Collection holding visit (clinical encounter) records.
pub const MEDICAL_RECORDS: &str = "medicalrecords";

/// Every role an account may carry.
pub const ROLES: &[&str] = &["patient", "doctor", "emergency_personnel", "admin"];

/// Every kind of visit a record may describe.
pub const VISIT_TYPES: &[&str] = &["consultation", "follow_up", "emergency", "routine_checkup"];

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid email regex")
});

static AADHAAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{12}$").expect("valid aadhaar regex"));

static PATH_SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid path regex"));

/// The JSON shape a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    String,
    Boolean,
    /// An RFC 3339 timestamp string.
    Timestamp,
    /// The `_id` of a document in another collection.
    Reference { collection: &'static str },
    Object,
    /// An array whose items are all strings.
    StringList,
}

impl FieldType {
    /// Short name used in violation messages.
    pub fn describe(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Timestamp => "RFC 3339 timestamp",
            FieldType::Reference { .. } => "document reference",
            FieldType::Object => "object",
            FieldType::StringList => "list of strings",
        }
    }
}

/// Named value patterns a string field can be held to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    Email,
    /// Twelve-digit Aadhaar identifier.
    Aadhaar,
}

impl Pattern {
    pub fn is_match(&self, value: &str) -> bool {
        match self {
            Pattern::Email => EMAIL_RE.is_match(value),
            Pattern::Aadhaar => AADHAAR_RE.is_match(value),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Pattern::Email => "email address",
            Pattern::Aadhaar => "12-digit Aadhaar number",
        }
    }
}

/// Constraints on a single (possibly nested) document field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldRule {
    /// Dotted path from the document root, e.g. `diagnosis.primary`.
    pub path: &'static str,
    #[serde(flatten)]
    pub ty: FieldType,
    pub required: bool,
    pub non_empty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_of: Option<&'static [&'static str]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
}

impl FieldRule {
    pub fn required(path: &'static str, ty: FieldType) -> Self {
        Self {
            path,
            ty,
            required: true,
            non_empty: false,
            one_of: None,
            pattern: None,
        }
    }

    pub fn optional(path: &'static str, ty: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(path, ty)
        }
    }

    pub fn non_empty(mut self) -> Self {
        self.non_empty = true;
        self
    }

    pub fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.one_of = Some(values);
        self
    }

    pub fn pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = Some(pattern);
        self
    }
}

/// How a single key participates in an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrder {
    Ascending,
    Descending,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexKey {
    pub path: &'static str,
    pub order: IndexOrder,
}

/// An index the store must maintain for a collection.
///
/// `sparse` only has meaning together with `unique`: documents that do not
/// carry the indexed field are left out of the uniqueness check entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<IndexKey>,
    pub unique: bool,
    pub sparse: bool,
}

impl IndexSpec {
    fn single(collection: &str, path: &'static str, order: IndexOrder, suffix: &str) -> Self {
        Self {
            name: format!("{collection}_{}_{suffix}", path.replace('.', "_")),
            keys: vec![IndexKey { path, order }],
            unique: false,
            sparse: false,
        }
    }

    /// Non-unique lookup index.
    pub fn ascending(collection: &str, path: &'static str) -> Self {
        Self::single(collection, path, IndexOrder::Ascending, "idx")
    }

    /// Non-unique index ordered newest/largest first.
    pub fn descending(collection: &str, path: &'static str) -> Self {
        Self::single(collection, path, IndexOrder::Descending, "desc")
    }

    pub fn unique(collection: &str, path: &'static str) -> Self {
        Self {
            unique: true,
            ..Self::single(collection, path, IndexOrder::Ascending, "unique")
        }
    }

    /// Unique index that ignores documents missing the field.
    pub fn sparse_unique(collection: &str, path: &'static str) -> Self {
        Self {
            unique: true,
            sparse: true,
            ..Self::single(collection, path, IndexOrder::Ascending, "sparse_unique")
        }
    }

    /// Full-text index over one or more string fields.
    pub fn text(collection: &str, paths: &[&'static str]) -> Self {
        Self {
            name: format!("{collection}_text"),
            keys: paths
                .iter()
                .map(|&path| IndexKey {
                    path,
                    order: IndexOrder::Text,
                })
                .collect(),
            unique: false,
            sparse: false,
        }
    }

    pub fn is_text(&self) -> bool {
        self.keys.iter().any(|k| k.order == IndexOrder::Text)
    }

    /// The field a conflict on this index is reported against.
    pub fn primary_path(&self) -> &'static str {
        self.keys.first().map(|k| k.path).unwrap_or("_id")
    }
}

/// Validator and index declarations for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionPolicy {
    pub name: &'static str,
    pub fields: Vec<FieldRule>,
    pub indexes: Vec<IndexSpec>,
}

impl CollectionPolicy {
    pub fn field(&self, path: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|f| f.path == path)
    }

    pub fn index(&self, name: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn text_index(&self) -> Option<&IndexSpec> {
        self.indexes.iter().find(|i| i.is_text())
    }

    /// Account records (`users`).
    pub fn users() -> Self {
        use FieldType::*;
        Self {
            name: USERS,
            fields: vec![
                FieldRule::required("email", String).pattern(Pattern::Email),
                FieldRule::required("password", String).non_empty(),
                FieldRule::required("role", String).one_of(ROLES),
                FieldRule::required("firstName", String).non_empty(),
                FieldRule::required("lastName", String).non_empty(),
                FieldRule::optional("aadhaarNumber", String).pattern(Pattern::Aadhaar),
                FieldRule::optional("phoneNumber", String),
                FieldRule::optional("dateOfBirth", Timestamp),
                FieldRule::optional("isVerified", Boolean),
                FieldRule::optional("isActive", Boolean),
                FieldRule::optional("createdAt", Timestamp),
                FieldRule::optional("updatedAt", Timestamp),
            ],
            indexes: vec![
                IndexSpec::unique(USERS, "email"),
                IndexSpec::sparse_unique(USERS, "aadhaarNumber"),
                IndexSpec::ascending(USERS, "role"),
                IndexSpec::ascending(USERS, "isVerified"),
            ],
        }
    }

    /// Visit records (`medicalrecords`).
    pub fn medical_records() -> Self {
        use FieldType::*;
        Self {
            name: MEDICAL_RECORDS,
            fields: vec![
                FieldRule::required("patient", Reference { collection: USERS }),
                FieldRule::required("doctor", Reference { collection: USERS }),
                FieldRule::required("visitDate", Timestamp),
                FieldRule::optional("visitType", String).one_of(VISIT_TYPES),
                FieldRule::optional("diagnosis", Object),
                FieldRule::optional("diagnosis.primary", String),
                FieldRule::optional("diagnosis.secondary", StringList),
                FieldRule::optional("notes", String),
                FieldRule::optional("isEmergencyAccessible", Boolean),
                FieldRule::optional("createdAt", Timestamp),
                FieldRule::optional("updatedAt", Timestamp),
            ],
            indexes: vec![
                IndexSpec::ascending(MEDICAL_RECORDS, "patient"),
                IndexSpec::ascending(MEDICAL_RECORDS, "doctor"),
                IndexSpec::descending(MEDICAL_RECORDS, "visitDate"),
                IndexSpec::ascending(MEDICAL_RECORDS, "isEmergencyAccessible"),
                IndexSpec::text(MEDICAL_RECORDS, &["diagnosis.primary", "diagnosis.secondary"]),
            ],
        }
    }
}

/// Reasons a policy cannot be applied at all.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("collection `{0}` is declared more than once")]
    DuplicateCollection(String),
    #[error("index name `{0}` is declared more than once")]
    DuplicateIndex(String),
    #[error("index `{index}` has no keys")]
    EmptyIndex { index: String },
    #[error("index `{index}` references undeclared field `{path}`")]
    UndeclaredIndexField { index: String, path: String },
    #[error("text index `{index}` covers non-text field `{path}`")]
    TextIndexOnNonText { index: String, path: String },
    #[error("collection `{0}` declares more than one text index")]
    MultipleTextIndexes(String),
    #[error("`{0}` is not a valid collection name or field path")]
    UnsafeName(String),
}

/// The full set of collection policies the vault enforces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Policy {
    pub collections: Vec<CollectionPolicy>,
}

impl Policy {
    /// The SwasthVault policy: `users` and `medicalrecords`.
    pub fn swasthvault() -> Self {
        Self {
            collections: vec![CollectionPolicy::users(), CollectionPolicy::medical_records()],
        }
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionPolicy> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Checks that the policy is internally consistent.
    ///
    /// Names and paths end up inside generated SQL, so anything that is not a
    /// plain identifier (or dotted chain of identifiers) is refused here.
    pub fn check(&self) -> Result<(), PolicyError> {
        let mut collections = HashSet::new();
        let mut index_names = HashSet::new();

        for collection in &self.collections {
            if !is_safe_path(collection.name) || collection.name.contains('.') {
                return Err(PolicyError::UnsafeName(collection.name.to_string()));
            }
            if !collections.insert(collection.name) {
                return Err(PolicyError::DuplicateCollection(collection.name.to_string()));
            }
            for field in &collection.fields {
                if !is_safe_path(field.path) {
                    return Err(PolicyError::UnsafeName(field.path.to_string()));
                }
            }

            let mut text_indexes = 0;
            for index in &collection.indexes {
                if !is_safe_path(&index.name) || index.name.contains('.') {
                    return Err(PolicyError::UnsafeName(index.name.clone()));
                }
                if !index_names.insert(index.name.as_str()) {
                    return Err(PolicyError::DuplicateIndex(index.name.clone()));
                }
                if index.keys.is_empty() {
                    return Err(PolicyError::EmptyIndex {
                        index: index.name.clone(),
                    });
                }
                if index.is_text() {
                    text_indexes += 1;
                }
                for key in &index.keys {
                    let field = collection.field(key.path).ok_or_else(|| {
                        PolicyError::UndeclaredIndexField {
                            index: index.name.clone(),
                            path: key.path.to_string(),
                        }
                    })?;
                    if key.order == IndexOrder::Text
                        && !matches!(field.ty, FieldType::String | FieldType::StringList)
                    {
                        return Err(PolicyError::TextIndexOnNonText {
                            index: index.name.clone(),
                            path: key.path.to_string(),
                        });
                    }
                }
            }
            if text_indexes > 1 {
                return Err(PolicyError::MultipleTextIndexes(collection.name.to_string()));
            }
        }
        Ok(())
    }
}

/// `true` for `name` or `a.b.c` where every segment is a plain identifier.
pub fn is_safe_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(|seg| PATH_SEGMENT_RE.is_match(seg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swasthvault_policy_is_consistent() {
        assert_eq!(Policy::swasthvault().check(), Ok(()));
    }

    #[test]
    fn users_declare_unique_email_and_sparse_aadhaar() {
        let users = CollectionPolicy::users();
        let email = users.index("users_email_unique").unwrap();
        assert!(email.unique && !email.sparse);

        let aadhaar = users.index("users_aadhaarNumber_sparse_unique").unwrap();
        assert!(aadhaar.unique && aadhaar.sparse);
        assert_eq!(aadhaar.primary_path(), "aadhaarNumber");

        for name in ["users_role_idx", "users_isVerified_idx"] {
            let idx = users.index(name).unwrap();
            assert!(!idx.unique, "{name} must not be unique");
        }
    }

    #[test]
    fn visits_declare_lookup_recency_and_text_indexes() {
        let visits = CollectionPolicy::medical_records();
        for name in [
            "medicalrecords_patient_idx",
            "medicalrecords_doctor_idx",
            "medicalrecords_isEmergencyAccessible_idx",
        ] {
            assert!(visits.index(name).is_some(), "missing {name}");
        }
        let recency = visits.index("medicalrecords_visitDate_desc").unwrap();
        assert_eq!(recency.keys[0].order, IndexOrder::Descending);

        let text = visits.text_index().unwrap();
        let paths: Vec<_> = text.keys.iter().map(|k| k.path).collect();
        assert_eq!(paths, ["diagnosis.primary", "diagnosis.secondary"]);
    }

    #[test]
    fn role_is_restricted_to_four_values() {
        let users = CollectionPolicy::users();
        assert_eq!(users.field("role").unwrap().one_of, Some(ROLES));
        assert_eq!(ROLES.len(), 4);
    }

    #[test]
    fn check_rejects_index_on_undeclared_field() {
        let mut policy = Policy::swasthvault();
        policy.collections[0]
            .indexes
            .push(IndexSpec::ascending(USERS, "nickname"));
        assert_eq!(
            policy.check(),
            Err(PolicyError::UndeclaredIndexField {
                index: "users_nickname_idx".into(),
                path: "nickname".into(),
            })
        );
    }

    #[test]
    fn check_rejects_duplicate_index_names() {
        let mut policy = Policy::swasthvault();
        policy.collections[0]
            .indexes
            .push(IndexSpec::ascending(USERS, "role"));
        assert_eq!(
            policy.check(),
            Err(PolicyError::DuplicateIndex("users_role_idx".into()))
        );
    }

    #[test]
    fn check_rejects_text_index_on_boolean() {
        let mut policy = Policy::swasthvault();
        policy.collections[0].indexes.push(IndexSpec {
            name: "users_flags_text".into(),
            keys: vec![IndexKey {
                path: "isActive",
                order: IndexOrder::Text,
            }],
            unique: false,
            sparse: false,
        });
        assert!(matches!(
            policy.check(),
            Err(PolicyError::TextIndexOnNonText { .. })
        ));
    }

    #[test]
    fn check_rejects_unsafe_paths() {
        let mut policy = Policy::swasthvault();
        policy.collections[1]
            .fields
            .push(FieldRule::optional("notes'); DROP TABLE users; --", FieldType::String));
        assert!(matches!(policy.check(), Err(PolicyError::UnsafeName(_))));
    }

    #[test]
    fn safe_path_accepts_dotted_identifiers() {
        assert!(is_safe_path("diagnosis.primary"));
        assert!(is_safe_path("_id"));
        assert!(!is_safe_path("diagnosis..primary"));
        assert!(!is_safe_path("1st"));
        assert!(!is_safe_path(""));
    }

    #[test]
    fn patterns_match_expected_shapes() {
        assert!(Pattern::Email.is_match("admin@swasthvault.com"));
        assert!(Pattern::Email.is_match("a.b+c@x.co.in"));
        assert!(!Pattern::Email.is_match("not-an-email"));
        assert!(!Pattern::Email.is_match("a@b"));
        assert!(Pattern::Aadhaar.is_match("123412341234"));
        assert!(!Pattern::Aadhaar.is_match("1234 1234 1234"));
    }
}
