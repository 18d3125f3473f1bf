//! Data models for SwasthVault.
//!
//! These are the typed views of the documents stored in the `users` and
//! `medicalrecords` collections. Field names serialize in camelCase so the
//! stored JSON matches the collection policy.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The role an account plays in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    EmergencyPersonnel,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::EmergencyPersonnel => "emergency_personnel",
            Role::Admin => "admin",
        }
    }
}

/// An account record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: String,
    /// bcrypt hash, never the plain credential.
    pub password: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aadhaar_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_of_birth: Option<OffsetDateTime>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

fn default_active() -> bool {
    true
}

impl Account {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Input for registering an account.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub aadhaar_number: Option<String>,
    pub phone_number: Option<String>,
    pub date_of_birth: Option<OffsetDateTime>,
}

/// The kind of clinical encounter a visit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    Consultation,
    FollowUp,
    Emergency,
    RoutineCheckup,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary: Vec<String>,
}

/// A visit record: one encounter between a patient and a doctor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    #[serde(rename = "_id")]
    pub id: String,
    /// `_id` of the patient account.
    pub patient: String,
    /// `_id` of the doctor account.
    pub doctor: String,
    #[serde(with = "time::serde::rfc3339")]
    pub visit_date: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_type: Option<VisitType>,
    #[serde(default)]
    pub diagnosis: Diagnosis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_emergency_accessible: bool,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

/// Input for recording a visit.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVisit {
    pub patient: String,
    pub doctor: String,
    pub visit_date: OffsetDateTime,
    pub visit_type: Option<VisitType>,
    pub diagnosis: Diagnosis,
    pub notes: Option<String>,
    pub is_emergency_accessible: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{CollectionPolicy, ROLES, VISIT_TYPES};
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn roles_serialize_to_policy_values() {
        for role in [Role::Patient, Role::Doctor, Role::EmergencyPersonnel, Role::Admin] {
            let value = serde_json::to_value(role).unwrap();
            assert_eq!(value, json!(role.as_str()));
            assert!(ROLES.contains(&role.as_str()));
        }
    }

    #[test]
    fn visit_types_serialize_to_policy_values() {
        let value = serde_json::to_value(VisitType::FollowUp).unwrap();
        assert_eq!(value, json!("follow_up"));
        assert!(VISIT_TYPES.contains(&"follow_up"));
    }

    #[test]
    fn serialized_account_satisfies_validator() {
        let account = Account {
            id: "a1".into(),
            email: "asha@example.in".into(),
            password: "$2b$04$hash".into(),
            role: Role::Doctor,
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            aadhaar_number: Some("123412341234".into()),
            phone_number: None,
            date_of_birth: Some(datetime!(1985-06-01 0:00 UTC)),
            is_verified: false,
            is_active: true,
            created_at: Some(datetime!(2024-01-01 10:00 UTC)),
            updated_at: None,
        };
        let doc = serde_json::to_value(&account).unwrap();
        assert_eq!(doc["_id"], "a1");
        assert_eq!(doc["firstName"], "Asha");
        assert!(doc.get("phoneNumber").is_none());
        CollectionPolicy::users().validate(&doc).unwrap();
    }

    #[test]
    fn account_defaults_apply_when_flags_are_absent() {
        let account: Account = serde_json::from_value(json!({
            "_id": "x",
            "email": "a@x.com",
            "password": "h",
            "role": "patient",
            "firstName": "A",
            "lastName": "B",
        }))
        .unwrap();
        assert!(account.is_active);
        assert!(!account.is_verified);
        assert_eq!(account.created_at, None);
    }

    #[test]
    fn serialized_visit_satisfies_validator() {
        let visit = Visit {
            id: "v1".into(),
            patient: "1b4e28ba-2fa1-11d2-883f-0016d3cca427".into(),
            doctor: "6fa459ea-ee8a-3ca4-894e-db77e160355e".into(),
            visit_date: datetime!(2024-03-14 9:30 UTC),
            visit_type: Some(VisitType::Consultation),
            diagnosis: Diagnosis {
                primary: Some("Type 2 diabetes".into()),
                secondary: vec!["Hypertension".into()],
            },
            notes: None,
            is_emergency_accessible: true,
            created_at: None,
            updated_at: None,
        };
        let doc = serde_json::to_value(&visit).unwrap();
        assert_eq!(doc["visitDate"], "2024-03-14T09:30:00Z");
        assert_eq!(doc["diagnosis"]["secondary"], json!(["Hypertension"]));
        CollectionPolicy::medical_records().validate(&doc).unwrap();
    }
}
