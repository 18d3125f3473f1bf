//! Visit repository over the `medicalrecords` collection.
//!
//! The store does not follow references between collections. Before a visit
//! is written, this module checks that `patient` names an existing patient
//! account and `doctor` an existing doctor account.

use super::accounts::get_account;
use super::{Query, StoreError, Vault};
use crate::models::{NewVisit, Role, Visit};
use crate::policy::MEDICAL_RECORDS;
use time::OffsetDateTime;
use uuid::Uuid;

/// Records a clinical encounter.
///
/// # Errors
///
/// [`StoreError::InvalidReference`] if either account is missing or holds the
/// wrong role, [`StoreError::Validation`] if the document breaks the
/// `medicalrecords` validator.
pub fn create_visit(vault: &Vault, new: NewVisit) -> Result<Visit, StoreError> {
    check_reference(vault, "patient", &new.patient, Role::Patient)?;
    check_reference(vault, "doctor", &new.doctor, Role::Doctor)?;

    let now = OffsetDateTime::now_utc();
    let visit = Visit {
        id: Uuid::new_v4().to_string(),
        patient: new.patient,
        doctor: new.doctor,
        visit_date: new.visit_date,
        visit_type: new.visit_type,
        diagnosis: new.diagnosis,
        notes: new.notes,
        is_emergency_accessible: new.is_emergency_accessible,
        created_at: Some(now),
        updated_at: Some(now),
    };
    vault.insert(MEDICAL_RECORDS, serde_json::to_value(&visit)?)?;
    tracing::info!(visit = %visit.id, patient = %visit.patient, "visit recorded");
    Ok(visit)
}

/// Fetches a visit by `_id`. `None` if no such visit exists.
pub fn get_visit(vault: &Vault, id: &str) -> Result<Option<Visit>, StoreError> {
    vault
        .get(MEDICAL_RECORDS, id)?
        .map(serde_json::from_value)
        .transpose()
        .map_err(StoreError::from)
}

/// Writes `visit` back in place. References are checked again.
///
/// # Errors
///
/// As for [`create_visit`], plus [`StoreError::NotFound`] if the visit was
/// never stored.
pub fn update_visit(vault: &Vault, visit: &Visit) -> Result<Visit, StoreError> {
    check_reference(vault, "patient", &visit.patient, Role::Patient)?;
    check_reference(vault, "doctor", &visit.doctor, Role::Doctor)?;

    let mut updated = visit.clone();
    updated.updated_at = Some(OffsetDateTime::now_utc());
    vault.replace(MEDICAL_RECORDS, &updated.id, serde_json::to_value(&updated)?)?;
    Ok(updated)
}

/// A patient's visits, most recent first.
pub fn visits_for_patient(vault: &Vault, patient_id: &str) -> Result<Vec<Visit>, StoreError> {
    visits(
        vault,
        &Query::new()
            .where_eq("patient", patient_id)
            .newest_first("visitDate"),
    )
}

/// A doctor's visits, most recent first.
pub fn visits_for_doctor(vault: &Vault, doctor_id: &str) -> Result<Vec<Visit>, StoreError> {
    visits(
        vault,
        &Query::new()
            .where_eq("doctor", doctor_id)
            .newest_first("visitDate"),
    )
}

/// The part of a patient's history emergency personnel may see.
pub fn emergency_visits_for_patient(
    vault: &Vault,
    patient_id: &str,
) -> Result<Vec<Visit>, StoreError> {
    visits(
        vault,
        &Query::new()
            .where_eq("patient", patient_id)
            .where_eq("isEmergencyAccessible", true)
            .newest_first("visitDate"),
    )
}

/// Keyword search over primary and secondary diagnoses.
pub fn search_diagnoses(vault: &Vault, terms: &str, limit: usize) -> Result<Vec<Visit>, StoreError> {
    vault
        .text_search(MEDICAL_RECORDS, terms, limit)?
        .into_iter()
        .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
        .collect()
}

fn check_reference(vault: &Vault, field: &str, id: &str, expected: Role) -> Result<(), StoreError> {
    match get_account(vault, id)? {
        Some(account) if account.role == expected => Ok(()),
        _ => Err(StoreError::InvalidReference {
            field: field.to_string(),
            id: id.to_string(),
            expected: expected.as_str().to_string(),
        }),
    }
}

fn visits(vault: &Vault, query: &Query) -> Result<Vec<Visit>, StoreError> {
    vault
        .find(MEDICAL_RECORDS, query)?
        .into_iter()
        .map(|doc| serde_json::from_value(doc).map_err(StoreError::from))
        .collect()
}
