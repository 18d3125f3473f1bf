use serde_json::{json, Value};
use swasthvault::config::{BootstrapAdmin, Config};
use swasthvault::policy::{MEDICAL_RECORDS, ROLES, USERS};
use swasthvault::{init_db, Policy, Query, StoreError, Vault};
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> Config {
    Config {
        database_path: dir.path().join("vault.db"),
        bootstrap: BootstrapAdmin {
            bcrypt_cost: 4,
            ..BootstrapAdmin::default()
        },
    }
}

fn memory_vault() -> Vault {
    let mut vault = Vault::open_in_memory(Policy::swasthvault()).unwrap();
    vault.apply_policy().unwrap();
    vault
}

fn account(email: &str) -> Value {
    json!({
        "email": email,
        "role": "patient",
        "firstName": "A",
        "lastName": "B",
        "password": "h",
    })
}

#[test]
fn duplicate_email_conflicts_but_new_email_succeeds() {
    let vault = memory_vault();
    vault.insert(USERS, account("a@x.com")).unwrap();

    let err = vault.insert(USERS, account("a@x.com")).unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {err:?}");
    assert!(!err.is_validation());

    vault.insert(USERS, account("b@x.com")).unwrap();
    assert_eq!(vault.count(USERS).unwrap(), 2);
}

#[test]
fn sparse_aadhaar_uniqueness() {
    let vault = memory_vault();

    let mut first = account("one@x.com");
    first["aadhaarNumber"] = json!("999988887777");
    vault.insert(USERS, first).unwrap();

    let mut second = account("two@x.com");
    second["aadhaarNumber"] = json!("999988887777");
    match vault.insert(USERS, second).unwrap_err() {
        StoreError::Conflict { index, field, .. } => {
            assert_eq!(index, "users_aadhaarNumber_sparse_unique");
            assert_eq!(field, "aadhaarNumber");
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    for email in ["three@x.com", "four@x.com", "five@x.com"] {
        vault.insert(USERS, account(email)).unwrap();
    }
}

#[test]
fn only_enumerated_roles_are_accepted() {
    let vault = memory_vault();
    for (i, role) in ROLES.iter().enumerate() {
        let mut doc = account(&format!("user{i}@x.com"));
        doc["role"] = json!(role);
        vault.insert(USERS, doc).unwrap();
    }
    for role in ["nurse", "Admin", "", "root"] {
        let mut doc = account("other@x.com");
        doc["role"] = json!(role);
        let err = vault.insert(USERS, doc).unwrap_err();
        assert!(err.is_validation(), "role {role:?} should be rejected");
    }
}

#[test]
fn visit_without_required_fields_is_rejected() {
    let vault = memory_vault();
    let complete = json!({
        "patient": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
        "doctor": "6fa459ea-ee8a-3ca4-894e-db77e160355e",
        "visitDate": "2024-03-14T09:30:00Z",
        "diagnosis": { "primary": "Bronchitis" },
        "isEmergencyAccessible": false,
    });

    for field in ["patient", "doctor", "visitDate"] {
        let mut doc = complete.clone();
        doc.as_object_mut().unwrap().remove(field);
        let err = vault.insert(MEDICAL_RECORDS, doc).unwrap_err();
        match err {
            StoreError::Validation(e) => assert!(e.touches(field)),
            other => panic!("expected validation error for {field}, got {other:?}"),
        }
    }
    assert_eq!(vault.count(MEDICAL_RECORDS).unwrap(), 0);

    vault.insert(MEDICAL_RECORDS, complete).unwrap();
}

#[test]
fn initialization_twice_leaves_one_bootstrap_admin() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);

    let vault = init_db(&config).unwrap();
    drop(vault);
    let vault = init_db(&config).unwrap();

    let admins = vault
        .find(USERS, &Query::new().where_eq("email", "admin@swasthvault.com"))
        .unwrap();
    assert_eq!(admins.len(), 1);
    let admin = &admins[0];
    assert_eq!(admin["role"], "admin");
    assert_eq!(admin["firstName"], "System");
    assert_eq!(admin["lastName"], "Administrator");
    assert_eq!(admin["isVerified"], true);
    assert_eq!(admin["isActive"], true);
    assert_eq!(vault.count(USERS).unwrap(), 1);
}

#[test]
fn constraints_survive_reopening() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    {
        let vault = init_db(&config).unwrap();
        vault.insert(USERS, account("a@x.com")).unwrap();
    }

    let vault = init_db(&config).unwrap();
    assert!(vault.insert(USERS, account("a@x.com")).unwrap_err().is_conflict());
    assert!(vault.has_index("medicalrecords_text").unwrap());
}

#[test]
fn bootstrap_admin_can_log_in_with_configured_credential() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.bootstrap.password = "rotated-before-prod".into();

    let vault = init_db(&config).unwrap();
    let admin = swasthvault::auth::login(
        &vault,
        &swasthvault::auth::Credentials {
            email: "admin@swasthvault.com".into(),
            password: "rotated-before-prod".into(),
        },
    )
    .unwrap();
    assert_eq!(admin.role, swasthvault::models::Role::Admin);
}

#[test]
fn initialization_refuses_bootstrap_email_held_by_a_patient() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    {
        let mut vault = Vault::open(&config.database_path, Policy::swasthvault()).unwrap();
        vault.apply_policy().unwrap();
        vault.insert(USERS, account("admin@swasthvault.com")).unwrap();
    }

    let err = init_db(&config).unwrap_err();
    let chain = format!("{err:#}");
    assert!(chain.contains("belongs to a `patient` account"), "{chain}");
}

#[test]
fn timestamps_with_lowercase_separators_order_by_instant() {
    let vault = memory_vault();
    let visit = |date: &str| {
        json!({
            "patient": "1b4e28ba-2fa1-11d2-883f-0016d3cca427",
            "doctor": "6fa459ea-ee8a-3ca4-894e-db77e160355e",
            "visitDate": date,
            "diagnosis": { "primary": date },
        })
    };
    vault.insert(MEDICAL_RECORDS, visit("2025-01-01t00:00:00z")).unwrap();
    vault.insert(MEDICAL_RECORDS, visit("2024-06-01T00:00:00Z")).unwrap();

    let newest = vault
        .find(MEDICAL_RECORDS, &Query::new().newest_first("visitDate").limit(1))
        .unwrap();
    assert_eq!(newest[0]["visitDate"], "2025-01-01T00:00:00Z");
}
