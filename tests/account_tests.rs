//! Integration tests for the secret store.

use std::fs;

use cabinet::account::SecretStore;
use cabinet::crypto::Argon2Params;
use cabinet::VaultError;
use tempfile::TempDir;

fn fast_params() -> Argon2Params {
    Argon2Params {
        memory_kib: 8_192,
        iterations: 1,
        parallelism: 1,
    }
}

fn store(dir: &TempDir) -> SecretStore {
    SecretStore::new(&dir.path().join("secrets"), fast_params())
}

// ---------------------------------------------------------------------------
// Creation and loading
// ---------------------------------------------------------------------------

#[test]
fn first_load_creates_the_record() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    assert!(store.load_account("alice").unwrap().is_none());

    let opened = store.load_or_create_account("alice", b"p@ss").unwrap();
    assert!(opened.created);
    assert!(opened.record.key_check.is_some());
    assert_eq!(opened.record.argon2_params, fast_params());
    assert!(store.record_path("alice").exists());

    let loaded = store.load_account("alice").unwrap().unwrap();
    assert_eq!(loaded, opened.record);
}

#[test]
fn same_password_derives_the_same_key() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let first = store.load_or_create_account("alice", b"p@ss").unwrap();
    let second = store.load_or_create_account("alice", b"p@ss").unwrap();
    assert!(!second.created);

    let a = first.key.derive_vault_key("personal").unwrap();
    let b = second.key.derive_vault_key("personal").unwrap();
    assert_eq!(a.as_bytes(), b.as_bytes());
}

#[test]
fn loading_never_rewrites_the_record() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.load_or_create_account("alice", b"p@ss").unwrap();

    let before = fs::read(store.record_path("alice")).unwrap();
    store.load_or_create_account("alice", b"p@ss").unwrap();
    store.load_or_create_account("alice", b"wrong").unwrap();
    let after = fs::read(store.record_path("alice")).unwrap();

    assert_eq!(before, after);
}

#[test]
fn record_contains_no_password() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store
        .load_or_create_account("alice", b"correct-horse-battery")
        .unwrap();

    let text = fs::read_to_string(store.record_path("alice")).unwrap();
    assert!(!text.contains("correct-horse-battery"));
    assert!(text.contains("\"salt\""));
}

#[cfg(unix)]
#[test]
fn record_has_restrictive_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.load_or_create_account("alice", b"p@ss").unwrap();

    let mode = fs::metadata(store.record_path("alice"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

#[test]
fn verify_accepts_right_and_rejects_wrong_password() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let created = store.load_or_create_account("alice", b"p@ss").unwrap();
    assert!(store.verify("alice", &created.key).unwrap());

    let wrong = store.load_or_create_account("alice", b"wrong").unwrap();
    assert!(!store.verify("alice", &wrong.key).unwrap());
}

#[test]
fn verify_unknown_account_is_account_not_found() {
    let dir = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    let key = store(&other)
        .load_or_create_account("bob", b"pw")
        .unwrap()
        .key;

    let err = store(&dir).verify("ghost", &key).unwrap_err();
    assert!(matches!(err, VaultError::AccountNotFound(_)), "got {err:?}");
}

#[test]
fn legacy_record_without_key_check_verifies_true() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let mut record = store.load_or_create_account("alice", b"p@ss").unwrap().record;
    record.key_check = None;
    store.replace_record(&record).unwrap();

    let text = fs::read_to_string(store.record_path("alice")).unwrap();
    assert!(!text.contains("key_check"));

    let wrong = store.load_or_create_account("alice", b"wrong").unwrap();
    assert!(store.verify("alice", &wrong.key).unwrap());
}

// ---------------------------------------------------------------------------
// Replacement and corruption
// ---------------------------------------------------------------------------

#[test]
fn replace_record_swaps_password() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    let mut record = store.load_or_create_account("alice", b"old").unwrap().record;

    let new_key = record.derive_key(b"new").unwrap();
    record.key_check = Some(new_key.key_check("alice").unwrap());
    store.replace_record(&record).unwrap();

    let reopened = store.load_or_create_account("alice", b"new").unwrap();
    assert!(store.verify("alice", &reopened.key).unwrap());
    let stale = store.load_or_create_account("alice", b"old").unwrap();
    assert!(!store.verify("alice", &stale.key).unwrap());
}

#[test]
fn replace_record_requires_existing_account() {
    let dir = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    let record = store(&other)
        .load_or_create_account("alice", b"pw")
        .unwrap()
        .record;

    let err = store(&dir).replace_record(&record).unwrap_err();
    assert!(matches!(err, VaultError::AccountNotFound(_)));
}

#[test]
fn malformed_record_is_account_corrupt() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.load_or_create_account("alice", b"pw").unwrap();

    fs::write(store.record_path("alice"), b"[1, 2, 3]").unwrap();
    assert!(matches!(
        store.load_account("alice"),
        Err(VaultError::AccountCorrupt(_))
    ));
}

#[test]
fn record_for_another_account_is_account_corrupt() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.load_or_create_account("alice", b"pw").unwrap();
    store.load_or_create_account("bob", b"pw").unwrap();

    fs::copy(store.record_path("alice"), store.record_path("bob")).unwrap();
    assert!(matches!(
        store.load_account("bob"),
        Err(VaultError::AccountCorrupt(_))
    ));
}

#[test]
fn invalid_account_ids_are_rejected() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    for bad in ["", "../escape", "a/b", ".hidden"] {
        assert!(
            matches!(
                store.load_or_create_account(bad, b"pw"),
                Err(VaultError::InvalidName(_))
            ),
            "{bad:?}"
        );
    }
}
