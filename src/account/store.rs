//! Secret store: one credential record per account.
//!
//! Records are written only when an account is created (or when a
//! record is explicitly replaced, e.g. by a password rotation); every
//! read path is side-effect free.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use super::record::{AccountRecord, RECORD_VERSION};
use super::validate_identifier;
use crate::crypto::kdf::{generate_salt, Argon2Params};
use crate::crypto::AccountKey;
use crate::errors::{Result, VaultError};
use crate::vault::format::write_atomic;

/// An account's record together with the key derived for this session.
pub struct OpenedAccount {
    pub record: AccountRecord,
    pub key: AccountKey,
    /// `true` if the record was created by this call.
    pub created: bool,
}

/// Directory of account records.
#[derive(Debug, Clone)]
pub struct SecretStore {
    dir: PathBuf,
    /// KDF parameters used for accounts created from now on.
    params: Argon2Params,
}

impl SecretStore {
    pub fn new(dir: &Path, params: Argon2Params) -> Self {
        Self {
            dir: dir.to_path_buf(),
            params,
        }
    }

    /// Path of the record for `account_id`.
    pub fn record_path(&self, account_id: &str) -> PathBuf {
        self.dir.join(format!("{account_id}.json"))
    }

    /// Read an account record.  `None` if the account does not exist.
    pub fn load_account(&self, account_id: &str) -> Result<Option<AccountRecord>> {
        validate_identifier("account id", account_id)?;

        let contents = match fs::read(self.record_path(account_id)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: AccountRecord = serde_json::from_slice(&contents)
            .map_err(|e| VaultError::AccountCorrupt(format!("{account_id}: {e}")))?;
        record.validate(account_id)?;
        Ok(Some(record))
    }

    /// Load the account and derive its key, creating the account first
    /// if it does not exist yet.
    ///
    /// Creation generates a fresh salt, derives the key, and persists
    /// the record with its key check in a single write.  For an existing
    /// account the stored salt and KDF parameters are used; the caller
    /// still has to `verify` the returned key.
    pub fn load_or_create_account(&self, account_id: &str, password: &[u8]) -> Result<OpenedAccount> {
        if let Some(record) = self.load_account(account_id)? {
            let key = record.derive_key(password)?;
            return Ok(OpenedAccount {
                record,
                key,
                created: false,
            });
        }

        let mut record = AccountRecord {
            version: RECORD_VERSION,
            account_id: account_id.to_string(),
            salt: generate_salt().to_vec(),
            argon2_params: self.params,
            key_check: None,
            created_at: Utc::now(),
        };
        let key = record.derive_key(password)?;
        record.key_check = Some(key.key_check(account_id)?);

        fs::create_dir_all(&self.dir)?;
        self.write_record(&record)?;
        info!(account = account_id, "Created account record");

        Ok(OpenedAccount {
            record,
            key,
            created: true,
        })
    }

    /// Check `candidate` against the stored key check.
    ///
    /// Returns `Ok(true)` when the record has no key check; the first
    /// decrypt then decides.
    pub fn verify(&self, account_id: &str, candidate: &AccountKey) -> Result<bool> {
        let record = self
            .load_account(account_id)?
            .ok_or_else(|| VaultError::AccountNotFound(account_id.to_string()))?;
        record.verify(candidate)
    }

    /// Overwrite an existing account's record.
    ///
    /// This is the hook for password rotation: the caller re-encrypts the
    /// account's vaults under the new key, then swaps the record.
    pub fn replace_record(&self, record: &AccountRecord) -> Result<()> {
        validate_identifier("account id", &record.account_id)?;
        record.validate(&record.account_id)?;
        if !self.record_path(&record.account_id).exists() {
            return Err(VaultError::AccountNotFound(record.account_id.clone()));
        }
        self.write_record(record)
    }

    fn write_record(&self, record: &AccountRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| VaultError::SerializationError(format!("account record: {e}")))?;
        write_atomic(&self.record_path(&record.account_id), &bytes)
    }
}
