//! The per-account credential record.
//!
//! Stored as JSON (binary fields base64) at
//! `<secrets_dir>/<account_id>.json`.  It holds nothing secret: the salt
//! and KDF parameters are public, and the key check is an HMAC tag that
//! only confirms a candidate key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::kdf::{Argon2Params, MIN_SALT_LEN};
use crate::crypto::keys::{derive_key, AccountKey, KEY_CHECK_LEN};
use crate::errors::{Result, VaultError};
use crate::vault::format::{base64_decode, base64_encode, base64_option};

/// Current record format version.
pub const RECORD_VERSION: u8 = 1;

/// Everything needed to derive and confirm an account's key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub version: u8,

    pub account_id: String,

    /// Argon2id salt, generated once at account creation.
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,

    /// KDF work factor in force when the account was created.
    pub argon2_params: Argon2Params,

    /// HMAC tag that confirms a derived key without touching any vault.
    /// Absent on legacy records; verification then falls to the first
    /// decrypt.
    #[serde(default, with = "base64_option", skip_serializing_if = "Option::is_none")]
    pub key_check: Option<Vec<u8>>,

    pub created_at: DateTime<Utc>,
}

impl AccountRecord {
    /// Derive the account key for `password` with this record's salt
    /// and parameters.
    pub fn derive_key(&self, password: &[u8]) -> Result<AccountKey> {
        derive_key(&self.account_id, password, &self.salt, &self.argon2_params)
    }

    /// Check a candidate key against the stored key check.
    ///
    /// Returns `true` when there is no key check to compare against.
    pub fn verify(&self, key: &AccountKey) -> Result<bool> {
        match &self.key_check {
            Some(expected) => key.verify_key_check(&self.account_id, expected),
            None => Ok(true),
        }
    }

    /// Structural checks applied to every record read from disk.
    pub fn validate(&self, expected_account: &str) -> Result<()> {
        if self.version != RECORD_VERSION {
            return Err(VaultError::AccountCorrupt(format!(
                "unsupported record version {}, expected {RECORD_VERSION}",
                self.version
            )));
        }
        if self.account_id != expected_account {
            return Err(VaultError::AccountCorrupt(format!(
                "record belongs to '{}', not '{expected_account}'",
                self.account_id
            )));
        }
        if self.salt.len() < MIN_SALT_LEN {
            return Err(VaultError::AccountCorrupt(format!(
                "salt is {} bytes, need at least {MIN_SALT_LEN}",
                self.salt.len()
            )));
        }
        if let Some(check) = &self.key_check {
            if check.len() != KEY_CHECK_LEN {
                return Err(VaultError::AccountCorrupt(format!(
                    "key check is {} bytes, expected {KEY_CHECK_LEN}",
                    check.len()
                )));
            }
        }
        self.argon2_params
            .validate()
            .map_err(|e| VaultError::AccountCorrupt(e.to_string()))
    }
}
