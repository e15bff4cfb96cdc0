//! Account and vault keys.
//!
//! The password is stretched once with Argon2id into a master key.  From
//! there HKDF-SHA256 derives:
//! - the **account key**, bound to the account identifier;
//! - a **key-check key**, used to detect a wrong password cheaply;
//! - one **vault key** per vault name, used for all AEAD work in that vault.
//!
//! HKDF (RFC 5869) uses the parent key as input keying material (IKM)
//! and a context string (`info`) to produce independent sub-keys.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use super::kdf::{derive_master_key_with_params, Argon2Params, KEY_LEN};
use crate::errors::{Result, VaultError};

/// Length of a key-check tag (HMAC-SHA256).
pub const KEY_CHECK_LEN: usize = 32;

/// Derive the account key for `account_id` from a password and salt.
///
/// Deterministic: identical inputs always produce the same key.  Whether
/// the password is correct is decided later, by the key check or by a
/// failed decrypt.
pub fn derive_key(
    account_id: &str,
    password: &[u8],
    salt: &[u8],
    params: &Argon2Params,
) -> Result<AccountKey> {
    let mut master = derive_master_key_with_params(password, salt, params)?;
    let info = format!("cabinet-account:{account_id}");
    let derived = hkdf_derive(&master, info.as_bytes());
    master.zeroize();
    Ok(AccountKey { bytes: derived? })
}

/// Internal helper: run HKDF-SHA256 expand with the given `info`.
///
/// The extract step uses a zero salt; the input already has full
/// entropy because it came from Argon2id.
fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<[u8; KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = [0u8; KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| VaultError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

/// The per-account key.  Zeroed when dropped; never written to disk.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct AccountKey {
    bytes: [u8; KEY_LEN],
}

impl AccountKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Derive the key that encrypts everything inside `vault_name`.
    pub fn derive_vault_key(&self, vault_name: &str) -> Result<VaultKey> {
        let info = format!("cabinet-vault:{vault_name}");
        Ok(VaultKey {
            bytes: hkdf_derive(&self.bytes, info.as_bytes())?,
        })
    }

    /// Compute the key-check tag stored in the account record.
    ///
    /// `HMAC-SHA256(key_check_key, "cabinet-key-check:<account_id>")`.
    pub fn key_check(&self, account_id: &str) -> Result<Vec<u8>> {
        let mac = self.key_check_mac(account_id)?;
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Compare against a stored key-check tag in constant time.
    pub fn verify_key_check(&self, account_id: &str, expected: &[u8]) -> Result<bool> {
        let mac = self.key_check_mac(account_id)?;
        Ok(mac.verify_slice(expected).is_ok())
    }

    fn key_check_mac(&self, account_id: &str) -> Result<Hmac<Sha256>> {
        let mut check_key = hkdf_derive(&self.bytes, b"cabinet-key-check")?;
        let mac = Hmac::<Sha256>::new_from_slice(&check_key)
            .map_err(|e| VaultError::KeyDerivationFailed(format!("HMAC init failed: {e}")));
        check_key.zeroize();
        let mut mac = mac?;
        mac.update(b"cabinet-key-check:");
        mac.update(account_id.as_bytes());
        Ok(mac)
    }
}

/// The AEAD key for one vault.  Zeroed when dropped.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct VaultKey {
    bytes: [u8; KEY_LEN],
}

impl VaultKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Access the raw key bytes (e.g. to pass to the cipher).
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}
