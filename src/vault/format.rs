//! Binary envelope for encrypted vault files, plus atomic writes.
//!
//! Every `.item` and `manifest.cab` file has this layout:
//!
//! ```text
//! [magic: 4 bytes][version: 1 byte][nonce: 12 bytes][ciphertext + 16-byte tag]
//! ```
//!
//! - **Magic**: `CBIT` for items, `CBMF` for the manifest.
//! - **Version**: format version (currently `1`).
//! - The magic, the version and a caller-supplied context (the item's
//!   storage id, or `"manifest"`) are authenticated as associated data,
//!   so a file cannot be swapped into another slot undetected.
//!
//! Any structural problem with an envelope is reported as
//! `AuthenticationFailure`: before the tag is checked there is no way to
//! tell damage from tampering, and both must fail closed.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::crypto::encryption::{decrypt, encrypt, NONCE_LEN, TAG_LEN};
use crate::crypto::VaultKey;
use crate::errors::{Result, VaultError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic bytes at the start of every item file.
pub const ITEM_MAGIC: &[u8; 4] = b"CBIT";

/// Magic bytes at the start of the manifest file.
pub const MANIFEST_MAGIC: &[u8; 4] = b"CBMF";

/// Current binary format version.
pub const CURRENT_VERSION: u8 = 1;

/// Fixed-size prefix: 4 (magic) + 1 (version).
const HEADER_LEN: usize = 5;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

fn header(magic: &[u8; 4]) -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[..4].copy_from_slice(magic);
    out[4] = CURRENT_VERSION;
    out
}

fn associated_data(header: &[u8], context: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(header.len() + context.len());
    aad.extend_from_slice(header);
    aad.extend_from_slice(context);
    aad
}

/// Encrypt `plaintext` into a self-describing envelope.
pub fn seal(magic: &[u8; 4], plaintext: &[u8], key: &VaultKey, context: &[u8]) -> Result<Vec<u8>> {
    let header = header(magic);
    let aad = associated_data(&header, context);
    let body = encrypt(key.as_bytes(), plaintext, &aad)?;

    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Verify and decrypt an envelope produced by `seal`.
pub fn unseal(magic: &[u8; 4], blob: &[u8], key: &VaultKey, context: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < HEADER_LEN + NONCE_LEN + TAG_LEN {
        return Err(VaultError::AuthenticationFailure);
    }

    let (stored_header, body) = blob.split_at(HEADER_LEN);
    if stored_header != header(magic) {
        return Err(VaultError::AuthenticationFailure);
    }

    let aad = associated_data(stored_header, context);
    decrypt(key.as_bytes(), body, &aad)
}

// ---------------------------------------------------------------------------
// Atomic writes
// ---------------------------------------------------------------------------

/// Write `bytes` to `path` **atomically**.
///
/// 1. Write to a temp file in the same directory.
/// 2. Restrict permissions to the owner (Unix).
/// 3. Rename the temp file over the target path.
///
/// The rename ensures readers never see a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, bytes)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let encoded = BASE64.encode(data);
    serializer.serialize_str(&encoded)
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}

/// Same as `base64_encode`/`base64_decode`, for `Option<Vec<u8>>` fields.
pub(crate) mod base64_option {
    use super::BASE64;
    use base64::Engine;
    use serde::Deserialize;

    pub fn serialize<S>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match data {
            Some(bytes) => serializer.serialize_some(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| BASE64.decode(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key() -> VaultKey {
        VaultKey::from_bytes([0x5Au8; 32])
    }

    #[test]
    fn seal_and_unseal_roundtrip() {
        let blob = seal(ITEM_MAGIC, b"payload", &key(), b"ctx").unwrap();
        assert_eq!(&blob[..4], ITEM_MAGIC);
        assert_eq!(blob[4], CURRENT_VERSION);
        assert_eq!(unseal(ITEM_MAGIC, &blob, &key(), b"ctx").unwrap(), b"payload");
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let blob = seal(ITEM_MAGIC, b"payload", &key(), b"ctx").unwrap();
        let err = unseal(MANIFEST_MAGIC, &blob, &key(), b"ctx").unwrap_err();
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn wrong_context_is_rejected() {
        let blob = seal(ITEM_MAGIC, b"payload", &key(), b"slot-1").unwrap();
        let err = unseal(ITEM_MAGIC, &blob, &key(), b"slot-2").unwrap_err();
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut blob = seal(ITEM_MAGIC, b"payload", &key(), b"").unwrap();
        blob[4] = 9;
        assert!(unseal(ITEM_MAGIC, &blob, &key(), b"").is_err());
    }

    #[test]
    fn write_atomic_replaces_file_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!dir.path().join(".data.bin.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn write_atomic_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secret.bin");
        write_atomic(&path, b"x").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
