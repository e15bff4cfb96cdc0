//! Per-account credential records.
//!
//! This module provides:
//! - The `AccountRecord` type: salt, KDF parameters, key check (`record`)
//! - The `SecretStore` that loads, creates and verifies records (`store`)

pub mod record;
pub mod store;

pub use record::AccountRecord;
pub use store::{OpenedAccount, SecretStore};

use crate::errors::{Result, VaultError};

/// Longest account or vault identifier accepted.
const MAX_IDENTIFIER_LEN: usize = 128;

/// Validate an account id or vault name.
///
/// These become path components, so only ASCII letters, digits,
/// underscores, hyphens and periods are allowed, and a leading period is
/// rejected.
pub fn validate_identifier(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(VaultError::InvalidName(format!("{kind} cannot be empty")));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(VaultError::InvalidName(format!(
            "{kind} cannot exceed {MAX_IDENTIFIER_LEN} characters"
        )));
    }
    if value.starts_with('.') {
        return Err(VaultError::InvalidName(format!(
            "{kind} '{value}' cannot start with a period"
        )));
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(VaultError::InvalidName(format!(
            "{kind} '{value}' contains invalid characters; only ASCII letters, digits, underscores, hyphens, and periods are allowed"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        for ok in ["alice", "work-2024", "a.b_c"] {
            assert!(validate_identifier("account id", ok).is_ok(), "{ok}");
        }
    }

    #[test]
    fn rejects_path_like_identifiers() {
        for bad in ["", ".", "..", "../etc", "a/b", "a b", ".hidden"] {
            assert!(validate_identifier("vault name", bad).is_err(), "{bad}");
        }
    }
}
