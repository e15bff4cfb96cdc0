//! Audit trail of vault operations.
//!
//! `AuditOp` names what the engine did.  With the `audit-log` feature the
//! operations are kept in a SQLite database at `<root>/audit.db` (see
//! [`AuditLog`]).  Entries carry the account and vault only; item names
//! are encrypted metadata and never reach the log.

use std::fmt;
use std::str::FromStr;

use crate::errors::VaultError;

#[cfg(feature = "audit-log")]
mod log;

#[cfg(feature = "audit-log")]
pub use log::{AuditEntry, AuditFilter, AuditLog};

/// An operation recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditOp {
    /// A vault directory and empty manifest were created.
    Create,
    /// A vault was opened for writing.
    Open,
    Add,
    Update,
    Rename,
    Remove,
}

impl AuditOp {
    pub const ALL: [AuditOp; 6] = [
        AuditOp::Create,
        AuditOp::Open,
        AuditOp::Add,
        AuditOp::Update,
        AuditOp::Rename,
        AuditOp::Remove,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Open => "open",
            Self::Add => "add",
            Self::Update => "update",
            Self::Rename => "rename",
            Self::Remove => "remove",
        }
    }

    /// `true` for operations that change an item.
    pub fn is_item_change(self) -> bool {
        matches!(self, Self::Add | Self::Update | Self::Rename | Self::Remove)
    }
}

impl fmt::Display for AuditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditOp {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| VaultError::AuditError(format!("unknown operation '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_op_parses_back() {
        for op in AuditOp::ALL {
            assert_eq!(op.to_string().parse::<AuditOp>().unwrap(), op);
        }
    }

    #[test]
    fn unknown_op_is_an_audit_error() {
        assert!(matches!(
            "rotate".parse::<AuditOp>(),
            Err(VaultError::AuditError(_))
        ));
    }

    #[test]
    fn only_item_operations_are_item_changes() {
        let changes: Vec<AuditOp> = AuditOp::ALL
            .into_iter()
            .filter(|op| op.is_item_change())
            .collect();
        assert_eq!(
            changes,
            [AuditOp::Add, AuditOp::Update, AuditOp::Rename, AuditOp::Remove]
        );
    }
}
