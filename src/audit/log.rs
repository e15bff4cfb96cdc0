//! SQLite storage for the audit trail.
//!
//! Logging never fails a vault operation: if the database cannot be
//! opened or written, the failure is traced and the operation proceeds.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use super::AuditOp;
use crate::errors::{Result, VaultError};

const DB_FILE: &str = "audit.db";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS audit_log (
        id       INTEGER PRIMARY KEY AUTOINCREMENT,
        at_ms    INTEGER NOT NULL,
        op       TEXT    NOT NULL,
        account  TEXT    NOT NULL,
        vault    TEXT    NOT NULL,
        details  TEXT
    );
    CREATE INDEX IF NOT EXISTS audit_log_vault ON audit_log (account, vault);
";

/// One recorded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub op: AuditOp,
    pub account: String,
    pub vault: String,
    pub details: Option<String>,
}

/// Which entries `AuditLog::query` returns.  Unset fields match anything.
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub account: Option<String>,
    pub vault: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            account: None,
            vault: None,
            since: None,
            limit: 100,
        }
    }
}

impl AuditFilter {
    /// Entries for one vault of one account.
    pub fn vault(account: &str, vault: &str) -> Self {
        Self {
            account: Some(account.to_string()),
            vault: Some(vault.to_string()),
            ..Self::default()
        }
    }
}

/// Handle to `<root>/audit.db`.
pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open or create the database.  `None` means auditing is unavailable.
    pub fn open(root: &Path) -> Option<Self> {
        match Self::try_open(root) {
            Ok(log) => Some(log),
            Err(e) => {
                debug!(error = %e, "Audit log unavailable");
                None
            }
        }
    }

    fn try_open(root: &Path) -> Result<Self> {
        let path = Self::db_path(root);
        let conn = Connection::open(&path)
            .map_err(|e| VaultError::AuditError(format!("open {}: {e}", path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        conn.execute_batch(SCHEMA)
            .map_err(|e| VaultError::AuditError(format!("schema: {e}")))?;
        Ok(Self { conn })
    }

    pub fn db_path(root: &Path) -> PathBuf {
        root.join(DB_FILE)
    }

    /// Append an entry stamped with the current time.
    pub fn record(&self, op: AuditOp, account: &str, vault: &str, details: Option<&str>) {
        let inserted = self.conn.execute(
            "INSERT INTO audit_log (at_ms, op, account, vault, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Utc::now().timestamp_millis(),
                op.as_str(),
                account,
                vault,
                details
            ],
        );
        if let Err(e) = inserted {
            debug!(%op, error = %e, "Could not write audit entry");
        }
    }

    /// Matching entries, newest first.
    pub fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        let query_err = |e: rusqlite::Error| VaultError::AuditError(format!("query: {e}"));

        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, at_ms, op, account, vault, details
                 FROM audit_log
                 WHERE (?1 IS NULL OR account = ?1)
                   AND (?2 IS NULL OR vault = ?2)
                   AND (?3 IS NULL OR at_ms >= ?3)
                 ORDER BY id DESC
                 LIMIT ?4",
            )
            .map_err(query_err)?;

        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
        let since = filter.since.map(|ts| ts.timestamp_millis());
        let rows = stmt
            .query_map(
                params![filter.account, filter.vault, since, limit],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .map_err(query_err)?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, at_ms, op, account, vault, details) = row.map_err(query_err)?;
            let timestamp = DateTime::<Utc>::from_timestamp_millis(at_ms).ok_or_else(|| {
                VaultError::AuditError(format!("entry {id} has invalid timestamp {at_ms}"))
            })?;
            entries.push(AuditEntry {
                id,
                timestamp,
                op: op.parse()?,
                account,
                vault,
                details,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ops(entries: &[AuditEntry]) -> Vec<AuditOp> {
        entries.iter().map(|e| e.op).collect()
    }

    #[test]
    fn filter_narrows_to_one_vault() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();

        log.record(AuditOp::Create, "alice", "personal", None);
        log.record(AuditOp::Add, "alice", "work", None);
        log.record(AuditOp::Remove, "bob", "personal", None);
        log.record(AuditOp::Update, "alice", "personal", Some("retry"));

        let personal = log.query(&AuditFilter::vault("alice", "personal")).unwrap();
        assert_eq!(ops(&personal), [AuditOp::Update, AuditOp::Create]);
        assert_eq!(personal[0].details.as_deref(), Some("retry"));

        let everything = log.query(&AuditFilter::default()).unwrap();
        assert_eq!(everything.len(), 4);

        let newest = log
            .query(&AuditFilter {
                limit: 1,
                ..AuditFilter::default()
            })
            .unwrap();
        assert_eq!(ops(&newest), [AuditOp::Update]);
    }

    #[test]
    fn since_excludes_older_entries() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        log.record(AuditOp::Open, "alice", "personal", None);

        let hour = chrono::Duration::hours(1);
        let query = |since: DateTime<Utc>| {
            log.query(&AuditFilter {
                since: Some(since),
                ..AuditFilter::default()
            })
            .unwrap()
        };
        assert_eq!(query(Utc::now() - hour).len(), 1);
        assert!(query(Utc::now() + hour).is_empty());
    }

    #[test]
    fn unknown_stored_op_is_reported() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::open(dir.path()).unwrap();
        log.conn
            .execute(
                "INSERT INTO audit_log (at_ms, op, account, vault) VALUES (0, 'rotate', 'a', 'v')",
                [],
            )
            .unwrap();

        assert!(matches!(
            log.query(&AuditFilter::default()),
            Err(VaultError::AuditError(_))
        ));
    }

    #[test]
    fn unusable_root_disables_auditing() {
        let dir = TempDir::new().unwrap();
        assert!(AuditLog::open(&dir.path().join("missing").join("deeper")).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn database_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let _log = AuditLog::open(dir.path()).unwrap();
        let mode = std::fs::metadata(AuditLog::db_path(dir.path()))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
