//! The vault engine: one open vault per instance.
//!
//! `VaultEngine` is a small state machine:
//!
//! ```text
//! Closed ──open_vault──▶ Opening ──▶ Open ──close──▶ Closed
//!                            └─────▶ Failed ──close──▶ Closed
//! ```
//!
//! While `Open` it owns the vault key and the decrypted index.  Mutations
//! take the state lock exclusively for the whole encode → write → index
//! update sequence; reads share it, so they never observe a half-applied
//! change.  Key derivation runs outside the lock.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::codec::encode_bound;
use super::index::{LoadReport, VaultIndex};
use super::item::{validate_name, Content, Item, ItemSummary};
use super::layout::VaultLayout;
use crate::account::{validate_identifier, SecretStore};
use crate::audit::AuditOp;
use crate::config::Settings;
use crate::crypto::{AccountKey, VaultKey};
use crate::errors::{Result, VaultError};

#[cfg(feature = "audit-log")]
use crate::audit::AuditLog;

/// Observable lifecycle state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Closed,
    Opening,
    Open,
    Failed,
}

enum State {
    Closed,
    Opening,
    Open(Box<Session>),
    Failed,
}

/// Everything that exists only while a vault is open.
struct Session {
    account_id: String,
    vault_name: String,
    layout: VaultLayout,
    key: VaultKey,
    index: VaultIndex,
    report: LoadReport,
    read_only: bool,
}

/// Handle to one vault.  Cheap to construct; independent instances never
/// share state.
pub struct VaultEngine {
    root: PathBuf,
    settings: Settings,
    state: RwLock<State>,
    #[cfg(feature = "audit-log")]
    audit: parking_lot::Mutex<Option<AuditLog>>,
}

impl VaultEngine {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// A closed engine storing its data under `root`.
    pub fn new(root: &Path, settings: Settings) -> Self {
        Self {
            root: root.to_path_buf(),
            settings,
            state: RwLock::new(State::Closed),
            #[cfg(feature = "audit-log")]
            audit: parking_lot::Mutex::new(None),
        }
    }

    /// A closed engine configured from `<root>/cabinet.toml`.
    pub fn from_root(root: &Path) -> Result<Self> {
        Ok(Self::new(root, Settings::load(root)?))
    }

    /// Construct an engine and open `vault_name` in one step.
    pub fn open(
        root: &Path,
        settings: Settings,
        account_id: &str,
        password: &[u8],
        vault_name: &str,
    ) -> Result<Self> {
        let engine = Self::new(root, settings);
        engine.open_vault(account_id, password, vault_name)?;
        Ok(engine)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Open (creating if needed) a vault for reading and writing.
    ///
    /// Creates the account on first use.  An already open vault is closed
    /// first.  On failure the engine is left `Failed`; retrying with
    /// another password is the caller's decision.
    pub fn open_vault(&self, account_id: &str, password: &[u8], vault_name: &str) -> Result<LoadReport> {
        self.open_with(account_id, password, vault_name, false)
    }

    /// Open an existing vault without ever writing to disk.
    ///
    /// Missing accounts or vaults are `VaultNotFound`, nothing is repaired,
    /// and every mutation fails with `ReadOnly`.
    pub fn open_read_only(
        &self,
        account_id: &str,
        password: &[u8],
        vault_name: &str,
    ) -> Result<LoadReport> {
        self.open_with(account_id, password, vault_name, true)
    }

    /// Discard the key and the index.  Idempotent.
    pub fn close(&self) {
        let mut state = self.state.write();
        if let State::Open(session) = &*state {
            info!(
                account = %session.account_id,
                vault = %session.vault_name,
                "Closed vault"
            );
        }
        *state = State::Closed;
    }

    pub fn state(&self) -> EngineState {
        match &*self.state.read() {
            State::Closed => EngineState::Closed,
            State::Opening => EngineState::Opening,
            State::Open(_) => EngineState::Open,
            State::Failed => EngineState::Failed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == EngineState::Open
    }

    /// Warnings collected while the current vault was loaded.
    pub fn last_report(&self) -> Option<LoadReport> {
        self.with_session(|s| s.report.clone()).ok()
    }

    /// `(account_id, vault_name)` of the open vault.
    pub fn current_vault(&self) -> Option<(String, String)> {
        self.with_session(|s| (s.account_id.clone(), s.vault_name.clone()))
            .ok()
    }

    fn open_with(
        &self,
        account_id: &str,
        password: &[u8],
        vault_name: &str,
        read_only: bool,
    ) -> Result<LoadReport> {
        {
            let mut state = self.state.write();
            if matches!(*state, State::Opening) {
                return Err(VaultError::OpenInProgress);
            }
            // Replacing the state drops any previous session and its key.
            *state = State::Opening;
        }

        let result = self.establish(account_id, password, vault_name, read_only);

        let mut state = self.state.write();
        match result {
            Ok(session) => {
                let report = session.report.clone();
                info!(
                    account = account_id,
                    vault = vault_name,
                    items = session.index.len(),
                    warnings = report.warnings.len(),
                    read_only,
                    "Opened vault"
                );
                *state = State::Open(Box::new(session));
                Ok(report)
            }
            Err(e) => {
                warn!(account = account_id, vault = vault_name, error = %e, "Failed to open vault");
                *state = State::Failed;
                Err(e)
            }
        }
    }

    fn establish(
        &self,
        account_id: &str,
        password: &[u8],
        vault_name: &str,
        read_only: bool,
    ) -> Result<Session> {
        validate_identifier("account id", account_id)?;
        validate_identifier("vault name", vault_name)?;

        let store = SecretStore::new(
            &self.settings.secrets_path(&self.root),
            self.settings.argon2_params(),
        );
        let layout = VaultLayout::new(
            &self.settings.vaults_path(&self.root),
            account_id,
            vault_name,
        );

        // 1. Decide before any write whether this open may create anything.
        let vault_exists = layout.exists();
        if !vault_exists && (read_only || !self.settings.create_missing_vaults) {
            return Err(layout.not_found());
        }

        // 2. Obtain the account record and derive the account key.  A new
        //    record is never written over an existing vault.
        let (record, account_key) = match store.load_account(account_id)? {
            Some(record) => {
                let key = record.derive_key(password)?;
                (record, key)
            }
            None if vault_exists => {
                return Err(VaultError::AccountNotFound(account_id.to_string()));
            }
            None => {
                let opened = store.load_or_create_account(account_id, password)?;
                (opened.record, opened.key)
            }
        };

        // 3. Cheap wrong-password check before touching the vault.
        if !record.verify(&account_key)? {
            return Err(VaultError::AuthenticationFailure);
        }

        // 4. Per-vault key.
        let key = account_key.derive_vault_key(vault_name)?;

        // 5. Without a stored key check, a manifest must decrypt before the
        //    key is trusted; the record then gains a key check.
        if record.key_check.is_none() {
            self.confirm_unchecked_key(&layout, &key, &account_key, vault_exists)?;
            if !read_only {
                let mut upgraded = record.clone();
                upgraded.key_check = Some(account_key.key_check(account_id)?);
                store.replace_record(&upgraded)?;
                info!(account = account_id, "Added key check to account record");
            }
        }
        drop(account_key);

        // 6. Create the vault if needed, then load it.
        if !vault_exists {
            layout.create(&key)?;
            info!(account = account_id, vault = vault_name, "Created vault");
            self.audit(AuditOp::Create, account_id, vault_name, None);
        }

        let (index, report) = VaultIndex::open(&layout, &key, !read_only)?;
        if !read_only {
            let details = (!report.is_clean()).then(|| format!("{} warnings", report.warnings.len()));
            self.audit(AuditOp::Open, account_id, vault_name, details.as_deref());
        }

        Ok(Session {
            account_id: account_id.to_string(),
            vault_name: vault_name.to_string(),
            layout,
            key,
            index,
            report,
            read_only,
        })
    }

    /// Check a key that no key check vouches for by decrypting a
    /// manifest: this vault's if it exists, otherwise any other vault of
    /// the same account.  With nothing to decrypt, the key is refused.
    fn confirm_unchecked_key(
        &self,
        layout: &VaultLayout,
        key: &VaultKey,
        account_key: &AccountKey,
        vault_exists: bool,
    ) -> Result<()> {
        if vault_exists {
            return layout.read_manifest(key).map(drop);
        }

        let siblings =
            VaultLayout::existing_vaults(&self.settings.vaults_path(&self.root), layout.account_id())?;
        let Some(sibling) = siblings.first() else {
            warn!(
                account = layout.account_id(),
                "Account has no key check and no vault to confirm the password"
            );
            return Err(VaultError::AuthenticationFailure);
        };
        let sibling_key = account_key.derive_vault_key(sibling.vault_name())?;
        sibling.read_manifest(&sibling_key).map(drop)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Add a new item.  Fails with `DuplicateName` if the name is taken;
    /// use `update` to change an existing item.
    pub fn add<I, T>(&self, name: &str, tags: I, content: impl Into<Content>) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let item = Item::new(name, tags, content)?;
        self.mutate(AuditOp::Add, |session| session.add(item))
    }

    /// Replace the tags and content of an existing item.
    pub fn update<I, T>(&self, name: &str, tags: I, content: impl Into<Content>) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let item = Item::new(name, tags, content)?;
        self.mutate(AuditOp::Update, |session| session.update(item))
    }

    /// Give an item a new name; tags and content are unchanged.
    pub fn rename(&self, name: &str, new_name: &str) -> Result<()> {
        self.mutate(AuditOp::Rename, |session| session.rename(name, new_name))
    }

    /// Delete an item and its encrypted file.
    pub fn remove(&self, name: &str) -> Result<()> {
        self.mutate(AuditOp::Remove, |session| session.remove(name))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get(&self, name: &str) -> Result<Item> {
        self.with_session(|s| s.index.get(name).cloned())?
    }

    /// Items carrying every tag in `tags` (empty if none match).
    pub fn get_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<Vec<Item>> {
        self.with_session(|s| s.index.get_by_tags(tags).into_iter().cloned().collect())
    }

    /// Every tag currently in use.
    pub fn list_tags(&self) -> Result<BTreeSet<String>> {
        self.with_session(|s| s.index.list_all_tags())
    }

    /// Names and tags of all items, without content.
    pub fn list_items(&self) -> Result<Vec<ItemSummary>> {
        self.with_session(|s| s.index.list_items())
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        self.with_session(|s| s.index.contains(name))
    }

    pub fn item_count(&self) -> Result<usize> {
        self.with_session(|s| s.index.len())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn with_session<T>(&self, f: impl FnOnce(&Session) -> T) -> Result<T> {
        match &*self.state.read() {
            State::Open(session) => Ok(f(&**session)),
            _ => Err(VaultError::NotOpen),
        }
    }

    fn mutate(&self, op: AuditOp, f: impl FnOnce(&mut Session) -> Result<()>) -> Result<()> {
        let mut state = self.state.write();
        let State::Open(session) = &mut *state else {
            return Err(VaultError::NotOpen);
        };
        if session.read_only {
            return Err(VaultError::ReadOnly);
        }

        f(&mut **session)?;
        self.audit(op, &session.account_id, &session.vault_name, None);
        Ok(())
    }

    #[cfg(feature = "audit-log")]
    fn audit(&self, op: AuditOp, account: &str, vault: &str, details: Option<&str>) {
        let mut audit = self.audit.lock();
        if audit.is_none() {
            *audit = AuditLog::open(&self.root);
        }
        if let Some(log) = audit.as_ref() {
            log.record(op, account, vault, details);
        }
    }

    #[cfg(not(feature = "audit-log"))]
    fn audit(&self, _op: AuditOp, _account: &str, _vault: &str, _details: Option<&str>) {}
}

impl Session {
    fn persist_manifest(&self) -> Result<()> {
        self.layout.write_manifest(&self.index.manifest(), &self.key)
    }

    /// Write the item file first, then the manifest, so the manifest
    /// never names a file that does not exist.
    fn add(&mut self, item: Item) -> Result<()> {
        if self.index.contains(&item.name) {
            return Err(VaultError::DuplicateName(item.name));
        }

        let id = Uuid::new_v4();
        let blob = encode_bound(&item, &self.key, id.as_bytes())?;
        self.layout.write_item(id, &blob)?;

        let name = item.name.clone();
        self.index.put(item, id);
        if let Err(e) = self.persist_manifest() {
            self.index.remove(&name);
            if let Err(cleanup) = self.layout.remove_item(id) {
                warn!(error = %cleanup, "Could not remove item file after failed add");
            }
            return Err(e);
        }

        debug!(item = %name, "Added item");
        Ok(())
    }

    /// Re-encrypt under a fresh nonce in the same slot.  The manifest is
    /// untouched because neither the name nor the location changes.
    fn update(&mut self, item: Item) -> Result<()> {
        let id = self
            .index
            .location(&item.name)
            .ok_or_else(|| VaultError::NotFound(item.name.clone()))?;

        let blob = encode_bound(&item, &self.key, id.as_bytes())?;
        self.layout.write_item(id, &blob)?;

        debug!(item = %item.name, "Updated item");
        self.index.put(item, id);
        Ok(())
    }

    /// The name lives inside the encrypted item, so the item is rewritten
    /// in place before the manifest.  A crash in between is repaired on
    /// the next open, where the name inside the file wins.
    fn rename(&mut self, name: &str, new_name: &str) -> Result<()> {
        let id = self
            .index
            .location(name)
            .ok_or_else(|| VaultError::NotFound(name.to_string()))?;
        validate_name(new_name)?;
        if name == new_name {
            return Ok(());
        }
        if self.index.contains(new_name) {
            return Err(VaultError::NameCollision(new_name.to_string()));
        }

        let original = self.index.get(name)?.clone();
        let mut renamed = original.clone();
        renamed.name = new_name.to_string();

        let blob = encode_bound(&renamed, &self.key, id.as_bytes())?;
        self.layout.write_item(id, &blob)?;
        self.index.rename(name, new_name)?;

        if let Err(e) = self.persist_manifest() {
            self.index.rename(new_name, name)?;
            let restored = encode_bound(&original, &self.key, id.as_bytes())
                .and_then(|blob| self.layout.write_item(id, &blob));
            if let Err(cleanup) = restored {
                warn!(error = %cleanup, "Could not restore item after failed rename");
            }
            return Err(e);
        }

        debug!(from = %name, to = %new_name, "Renamed item");
        Ok(())
    }

    /// Drop the manifest entry first, then the file.  A crash in between
    /// leaves an orphaned file that the next open deletes.
    fn remove(&mut self, name: &str) -> Result<()> {
        let id = self
            .index
            .location(name)
            .ok_or_else(|| VaultError::NotFound(name.to_string()))?;
        let item = self.index.get(name)?.clone();

        self.index.remove(name);
        if let Err(e) = self.persist_manifest() {
            self.index.put(item, id);
            return Err(e);
        }

        if let Err(e) = self.layout.remove_item(id) {
            warn!(error = %e, "Item file left behind; it is removed on next open");
        }

        debug!(item = %name, "Removed item");
        Ok(())
    }
}
