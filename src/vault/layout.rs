//! On-disk layout of one vault.
//!
//! ```text
//! <vaults_dir>/<account_id>/<vault_name>/
//!     manifest.cab          encrypted, ordered [{name, id}] table
//!     items/<uuid>.item     one encrypted item per file
//! ```
//!
//! Storage ids are random UUIDs, never derived from item names, so a
//! rename rewrites the item in place instead of moving it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::codec::{decode_manifest, encode_manifest};
use super::format::write_atomic;
use crate::crypto::VaultKey;
use crate::errors::{Result, VaultError};

/// Opaque storage location of one item.
pub type ItemId = Uuid;

const MANIFEST_FILE: &str = "manifest.cab";
const ITEMS_DIR: &str = "items";
const ITEM_EXT: &str = "item";

/// One row of the name→location table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub id: ItemId,
}

/// The encrypted name→location table, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

/// Paths and raw file operations for one vault directory.
#[derive(Debug, Clone)]
pub struct VaultLayout {
    account_id: String,
    vault_name: String,
    dir: PathBuf,
}

impl VaultLayout {
    pub fn new(vaults_dir: &Path, account_id: &str, vault_name: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            vault_name: vault_name.to_string(),
            dir: vaults_dir.join(account_id).join(vault_name),
        }
    }

    /// Every vault of `account_id` that has a manifest, sorted by name.
    pub fn existing_vaults(vaults_dir: &Path, account_id: &str) -> Result<Vec<Self>> {
        let entries = match fs::read_dir(vaults_dir.join(account_id)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut vaults = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let layout = Self::new(vaults_dir, account_id, &name);
            if layout.exists() {
                vaults.push(layout);
            }
        }
        vaults.sort_by(|a, b| a.vault_name.cmp(&b.vault_name));
        Ok(vaults)
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn vault_name(&self) -> &str {
        &self.vault_name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    pub fn items_dir(&self) -> PathBuf {
        self.dir.join(ITEMS_DIR)
    }

    pub fn item_path(&self, id: ItemId) -> PathBuf {
        self.items_dir()
            .join(format!("{}.{ITEM_EXT}", id.as_hyphenated()))
    }

    /// A vault exists once its manifest has been written.
    pub fn exists(&self) -> bool {
        self.manifest_path().is_file()
    }

    pub fn not_found(&self) -> VaultError {
        VaultError::VaultNotFound {
            account: self.account_id.clone(),
            vault: self.vault_name.clone(),
        }
    }

    /// Create the directory tree and an empty manifest.
    pub fn create(&self, key: &VaultKey) -> Result<()> {
        fs::create_dir_all(self.items_dir())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, fs::Permissions::from_mode(0o700))?;
        }

        self.write_manifest(&Manifest::default(), key)
    }

    // ------------------------------------------------------------------
    // Manifest
    // ------------------------------------------------------------------

    /// Read and decrypt the manifest.  `VaultNotFound` if it is absent.
    pub fn read_manifest(&self, key: &VaultKey) -> Result<Manifest> {
        let blob = match fs::read(self.manifest_path()) {
            Ok(blob) => blob,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(self.not_found()),
            Err(e) => return Err(e.into()),
        };
        decode_manifest(&blob, key)
    }

    pub fn write_manifest(&self, manifest: &Manifest, key: &VaultKey) -> Result<()> {
        let blob = encode_manifest(manifest, key)?;
        write_atomic(&self.manifest_path(), &blob)
    }

    // ------------------------------------------------------------------
    // Item files
    // ------------------------------------------------------------------

    /// Raw bytes of an item file, or `None` if it does not exist.
    pub fn read_item(&self, id: ItemId) -> Result<Option<Vec<u8>>> {
        match fs::read(self.item_path(id)) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_item(&self, id: ItemId, blob: &[u8]) -> Result<()> {
        write_atomic(&self.item_path(id), blob)
    }

    /// Delete an item file.  Returns `false` if it was already gone.
    pub fn remove_item(&self, id: ItemId) -> Result<bool> {
        match fs::remove_file(self.item_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of every `*.item` file in the items directory.
    ///
    /// Temp files and anything not named `<uuid>.item` are ignored.
    pub fn list_item_ids(&self) -> Result<Vec<ItemId>> {
        let entries = match fs::read_dir(self.items_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ITEM_EXT) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}
