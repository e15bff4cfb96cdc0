//! In-memory vault index.
//!
//! Holds every decrypted item keyed by name, plus a derived tag index
//! (tag → names).  The tag index is never persisted; it is rebuilt from
//! the items on every open and updated incrementally afterwards.
//!
//! Between public calls the index upholds:
//! - every name in `tags[t]` is an item whose tag set contains `t`;
//! - every tag of every item is a key of `tags`;
//! - no tag bucket is empty.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use tracing::{debug, warn};

use super::codec::decode_bound;
use super::item::{Item, ItemSummary};
use super::layout::{ItemId, Manifest, ManifestEntry, VaultLayout};
use crate::crypto::VaultKey;
use crate::errors::{Result, VaultError};

/// Something the loader had to skip or repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// The item file could not be read, authenticated or parsed.
    /// Its file is left untouched.
    ItemUnreadable { name: String, id: ItemId, reason: String },

    /// The manifest points at a file that does not exist.
    MissingItemFile { name: String, id: ItemId },

    /// The item file carries a different name than the manifest
    /// (an interrupted rename).  The name inside the file wins.
    NameMismatch {
        manifest_name: String,
        item_name: String,
        id: ItemId,
    },

    /// Two storage slots decrypt to the same item name; the later slot
    /// is ignored and left on disk.
    DuplicateEntry { name: String, id: ItemId },

    /// An item file no manifest entry refers to (an interrupted add or
    /// remove).
    OrphanFile { id: ItemId, deleted: bool },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ItemUnreadable { name, reason, .. } => {
                write!(f, "item '{name}' could not be read: {reason}")
            }
            Self::MissingItemFile { name, .. } => {
                write!(f, "item '{name}' has no data file and was dropped")
            }
            Self::NameMismatch {
                manifest_name,
                item_name,
                ..
            } => write!(
                f,
                "item '{manifest_name}' is stored as '{item_name}'; using '{item_name}'"
            ),
            Self::DuplicateEntry { name, id } => {
                write!(f, "duplicate item '{name}' in slot {id} was ignored")
            }
            Self::OrphanFile { id, deleted: true } => {
                write!(f, "orphaned item file {id} was removed")
            }
            Self::OrphanFile { id, deleted: false } => {
                write!(f, "orphaned item file {id} found")
            }
        }
    }
}

/// Per-item problems found while opening a vault.
///
/// An empty report means the vault loaded cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub warnings: Vec<LoadWarning>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Number of items that could not be loaded at all.
    pub fn unreadable_count(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, LoadWarning::ItemUnreadable { .. }))
            .count()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    id: ItemId,
    item: Item,
}

/// The name → item map and tag → names map for one open vault.
#[derive(Debug, Clone, Default)]
pub struct VaultIndex {
    entries: HashMap<String, Entry>,
    tags: BTreeMap<String, BTreeSet<String>>,
    /// Slots that are kept on disk but not loaded (unreadable or
    /// duplicate), so manifest rewrites and orphan sweeps leave them be.
    quarantined: Vec<ManifestEntry>,
    next_seq: u64,
}

impl VaultIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Rebuild the index from disk.
    ///
    /// Decrypts the manifest (a failure here fails the whole open), then
    /// every item it lists.  Items that cannot be read are reported and
    /// skipped.  With `repair` set, dangling manifest entries are dropped,
    /// orphaned item files deleted, and the fixed manifest written back.
    pub fn open(layout: &VaultLayout, key: &VaultKey, repair: bool) -> Result<(Self, LoadReport)> {
        let manifest = layout.read_manifest(key)?;
        let mut index = Self::new();
        let mut report = LoadReport::default();
        let mut dirty = false;

        for entry in manifest.entries {
            let blob = match layout.read_item(entry.id) {
                Ok(Some(blob)) => blob,
                Ok(None) => {
                    report.warnings.push(LoadWarning::MissingItemFile {
                        name: entry.name,
                        id: entry.id,
                    });
                    dirty = true;
                    continue;
                }
                Err(e) => {
                    report.warnings.push(LoadWarning::ItemUnreadable {
                        name: entry.name.clone(),
                        id: entry.id,
                        reason: e.to_string(),
                    });
                    index.quarantined.push(entry);
                    continue;
                }
            };

            let item = match decode_bound(&blob, key, entry.id.as_bytes()) {
                Ok(item) => item,
                Err(e) => {
                    report.warnings.push(LoadWarning::ItemUnreadable {
                        name: entry.name.clone(),
                        id: entry.id,
                        reason: e.to_string(),
                    });
                    index.quarantined.push(entry);
                    continue;
                }
            };

            if item.name != entry.name {
                report.warnings.push(LoadWarning::NameMismatch {
                    manifest_name: entry.name.clone(),
                    item_name: item.name.clone(),
                    id: entry.id,
                });
                dirty = true;
            }

            if index.contains(&item.name) {
                report.warnings.push(LoadWarning::DuplicateEntry {
                    name: item.name.clone(),
                    id: entry.id,
                });
                index.quarantined.push(ManifestEntry {
                    name: item.name,
                    id: entry.id,
                });
                continue;
            }

            index.put(item, entry.id);
        }

        // Files the manifest does not know about.
        let known: HashSet<ItemId> = index
            .entries
            .values()
            .map(|e| e.id)
            .chain(index.quarantined.iter().map(|e| e.id))
            .collect();
        for id in layout.list_item_ids()? {
            if known.contains(&id) {
                continue;
            }
            let deleted = repair && layout.remove_item(id)?;
            report.warnings.push(LoadWarning::OrphanFile { id, deleted });
        }

        if repair && dirty {
            layout.write_manifest(&index.manifest(), key)?;
            debug!(vault = layout.vault_name(), "Rewrote repaired manifest");
        }

        for warning in &report.warnings {
            warn!(vault = layout.vault_name(), "{warning}");
        }

        Ok((index, report))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get(&self, name: &str) -> Result<&Item> {
        self.entries
            .get(name)
            .map(|e| &e.item)
            .ok_or_else(|| VaultError::NotFound(name.to_string()))
    }

    /// Items carrying **all** of `tags`, in insertion order.
    ///
    /// An empty query matches every item.
    pub fn get_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<&Item> {
        let mut matches: Vec<&Entry> = if tags.is_empty() {
            self.entries.values().collect()
        } else {
            // Start from the smallest bucket and filter the rest.
            let mut buckets = Vec::with_capacity(tags.len());
            for tag in tags {
                match self.tags.get(tag.as_ref()) {
                    Some(bucket) => buckets.push(bucket),
                    None => return Vec::new(),
                }
            }
            buckets.sort_by_key(|b| b.len());
            let Some((smallest, rest)) = buckets.split_first() else {
                return Vec::new();
            };

            smallest
                .iter()
                .filter(|name| rest.iter().all(|b| b.contains(*name)))
                .filter_map(|name| self.entries.get(name))
                .collect()
        };

        matches.sort_by_key(|e| e.seq);
        matches.into_iter().map(|e| &e.item).collect()
    }

    pub fn list_all_tags(&self) -> BTreeSet<String> {
        self.tags.keys().cloned().collect()
    }

    /// Name and tags of every item, in insertion order.
    pub fn list_items(&self) -> Vec<ItemSummary> {
        self.get_by_tags::<&str>(&[])
            .into_iter()
            .map(Item::summary)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Storage location of an item.
    pub fn location(&self, name: &str) -> Option<ItemId> {
        self.entries.get(name).map(|e| e.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The persisted form: loaded entries in insertion order, then the
    /// quarantined slots.
    pub fn manifest(&self) -> Manifest {
        let mut loaded: Vec<&Entry> = self.entries.values().collect();
        loaded.sort_by_key(|e| e.seq);

        let entries = loaded
            .into_iter()
            .map(|e| ManifestEntry {
                name: e.item.name.clone(),
                id: e.id,
            })
            .chain(self.quarantined.iter().cloned())
            .collect();
        Manifest { entries }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Insert or overwrite by name.
    ///
    /// An overwritten item keeps its position in insertion order.
    pub fn put(&mut self, item: Item, id: ItemId) {
        let name = item.name.clone();

        let seq = match self.entries.remove(&name) {
            Some(old) => {
                for tag in old.item.tags.difference(&item.tags) {
                    self.unlink_tag(tag, &name);
                }
                old.seq
            }
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };

        for tag in &item.tags {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(name.clone());
        }

        self.entries.insert(name, Entry { seq, id, item });
    }

    /// Delete an item and scrub it from every tag bucket.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(old) = self.entries.remove(name) else {
            return false;
        };
        for tag in &old.item.tags {
            self.unlink_tag(tag, name);
        }
        true
    }

    /// Move an item to a new name, keeping its tags, content, storage
    /// location and insertion position.
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        if !self.entries.contains_key(old_name) {
            return Err(VaultError::NotFound(old_name.to_string()));
        }
        if old_name == new_name {
            return Ok(());
        }
        if self.entries.contains_key(new_name) {
            return Err(VaultError::NameCollision(new_name.to_string()));
        }

        let Some(mut entry) = self.entries.remove(old_name) else {
            return Err(VaultError::NotFound(old_name.to_string()));
        };
        for tag in &entry.item.tags {
            if let Some(bucket) = self.tags.get_mut(tag) {
                bucket.remove(old_name);
                bucket.insert(new_name.to_string());
            }
        }
        entry.item.name = new_name.to_string();
        self.entries.insert(new_name.to_string(), entry);
        Ok(())
    }

    fn unlink_tag(&mut self, tag: &str, name: &str) {
        if let Some(bucket) = self.tags.get_mut(tag) {
            bucket.remove(name);
            if bucket.is_empty() {
                self.tags.remove(tag);
            }
        }
    }

    /// Check the tag-index invariants.  Used by tests.
    pub fn is_consistent(&self) -> bool {
        let forward = self.tags.iter().all(|(tag, names)| {
            !names.is_empty()
                && names.iter().all(|n| {
                    self.entries
                        .get(n)
                        .is_some_and(|e| e.item.tags.contains(tag))
                })
        });
        let backward = self.entries.iter().all(|(name, e)| {
            e.item.name == *name
                && e.item
                    .tags
                    .iter()
                    .all(|t| self.tags.get(t).is_some_and(|b| b.contains(name)))
        });
        forward && backward
    }
}
