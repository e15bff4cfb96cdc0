//! Encrypted item storage.
//!
//! This module provides:
//! - `Item`, `Content` and `ItemSummary` types (`item`)
//! - Binary envelope and atomic writes (`format`)
//! - Item and manifest encryption (`codec`)
//! - The per-vault directory layout (`layout`)
//! - The in-memory name and tag index (`index`)
//! - The `VaultEngine` façade (`engine`)

pub mod codec;
pub mod engine;
pub mod format;
pub mod index;
pub mod item;
pub mod layout;

// Re-export the most commonly used items.
pub use engine::{EngineState, VaultEngine};
pub use index::{LoadReport, LoadWarning, VaultIndex};
pub use item::{Content, Item, ItemSummary};
pub use layout::{ItemId, VaultLayout};
