//! Cabinet: a personal secrets vault.
//!
//! Named, tagged items are stored encrypted at rest under a key derived
//! from the account password.  Start with [`VaultEngine`]:
//!
//! ```no_run
//! use cabinet::{Settings, VaultEngine};
//! # fn main() -> cabinet::Result<()> {
//! let root = std::path::Path::new("/home/alice/.config/cabinet");
//! let engine = VaultEngine::open(root, Settings::default(), "alice", b"p@ss", "personal")?;
//! engine.add("wifi", ["home"], [("ssid", "NET1"), ("psk", "secret")])?;
//! let wifi = engine.get("wifi")?;
//! # let _ = wifi;
//! engine.close();
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod audit;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod vault;

pub use config::Settings;
pub use errors::{Result, VaultError};
pub use vault::{Content, EngineState, Item, ItemSummary, LoadReport, LoadWarning, VaultEngine};
