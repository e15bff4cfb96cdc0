//! Engine configuration (`cabinet.toml`).

pub mod settings;

pub use settings::Settings;
