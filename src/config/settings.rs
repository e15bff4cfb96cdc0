use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::kdf::Argon2Params;
use crate::errors::{Result, VaultError};

/// Engine configuration, loaded from `<root>/cabinet.toml`.
///
/// Every field has a sensible default so Cabinet works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory (relative to the root) holding account records.
    #[serde(default = "default_secrets_dir")]
    pub secrets_dir: String,

    /// Directory (relative to the root) holding vaults.
    #[serde(default = "default_vaults_dir")]
    pub vaults_dir: String,

    /// Argon2 memory cost in KiB (default: 64 MB).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count (default: 3).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2 parallelism degree (default: 4).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// Create a vault on first open instead of failing with `VaultNotFound`.
    #[serde(default = "default_create_missing_vaults")]
    pub create_missing_vaults: bool,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_secrets_dir() -> String {
    "secrets".to_string()
}

fn default_vaults_dir() -> String {
    "vaults".to_string()
}

fn default_argon2_memory_kib() -> u32 {
    65_536 // 64 MB
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

fn default_create_missing_vaults() -> bool {
    true
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            secrets_dir: default_secrets_dir(),
            vaults_dir: default_vaults_dir(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            create_missing_vaults: default_create_missing_vaults(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the root directory.
    pub const FILE_NAME: &'static str = "cabinet.toml";

    /// Load settings from `<root>/cabinet.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            VaultError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        Ok(settings)
    }

    /// Directory of account records, e.g. `root/secrets`.
    pub fn secrets_path(&self, root: &Path) -> PathBuf {
        root.join(&self.secrets_dir)
    }

    /// Directory of vaults, e.g. `root/vaults`.
    pub fn vaults_path(&self, root: &Path) -> PathBuf {
        root.join(&self.vaults_dir)
    }

    /// Convert the Argon2 settings into crypto-layer params.
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sensible() {
        let s = Settings::default();
        assert_eq!(s.secrets_dir, "secrets");
        assert_eq!(s.vaults_dir, "vaults");
        assert_eq!(s.argon2_memory_kib, 65_536);
        assert_eq!(s.argon2_iterations, 3);
        assert_eq!(s.argon2_parallelism, 4);
        assert!(s.create_missing_vaults);
    }

    #[test]
    fn load_returns_defaults_when_no_config_file() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn load_parses_toml_file() {
        let tmp = TempDir::new().unwrap();
        let config = r#"
secrets_dir = "keys"
vaults_dir = "data"
argon2_memory_kib = 131072
argon2_iterations = 5
argon2_parallelism = 8
create_missing_vaults = false
"#;
        fs::write(tmp.path().join("cabinet.toml"), config).unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.secrets_dir, "keys");
        assert_eq!(settings.vaults_dir, "data");
        assert_eq!(settings.argon2_memory_kib, 131_072);
        assert_eq!(settings.argon2_iterations, 5);
        assert_eq!(settings.argon2_parallelism, 8);
        assert!(!settings.create_missing_vaults);
    }

    #[test]
    fn load_uses_defaults_for_missing_fields() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("cabinet.toml"), "argon2_iterations = 2\n").unwrap();

        let settings = Settings::load(tmp.path()).unwrap();
        assert_eq!(settings.argon2_iterations, 2);
        assert_eq!(settings.vaults_dir, "vaults");
        assert_eq!(settings.argon2_memory_kib, 65_536);
    }

    #[test]
    fn load_errors_on_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("cabinet.toml"), "not valid {{toml").unwrap();

        let result = Settings::load(tmp.path());
        assert!(matches!(result, Err(VaultError::ConfigError(_))));
    }

    #[test]
    fn paths_respect_custom_dirs() {
        let s = Settings {
            vaults_dir: "data".to_string(),
            ..Settings::default()
        };
        let root = Path::new("/home/user/.config/cabinet");
        assert_eq!(
            s.vaults_path(root),
            PathBuf::from("/home/user/.config/cabinet/data")
        );
        assert_eq!(
            s.secrets_path(root),
            PathBuf::from("/home/user/.config/cabinet/secrets")
        );
    }
}
