use thiserror::Error;

/// All errors that can occur in Cabinet.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Crypto errors ---
    #[error("Authentication failed: wrong password or tampered data")]
    AuthenticationFailure,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- Account errors ---
    #[error("Account '{0}' not found")]
    AccountNotFound(String),

    #[error("Account record is corrupt: {0}")]
    AccountCorrupt(String),

    // --- Vault errors ---
    #[error("Vault '{vault}' not found for account '{account}'")]
    VaultNotFound { account: String, vault: String },

    #[error("Vault data is corrupt: {0}")]
    Corrupt(String),

    #[error("No vault is open")]
    NotOpen,

    #[error("Another open is already in progress")]
    OpenInProgress,

    #[error("Vault was opened read-only")]
    ReadOnly,

    // --- Item errors ---
    #[error("Item '{0}' not found")]
    NotFound(String),

    #[error("Item '{0}' already exists (use `update` to change it)")]
    DuplicateName(String),

    #[error("Cannot rename: an item named '{0}' already exists")]
    NameCollision(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Audit error: {0}")]
    AuditError(String),
}

impl VaultError {
    /// `true` when the failure means "wrong password or tampered data".
    ///
    /// Callers use this to drive a bounded password retry loop.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailure)
    }

    /// `true` for "item not found", never for a missing vault or account.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Convenience type alias for Cabinet results.
pub type Result<T> = std::result::Result<T, VaultError>;
