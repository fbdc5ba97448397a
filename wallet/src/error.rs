use thiserror::Error;

/// Failures raised by the atomic store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Wallet store is partially initialized (sync: {sync}, info: {info}, seed: {seed})")]
    InitConflict { sync: bool, info: bool, seed: bool },

    #[error("Wallet store is already initialized")]
    AlreadyInitialized,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    #[error("Malformed block: {0}")]
    MalformedBlock(String),

    #[error("Invalid mnemonic: {0}")]
    Mnemonic(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Sync pipeline error: {0}")]
    Pipeline(String),
}

impl WalletError {
    /// Operation-level failures leave the wallet usable; the next correctly
    /// ordered block or key request can still succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WalletError::Store(_) | WalletError::MalformedBlock(_) | WalletError::Serialization(_)
        )
    }
}

impl From<bitcoin::bip32::Error> for WalletError {
    fn from(err: bitcoin::bip32::Error) -> Self {
        WalletError::KeyDerivation(err.to_string())
    }
}

impl From<config::ConfigError> for WalletError {
    fn from(err: config::ConfigError) -> Self {
        WalletError::Config(err.to_string())
    }
}
