use std::path::{Path, PathBuf};

use bitcoin::Network;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::WalletError;

/// Number of unused keys kept derived and indexed past the last used one.
pub const DEFAULT_LOOK_AHEAD: u32 = 20;

/// Filtered blocks the filter stage may hold ahead of the commit stage.
pub const DEFAULT_PIPELINE_DEPTH: usize = 16;

/// Network parameters a wallet identity is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub name: String,
    /// Network tag handed to the BIP-32 primitive.
    pub bip32_network: Network,
    pub pubkey_hash_version: u8,
    pub script_hash_version: u8,
    /// Version bytes of serialized extended public keys.
    pub xpub_version: [u8; 4],
    /// Version bytes of serialized extended private keys.
    pub xprv_version: [u8; 4],
    pub message_prefix: String,
    /// Outputs below this value are tracked but not counted as spendable.
    pub min_output_value: u64,
}

impl NetworkParams {
    pub fn mainnet() -> Self {
        Self {
            name: "mainnet".to_string(),
            bip32_network: Network::Bitcoin,
            pubkey_hash_version: 0x00,
            script_hash_version: 0x05,
            xpub_version: [0x04, 0x88, 0xb2, 0x1e],
            xprv_version: [0x04, 0x88, 0xad, 0xe4],
            message_prefix: "\x18Bitcoin Signed Message:\n".to_string(),
            min_output_value: 546,
        }
    }

    pub fn testnet() -> Self {
        Self {
            name: "testnet".to_string(),
            bip32_network: Network::Testnet,
            pubkey_hash_version: 0x6f,
            script_hash_version: 0xc4,
            xpub_version: [0x04, 0x35, 0x87, 0xcf],
            xprv_version: [0x04, 0x35, 0x83, 0x94],
            message_prefix: "\x18Bitcoin Signed Message:\n".to_string(),
            min_output_value: 546,
        }
    }

    pub fn regtest() -> Self {
        Self {
            name: "regtest".to_string(),
            bip32_network: Network::Regtest,
            ..Self::testnet()
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mainnet" | "bitcoin" => Some(Self::mainnet()),
            "testnet" => Some(Self::testnet()),
            "regtest" => Some(Self::regtest()),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        if self.name.trim().is_empty() {
            return Err(WalletError::Config("network.name cannot be empty".to_string()));
        }
        if self.message_prefix.is_empty() {
            return Err(WalletError::Config(
                "network.message_prefix cannot be empty".to_string(),
            ));
        }
        if self.pubkey_hash_version == self.script_hash_version {
            return Err(WalletError::Config(format!(
                "network {} uses the same address version 0x{:02x} for key and script hashes",
                self.name, self.script_hash_version
            )));
        }
        if self.xpub_version == self.xprv_version {
            return Err(WalletError::Config(format!(
                "network {} uses the same extended key version for public and private keys",
                self.name
            )));
        }
        Ok(())
    }
}

/// File and environment backed settings for a wallet instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub data_dir: PathBuf,
    /// Preset name, see [`NetworkParams::by_name`].
    pub network: String,
    pub look_ahead: u32,
    pub flush_on_commit: bool,
    pub pipeline_depth: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".spv-wallet"),
            network: "testnet".to_string(),
            look_ahead: DEFAULT_LOOK_AHEAD,
            flush_on_commit: true,
            pipeline_depth: DEFAULT_PIPELINE_DEPTH,
        }
    }
}

impl WalletConfig {
    /// Layer defaults, an optional TOML file and `SPV_WALLET_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, WalletError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        match path {
            Some(path) if path.exists() => {
                info!("Loading wallet configuration from: {:?}", path);
                builder = builder.add_source(File::from(path));
            }
            Some(path) => warn!("Wallet configuration {:?} not found, using defaults", path),
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix("SPV_WALLET")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: WalletConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        if self.look_ahead == 0 {
            return Err(WalletError::Config("look_ahead must be >= 1".to_string()));
        }
        if self.pipeline_depth == 0 {
            return Err(WalletError::Config("pipeline_depth must be >= 1".to_string()));
        }
        self.network_params()?.validate()
    }

    pub fn network_params(&self) -> Result<NetworkParams, WalletError> {
        NetworkParams::by_name(&self.network)
            .ok_or_else(|| WalletError::Config(format!("unknown network: {}", self.network)))
    }

    /// Location of the sled database inside the data directory.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("wallet.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // tests below read the process environment through `load`
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_presets_validate() {
        for params in [NetworkParams::mainnet(), NetworkParams::testnet(), NetworkParams::regtest()] {
            params.validate().unwrap();
        }
        assert_eq!(NetworkParams::by_name("Bitcoin"), Some(NetworkParams::mainnet()));
        assert!(NetworkParams::by_name("signet-ish").is_none());
    }

    #[test]
    fn test_colliding_versions_rejected() {
        let mut params = NetworkParams::testnet();
        params.script_hash_version = params.pubkey_hash_version;
        assert!(matches!(params.validate(), Err(WalletError::Config(_))));

        let mut params = NetworkParams::mainnet();
        params.xprv_version = params.xpub_version;
        assert!(params.validate().is_err());

        let mut params = NetworkParams::mainnet();
        params.message_prefix.clear();
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = WalletConfig::default();
        config.validate().unwrap();

        config.look_ahead = 0;
        assert!(config.validate().is_err());

        let config = WalletConfig { network: "moonnet".to_string(), ..WalletConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallet.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "network = \"mainnet\"").unwrap();
        writeln!(file, "look_ahead = 5").unwrap();
        writeln!(file, "data_dir = \"/var/lib/spv-wallet\"").unwrap();

        let config = WalletConfig::load(Some(&path)).unwrap();
        assert_eq!(config.look_ahead, 5);
        assert_eq!(config.network_params().unwrap(), NetworkParams::mainnet());
        assert_eq!(config.store_path(), PathBuf::from("/var/lib/spv-wallet/wallet.db"));
        assert!(config.flush_on_commit);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let config = WalletConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.look_ahead, DEFAULT_LOOK_AHEAD);
        assert_eq!(config.pipeline_depth, DEFAULT_PIPELINE_DEPTH);
    }

    #[test]
    fn test_environment_overrides_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallet.toml");
        std::fs::write(&path, "look_ahead = 5\nnetwork = \"mainnet\"\n").unwrap();

        std::env::set_var("SPV_WALLET_LOOK_AHEAD", "7");
        std::env::set_var("SPV_WALLET_NETWORK", "regtest");
        let loaded = WalletConfig::load(Some(&path));
        std::env::remove_var("SPV_WALLET_LOOK_AHEAD");
        std::env::remove_var("SPV_WALLET_NETWORK");

        let config = loaded.unwrap();
        assert_eq!(config.look_ahead, 7);
        assert_eq!(config.network, "regtest");
    }
}
