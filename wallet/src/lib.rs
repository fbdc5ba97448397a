//! Bookkeeping core of a lightweight wallet: look-ahead key derivation,
//! block relevance filtering and atomically persisted UTXO tracking.

pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod keychain;
pub mod logging;
pub mod pipeline;
pub mod script;
pub mod store;
pub mod types;
pub mod wallet;

mod test_common;

pub use config::{NetworkParams, WalletConfig};
pub use error::{StoreError, WalletError};
pub use events::{EventReceiver, WalletEvent};
pub use filter::RelevanceFilter;
pub use keychain::HdKey;
pub use pipeline::{spawn_configured, spawn_sync, SyncHandle};
pub use store::{StoreBatch, WalletStore};
pub use types::{BlockRecord, FilteredBlock, KeyExtents, SyncCursor, UtxoEntry, WalletInfo};
pub use wallet::{Wallet, WalletKey, WalletOptions};
