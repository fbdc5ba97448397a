use bitcoin::{Block, BlockHash, OutPoint, ScriptBuf, Transaction, Txid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key-range extents of the sync cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExtents {
    /// Keys derived and present in the key index, `[0, derived)`.
    pub derived: u32,
    /// Keys handed out or observed on chain, `[0, used)`.
    pub used: u32,
}

/// Persisted checkpoint of block and key progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub height: u64,
    /// Hash of the block at `height`, `None` until a block is processed.
    pub hash: Option<BlockHash>,
    pub keys: KeyExtents,
}

impl SyncCursor {
    /// Upper bound the key index must reach for a given look-ahead window.
    pub fn key_target(&self, look_ahead: u32) -> u32 {
        self.keys.used.saturating_add(look_ahead)
    }
}

/// Written once on first open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub date: DateTime<Utc>,
    pub version: String,
    /// Name of the network parameters the wallet was created with.
    pub network: String,
}

impl WalletInfo {
    pub fn new(network: &str) -> Self {
        Self {
            date: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            network: network.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub(crate) struct SeedRecord {
    pub seed: Vec<u8>,
}

/// An unspent output owned by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub script: ScriptBuf,
    pub value: u64,
    /// Output index inside its transaction.
    pub index: u32,
    /// Derivation index of the owning key.
    pub key_index: u32,
}

/// A block as delivered by the chain source, with its height.
#[derive(Debug, Clone)]
pub struct BlockRecord {
    pub height: u64,
    pub block: Block,
}

impl BlockRecord {
    pub fn new(height: u64, block: Block) -> Self {
        Self { height, block }
    }

    pub fn hash(&self) -> BlockHash {
        self.block.block_hash()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevantInput {
    /// Input position inside the transaction.
    pub index: u32,
    pub previous_output: OutPoint,
    pub key_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevantOutput {
    pub index: u32,
    pub script: ScriptBuf,
    pub value: u64,
    pub key_index: u32,
}

/// A transaction with at least one input or output touching wallet keys.
#[derive(Debug, Clone)]
pub struct RelevantTransaction {
    pub txid: Txid,
    pub tx: Transaction,
    pub inputs: Vec<RelevantInput>,
    pub outputs: Vec<RelevantOutput>,
}

/// Output of the relevance filter for one block.
#[derive(Debug, Clone)]
pub struct FilteredBlock {
    pub height: u64,
    pub hash: BlockHash,
    pub prev_hash: BlockHash,
    pub transactions: Vec<RelevantTransaction>,
}

impl FilteredBlock {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn txids(&self) -> Vec<Txid> {
        self.transactions.iter().map(|tx| tx.txid).collect()
    }

    /// Highest derivation index among relevant outputs.
    pub fn max_output_key_index(&self) -> Option<u32> {
        self.transactions
            .iter()
            .flat_map(|tx| tx.outputs.iter())
            .map(|output| output.key_index)
            .max()
    }
}
