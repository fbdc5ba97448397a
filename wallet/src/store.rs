//! Sled-backed wallet store.
//!
//! One tree per concern. Every mutation goes through a [`StoreBatch`] that is
//! applied by [`WalletStore::commit`] inside a single multi-tree sled
//! transaction, so either all of its writes become visible or none do.

use std::path::Path;
use std::str::FromStr;

use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, OutPoint, Txid};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use tracing::{debug, info};
use zeroize::Zeroize;

use crate::error::StoreError;
use crate::keychain::Seed;
use crate::types::{SeedRecord, SyncCursor, UtxoEntry, WalletInfo};

const META_TREE: &str = "meta";
const KEYS_TREE: &str = "keys";
const UNSPENT_TREE: &str = "unspent";
const TRANSACTIONS_TREE: &str = "transactions";
const BLOCKS_TREE: &str = "blocks";

pub const SYNC_KEY: &[u8] = b"sync";
pub const INFO_KEY: &[u8] = b"info";
pub const SEED_KEY: &[u8] = b"key";

/// Named store sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Meta,
    Keys,
    Unspent,
    Transactions,
    Blocks,
}

impl Section {
    pub fn name(&self) -> &'static str {
        match self {
            Section::Meta => META_TREE,
            Section::Keys => KEYS_TREE,
            Section::Unspent => UNSPENT_TREE,
            Section::Transactions => TRANSACTIONS_TREE,
            Section::Blocks => BLOCKS_TREE,
        }
    }
}

#[derive(Debug, Clone)]
enum BatchOp {
    Put { section: Section, key: Vec<u8>, value: Vec<u8> },
    /// Insert that aborts the whole batch if the key exists at commit time.
    Create { section: Section, key: Vec<u8>, value: Vec<u8> },
    Remove { section: Section, key: Vec<u8> },
}

impl BatchOp {
    fn section(&self) -> Section {
        match self {
            BatchOp::Put { section, .. }
            | BatchOp::Create { section, .. }
            | BatchOp::Remove { section, .. } => *section,
        }
    }
}

/// Ordered put/create/remove operations across sections, committed as one unit.
#[derive(Debug, Clone, Default)]
pub struct StoreBatch {
    ops: Vec<BatchOp>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn put(&mut self, section: Section, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            section,
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn create(&mut self, section: Section, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Create {
            section,
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn remove(&mut self, section: Section, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Remove {
            section,
            key: key.into(),
        });
    }

    pub fn put_sync(&mut self, cursor: &SyncCursor) -> Result<(), StoreError> {
        self.put(Section::Meta, SYNC_KEY, encode(cursor)?);
        Ok(())
    }

    /// Identity records are only ever created, never overwritten.
    pub fn create_identity(
        &mut self,
        cursor: &SyncCursor,
        info: &WalletInfo,
        seed: &Seed,
    ) -> Result<(), StoreError> {
        self.create(Section::Meta, SYNC_KEY, encode(cursor)?);
        self.create(Section::Meta, INFO_KEY, encode(info)?);
        let mut record = SeedRecord {
            seed: seed.as_bytes().to_vec(),
        };
        let encoded = encode(&record);
        record.seed.zeroize();
        self.create(Section::Meta, SEED_KEY, encoded?);
        Ok(())
    }

    pub fn put_key_index(&mut self, element: &[u8], index: u32) {
        self.put(Section::Keys, element, index.to_be_bytes());
    }

    pub fn put_utxo(&mut self, outpoint: &OutPoint, entry: &UtxoEntry) -> Result<(), StoreError> {
        self.put(Section::Unspent, outpoint_key(outpoint), encode(entry)?);
        Ok(())
    }

    pub fn remove_utxo(&mut self, outpoint: &OutPoint) {
        self.remove(Section::Unspent, outpoint_key(outpoint));
    }

    pub fn put_transaction(&mut self, txid: &Txid, raw: Vec<u8>) {
        self.put(Section::Transactions, txid.to_byte_array(), raw);
    }

    pub fn put_block(&mut self, hash: &BlockHash, txids: &[Txid]) -> Result<(), StoreError> {
        self.put(Section::Blocks, hash.to_byte_array(), encode(&txids.to_vec())?);
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

/// `<txid hex>:<vout>`
pub fn outpoint_key(outpoint: &OutPoint) -> String {
    format!("{}:{}", outpoint.txid, outpoint.vout)
}

pub fn parse_outpoint_key(key: &[u8]) -> Result<OutPoint, StoreError> {
    let text = std::str::from_utf8(key)
        .map_err(|e| StoreError::Corrupt(format!("unspent key: {}", e)))?;
    let (txid, vout) = text
        .split_once(':')
        .ok_or_else(|| StoreError::Corrupt(format!("unspent key: {}", text)))?;
    let txid = Txid::from_str(txid).map_err(|e| StoreError::Corrupt(format!("unspent txid: {}", e)))?;
    let vout = vout
        .parse::<u32>()
        .map_err(|e| StoreError::Corrupt(format!("unspent vout: {}", e)))?;
    Ok(OutPoint::new(txid, vout))
}

fn decode_index(element: &[u8], bytes: &[u8]) -> Result<u32, StoreError> {
    let array: [u8; 4] = bytes.try_into().map_err(|_| {
        StoreError::Corrupt(format!(
            "key index value of {} bytes for element {}",
            bytes.len(),
            hex::encode(element)
        ))
    })?;
    Ok(u32::from_be_bytes(array))
}

/// Read-only view of the key index, shareable with the relevance filter.
#[derive(Clone)]
pub struct KeyIndex {
    tree: Tree,
}

impl KeyIndex {
    pub fn lookup(&self, element: &[u8]) -> Result<Option<u32>, StoreError> {
        match self.tree.get(element)? {
            Some(bytes) => Ok(Some(decode_index(element, &bytes)?)),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

pub struct WalletStore {
    db: Db,
    meta: Tree,
    keys: Tree,
    unspent: Tree,
    transactions: Tree,
    blocks: Tree,
    flush_on_commit: bool,
    #[cfg(test)]
    fail_next_commit: std::sync::atomic::AtomicBool,
}

impl WalletStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        info!("Opening wallet store at {:?}", path.as_ref());
        Self::from_db(sled::open(path)?)
    }

    /// In-memory store removed on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        Ok(Self {
            meta: db.open_tree(META_TREE)?,
            keys: db.open_tree(KEYS_TREE)?,
            unspent: db.open_tree(UNSPENT_TREE)?,
            transactions: db.open_tree(TRANSACTIONS_TREE)?,
            blocks: db.open_tree(BLOCKS_TREE)?,
            db,
            flush_on_commit: false,
            #[cfg(test)]
            fail_next_commit: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn with_flush_on_commit(mut self, flush: bool) -> Self {
        self.flush_on_commit = flush;
        self
    }

    /// Make the next non-empty commit fail before touching any tree.
    #[cfg(test)]
    pub(crate) fn fail_next_commit(&self) {
        self.fail_next_commit
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Apply every operation of `batch` atomically.
    pub fn commit(&self, batch: StoreBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        #[cfg(test)]
        if self.fail_next_commit.swap(false, std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Database(sled::Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected commit failure",
            ))));
        }

        let result = (&self.meta, &self.keys, &self.unspent, &self.transactions, &self.blocks)
            .transaction(|(meta, keys, unspent, transactions, blocks)| {
                for op in &batch.ops {
                    let tree = match op.section() {
                        Section::Meta => meta,
                        Section::Keys => keys,
                        Section::Unspent => unspent,
                        Section::Transactions => transactions,
                        Section::Blocks => blocks,
                    };
                    match op {
                        BatchOp::Put { key, value, .. } => {
                            tree.insert(key.as_slice(), value.as_slice())?;
                        }
                        BatchOp::Create { section, key, value } => {
                            if tree.get(key.as_slice())?.is_some() {
                                return Err(ConflictableTransactionError::Abort(
                                    StoreError::AlreadyExists(format!(
                                        "{}/{}",
                                        section.name(),
                                        String::from_utf8_lossy(key)
                                    )),
                                ));
                            }
                            tree.insert(key.as_slice(), value.as_slice())?;
                        }
                        BatchOp::Remove { key, .. } => {
                            tree.remove(key.as_slice())?;
                        }
                    }
                }
                Ok(())
            });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(StoreError::Database(e)),
        }

        if self.flush_on_commit {
            self.db.flush()?;
        }
        debug!("Committed batch of {} operations", batch.len());
        Ok(())
    }

    fn get_meta<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StoreError> {
        match self.meta.get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn load_sync(&self) -> Result<Option<SyncCursor>, StoreError> {
        self.get_meta(SYNC_KEY)
    }

    pub fn load_info(&self) -> Result<Option<WalletInfo>, StoreError> {
        self.get_meta(INFO_KEY)
    }

    pub(crate) fn load_seed(&self) -> Result<Option<Seed>, StoreError> {
        let record: Option<SeedRecord> = self.get_meta(SEED_KEY)?;
        Ok(record.map(|r| Seed::from_bytes(r.seed)))
    }

    pub fn key_index(&self) -> KeyIndex {
        KeyIndex {
            tree: self.keys.clone(),
        }
    }

    pub fn get_utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, StoreError> {
        match self.unspent.get(outpoint_key(outpoint))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn list_utxos(&self) -> Result<Vec<(OutPoint, UtxoEntry)>, StoreError> {
        let mut utxos = Vec::new();
        for item in self.unspent.iter() {
            let (key, value) = item?;
            utxos.push((parse_outpoint_key(&key)?, decode(&value)?));
        }
        Ok(utxos)
    }

    pub fn get_transaction(&self, txid: &Txid) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.transactions.get(txid.to_byte_array())?.map(|v| v.to_vec()))
    }

    pub fn get_block(&self, hash: &BlockHash) -> Result<Option<Vec<Txid>>, StoreError> {
        match self.blocks.get(hash.to_byte_array())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn section_len(&self, section: Section) -> usize {
        match section {
            Section::Meta => self.meta.len(),
            Section::Keys => self.keys.len(),
            Section::Unspent => self.unspent.len(),
            Section::Transactions => self.transactions.len(),
            Section::Blocks => self.blocks.len(),
        }
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}
