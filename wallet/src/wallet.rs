//! Wallet engine.
//!
//! Owns the wallet identity, the sync cursor and every write to the store.
//! Each operation builds a [`StoreBatch`] against a copy of the cursor and
//! only adopts the new cursor once the batch committed, so a failed commit
//! leaves memory and store in agreement.

use std::ops::Range;

use bitcoin::consensus::encode;
use bitcoin::{BlockHash, OutPoint, Transaction, Txid};
use tracing::{debug, info, warn};

use crate::config::{NetworkParams, WalletConfig, DEFAULT_LOOK_AHEAD};
use crate::error::{StoreError, WalletError};
use crate::events::{EventReceiver, EventSender, WalletEvent};
use crate::filter::RelevanceFilter;
use crate::keychain::{HdKey, Seed};
use crate::script;
use crate::store::{StoreBatch, WalletStore};
use crate::types::{BlockRecord, FilteredBlock, SyncCursor, UtxoEntry, WalletInfo};

/// How to open a wallet.
#[derive(Clone)]
pub struct WalletOptions {
    pub params: NetworkParams,
    pub look_ahead: u32,
    /// Seed phrase used instead of a random seed when the store is empty.
    pub mnemonic: Option<String>,
}

impl WalletOptions {
    pub fn new(params: NetworkParams) -> Self {
        Self {
            params,
            look_ahead: DEFAULT_LOOK_AHEAD,
            mnemonic: None,
        }
    }

    pub fn from_config(config: &WalletConfig) -> Result<Self, WalletError> {
        config.validate()?;
        Ok(Self {
            params: config.network_params()?,
            look_ahead: config.look_ahead,
            mnemonic: None,
        })
    }

    pub fn with_look_ahead(mut self, look_ahead: u32) -> Self {
        self.look_ahead = look_ahead;
        self
    }

    pub fn with_mnemonic(mut self, phrase: impl Into<String>) -> Self {
        self.mnemonic = Some(phrase.into());
        self
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        self.params.validate()?;
        if self.look_ahead == 0 {
            return Err(WalletError::Config("look_ahead must be >= 1".to_string()));
        }
        if let Some(phrase) = &self.mnemonic {
            Seed::from_mnemonic(phrase).map_err(|e| WalletError::Config(e.to_string()))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for WalletOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletOptions")
            .field("network", &self.params.name)
            .field("look_ahead", &self.look_ahead)
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// A receiving key handed out by [`Wallet::create_key`].
#[derive(Debug, Clone)]
pub struct WalletKey {
    pub index: u32,
    pub key: HdKey,
}

pub struct Wallet {
    store: WalletStore,
    params: NetworkParams,
    look_ahead: u32,
    external: HdKey,
    cursor: SyncCursor,
    info: WalletInfo,
    events: EventSender,
    ready: bool,
}

impl Wallet {
    /// Load or create the wallet identity, bring the key index up to the
    /// look-ahead window and publish [`WalletEvent::Ready`].
    ///
    /// The returned receiver queues every event until read; drop it if
    /// notifications are not needed.
    pub fn open(store: WalletStore, options: WalletOptions) -> Result<(Self, EventReceiver), WalletError> {
        options.validate()?;
        let (events, receiver) = EventSender::channel();

        let mut wallet = Self::load(store, &options, events)?;
        wallet.update_keys()?;
        wallet.ready = true;

        info!(
            "Wallet ready at height {} ({} keys used, {} derived)",
            wallet.cursor.height, wallet.cursor.keys.used, wallet.cursor.keys.derived
        );
        wallet.events.publish(WalletEvent::Ready(wallet.cursor.clone()));
        Ok((wallet, receiver))
    }

    pub fn open_with_config(config: &WalletConfig) -> Result<(Self, EventReceiver), WalletError> {
        let options = WalletOptions::from_config(config)?;
        let store = WalletStore::open(config.store_path())?.with_flush_on_commit(config.flush_on_commit);
        Self::open(store, options)
    }

    fn load(store: WalletStore, options: &WalletOptions, events: EventSender) -> Result<Self, WalletError> {
        let sync = store.load_sync()?;
        let info = store.load_info()?;
        let seed = store.load_seed()?;

        let (cursor, info, seed) = match (sync, info, seed) {
            (Some(cursor), Some(info), Some(seed)) => {
                if info.network != options.params.name {
                    return Err(WalletError::Config(format!(
                        "wallet store belongs to {}, not {}",
                        info.network, options.params.name
                    )));
                }
                if options.mnemonic.is_some() {
                    warn!("Wallet store already initialized, ignoring supplied mnemonic");
                }
                info!("Resuming wallet created {} at height {}", info.date, cursor.height);
                (cursor, info, seed)
            }
            (None, None, None) => Self::initialize(&store, options)?,
            (sync, info, seed) => {
                return Err(WalletError::InitConflict {
                    sync: sync.is_some(),
                    info: info.is_some(),
                    seed: seed.is_some(),
                })
            }
        };

        let external = HdKey::from_seed(&seed, options.params.bip32_network)?.external_chain()?;

        Ok(Self {
            store,
            params: options.params.clone(),
            look_ahead: options.look_ahead,
            external,
            cursor,
            info,
            events,
            ready: false,
        })
    }

    fn initialize(
        store: &WalletStore,
        options: &WalletOptions,
    ) -> Result<(SyncCursor, WalletInfo, Seed), WalletError> {
        let seed = match &options.mnemonic {
            Some(phrase) => Seed::from_mnemonic(phrase)?,
            None => Seed::generate(),
        };
        let cursor = SyncCursor::default();
        let info = WalletInfo::new(&options.params.name);

        let mut batch = StoreBatch::new();
        batch.create_identity(&cursor, &info, &seed)?;
        store.commit(batch).map_err(|e| match e {
            StoreError::AlreadyExists(_) => WalletError::AlreadyInitialized,
            other => other.into(),
        })?;

        info!(
            "Initialized new {} wallet{}",
            options.params.name,
            if options.mnemonic.is_some() { " from mnemonic" } else { "" }
        );
        Ok((cursor, info, seed))
    }

    pub fn cursor(&self) -> &SyncCursor {
        &self.cursor
    }

    pub fn info(&self) -> &WalletInfo {
        &self.info
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn look_ahead(&self) -> u32 {
        self.look_ahead
    }

    pub fn store(&self) -> &WalletStore {
        &self.store
    }

    pub(crate) fn event_sender(&self) -> EventSender {
        self.events.clone()
    }

    /// A filter reading this wallet's key index.
    pub fn relevance_filter(&self) -> RelevanceFilter {
        RelevanceFilter::new(self.store.key_index())
    }

    fn derive(&self, index: u32) -> Result<HdKey, WalletError> {
        self.external.derive_child(index, false)
    }

    fn derive_elements(&self, range: Range<u32>) -> Result<Vec<(u32, [Vec<u8>; 2])>, WalletError> {
        range
            .map(|index| Ok((index, self.derive(index)?.elements())))
            .collect()
    }

    /// Stage key-index growth up to `used + look_ahead` into `batch`,
    /// advancing `next.keys.derived`. Returns the new elements.
    fn extend_keys(&self, next: &mut SyncCursor, batch: &mut StoreBatch) -> Result<Vec<Vec<u8>>, WalletError> {
        let target = next.key_target(self.look_ahead);
        let from = next.keys.derived;
        if from >= target {
            return Ok(Vec::new());
        }

        let mut grown = Vec::with_capacity(2 * (target - from) as usize);
        for (index, elements) in self.derive_elements(from..target)? {
            for element in elements {
                batch.put_key_index(&element, index);
                grown.push(element);
            }
        }
        next.keys.derived = target;
        debug!("Staged keys {}..{} for the key index", from, target);
        Ok(grown)
    }

    fn publish_keys(&self, grown: Vec<Vec<u8>>) {
        if self.ready && !grown.is_empty() {
            self.events.publish(WalletEvent::KeysDerived(grown));
        }
    }

    /// Derive and index keys up to `used + look_ahead`. Returns the number of
    /// keys added; zero means nothing was written.
    pub fn update_keys(&mut self) -> Result<u32, WalletError> {
        let mut next = self.cursor.clone();
        let mut batch = StoreBatch::new();
        let grown = self.extend_keys(&mut next, &mut batch)?;
        if grown.is_empty() {
            return Ok(0);
        }

        batch.put_sync(&next)?;
        self.store.commit(batch)?;

        let added = next.keys.derived - self.cursor.keys.derived;
        info!("Key index extended to {} keys", next.keys.derived);
        self.cursor = next;
        self.publish_keys(grown);
        Ok(added)
    }

    /// Allocate the next never-issued receiving key.
    pub fn create_key(&mut self) -> Result<WalletKey, WalletError> {
        let index = self.cursor.keys.used;
        let key = self.derive(index)?;

        let mut next = self.cursor.clone();
        next.keys.used = index + 1;
        let mut batch = StoreBatch::new();
        let grown = self.extend_keys(&mut next, &mut batch)?;
        batch.put_sync(&next)?;
        self.store.commit(batch)?;

        debug!("Allocated key {}", index);
        self.cursor = next;
        self.publish_keys(grown);
        Ok(WalletKey { index, key })
    }

    /// Allocate the next receiving key and render its script-hash address.
    pub fn create_address(&mut self) -> Result<String, WalletError> {
        let allocated = self.create_key()?;
        Ok(script::script_hash_address(&allocated.key.script_hash_bytes(), &self.params))
    }

    /// Address of the key at `index`, without allocating it.
    pub fn address_at(&self, index: u32) -> Result<String, WalletError> {
        let key = self.derive(index)?;
        Ok(script::script_hash_address(&key.script_hash_bytes(), &self.params))
    }

    /// Receiving-chain extended public key under the network's version bytes.
    pub fn account_xpub(&self) -> String {
        self.external.encode_xpub(self.params.xpub_version)
    }

    /// Every identifying element of keys `[0, used + look_ahead)`, recomputed
    /// from the seed.
    pub fn filter_elements(&self) -> Result<Vec<Vec<u8>>, WalletError> {
        let target = self.cursor.key_target(self.look_ahead);
        Ok(self
            .derive_elements(0..target)?
            .into_iter()
            .flat_map(|(_, elements)| elements)
            .collect())
    }

    fn check_order(&self, block: &FilteredBlock) -> Result<(), WalletError> {
        match self.cursor.hash {
            None if block.height < self.cursor.height => Err(WalletError::MalformedBlock(format!(
                "block height {} is below sync height {}",
                block.height, self.cursor.height
            ))),
            None => Ok(()),
            Some(_) if block.height != self.cursor.height + 1 => {
                Err(WalletError::MalformedBlock(format!(
                    "expected block at height {}, got {}",
                    self.cursor.height + 1,
                    block.height
                )))
            }
            Some(tip) if block.prev_hash != tip => Err(WalletError::MalformedBlock(format!(
                "block {} at height {} does not extend {}",
                block.hash, block.height, tip
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Apply one filtered block as a single atomic commit.
    pub fn process_block(&mut self, block: &FilteredBlock) -> Result<(), WalletError> {
        self.check_order(block)?;

        let mut next = self.cursor.clone();
        next.height = block.height;
        next.hash = Some(block.hash);

        let mut batch = StoreBatch::new();
        let mut grown = Vec::new();

        if !block.is_empty() {
            for relevant in &block.transactions {
                batch.put_transaction(&relevant.txid, encode::serialize(&relevant.tx));
                for input in &relevant.inputs {
                    batch.remove_utxo(&input.previous_output);
                }
                for output in &relevant.outputs {
                    let entry = UtxoEntry {
                        script: output.script.clone(),
                        value: output.value,
                        index: output.index,
                        key_index: output.key_index,
                    };
                    batch.put_utxo(&OutPoint::new(relevant.txid, output.index), &entry)?;
                }
            }
            batch.put_block(&block.hash, &block.txids())?;

            // on-chain usage ahead of local bookkeeping, e.g. after a restore
            if let Some(max) = block.max_output_key_index() {
                if max >= next.keys.used {
                    next.keys.used = max + 1;
                }
            }
            grown = self.extend_keys(&mut next, &mut batch)?;
        }

        batch.put_sync(&next)?;
        if let Err(e) = self.store.commit(batch) {
            warn!("Failed to commit block {} at height {}: {}", block.hash, block.height, e);
            return Err(e.into());
        }

        debug!(
            "Committed block {} at height {} ({} relevant transactions)",
            block.hash,
            block.height,
            block.transactions.len()
        );
        self.cursor = next;
        self.publish_keys(grown);
        self.events.publish(WalletEvent::SyncProgress(self.cursor.clone()));
        Ok(())
    }

    /// Filter and process a raw block in one step.
    pub fn ingest(&mut self, record: &BlockRecord) -> Result<(), WalletError> {
        let filtered = self.relevance_filter().filter_block(record)?;
        self.process_block(&filtered)
    }

    pub fn unspent(&self) -> Result<Vec<(OutPoint, UtxoEntry)>, WalletError> {
        Ok(self.store.list_utxos()?)
    }

    pub fn balance(&self) -> Result<u64, WalletError> {
        Ok(self.unspent()?.iter().map(|(_, utxo)| utxo.value).sum())
    }

    /// Balance excluding outputs below the network's minimum output value.
    pub fn spendable_balance(&self) -> Result<u64, WalletError> {
        Ok(self
            .unspent()?
            .iter()
            .filter(|(_, utxo)| utxo.value >= self.params.min_output_value)
            .map(|(_, utxo)| utxo.value)
            .sum())
    }

    pub fn transaction(&self, txid: &Txid) -> Result<Option<Transaction>, WalletError> {
        match self.store.get_transaction(txid)? {
            Some(raw) => encode::deserialize(&raw)
                .map(Some)
                .map_err(|e| WalletError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn block_transactions(&self, hash: &BlockHash) -> Result<Option<Vec<Txid>>, WalletError> {
        Ok(self.store.get_block(hash)?)
    }

    pub fn key_index_of(&self, element: &[u8]) -> Result<Option<u32>, WalletError> {
        Ok(self.store.key_index().lookup(element)?)
    }
}
