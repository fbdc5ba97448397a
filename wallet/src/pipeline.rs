//! Pipelined block ingestion.
//!
//! Two stages connected by bounded channels: the filter stage annotates
//! incoming blocks and may run up to `depth` blocks ahead, the commit stage
//! owns the wallet and applies filtered blocks strictly in arrival order.
//! Both stages touch the store, so they run on the blocking thread pool.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::events::WalletEvent;
use crate::types::{BlockRecord, FilteredBlock};
use crate::wallet::Wallet;

pub struct SyncHandle {
    blocks: mpsc::Sender<BlockRecord>,
    filter_task: JoinHandle<()>,
    commit_task: JoinHandle<Wallet>,
}

impl SyncHandle {
    /// Queue the next block; waits while the filter stage is full.
    pub async fn submit(&self, record: BlockRecord) -> Result<(), WalletError> {
        self.blocks
            .send(record)
            .await
            .map_err(|_| WalletError::Pipeline("sync pipeline has stopped".to_string()))
    }

    /// Close the input, wait for queued blocks to commit, flush the store
    /// and hand the wallet back.
    pub async fn finish(self) -> Result<Wallet, WalletError> {
        drop(self.blocks);
        self.filter_task
            .await
            .map_err(|e| WalletError::Pipeline(format!("filter stage: {}", e)))?;
        let wallet = self
            .commit_task
            .await
            .map_err(|e| WalletError::Pipeline(format!("commit stage: {}", e)))?;
        wallet.store().flush()?;
        Ok(wallet)
    }
}

/// Move `wallet` into a filter/commit pipeline. Must be called from within a
/// tokio runtime.
pub fn spawn_sync(wallet: Wallet, depth: usize) -> SyncHandle {
    let depth = depth.max(1);
    let (block_tx, mut block_rx) = mpsc::channel::<BlockRecord>(depth);
    let (filtered_tx, mut filtered_rx) = mpsc::channel::<FilteredBlock>(depth);

    let filter = wallet.relevance_filter();
    let filter_events = wallet.event_sender();
    let filter_task = tokio::task::spawn_blocking(move || {
        while let Some(record) = block_rx.blocking_recv() {
            match filter.filter_block(&record) {
                Ok(filtered) => {
                    if filtered_tx.blocking_send(filtered).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to filter block at height {}: {}", record.height, e);
                    filter_events.publish(WalletEvent::Error(format!(
                        "filter failed at height {}: {}",
                        record.height, e
                    )));
                }
            }
        }
    });

    let commit_events = wallet.event_sender();
    let commit_task = tokio::task::spawn_blocking(move || {
        let mut wallet = wallet;
        let mut committed = 0usize;
        while let Some(filtered) = filtered_rx.blocking_recv() {
            match wallet.process_block(&filtered) {
                Ok(()) => committed += 1,
                Err(e) => {
                    error!("Failed to process block at height {}: {}", filtered.height, e);
                    commit_events.publish(WalletEvent::Error(format!(
                        "block at height {} rejected: {}",
                        filtered.height, e
                    )));
                }
            }
        }
        info!("Sync pipeline drained after {} committed blocks", committed);
        wallet
    });

    SyncHandle {
        blocks: block_tx,
        filter_task,
        commit_task,
    }
}

/// [`spawn_sync`] with the configured pipeline depth.
pub fn spawn_configured(wallet: Wallet, config: &WalletConfig) -> SyncHandle {
    spawn_sync(wallet, config.pipeline_depth)
}
