//! Block relevance filter.
//!
//! Reads the key index only. Index growth is monotonic, so running ahead of
//! the commits that extend it can delay a match but never invent one.

use bitcoin::Transaction;
use tracing::trace;

use crate::error::WalletError;
use crate::script;
use crate::store::KeyIndex;
use crate::types::{BlockRecord, FilteredBlock, RelevantInput, RelevantOutput, RelevantTransaction};

#[derive(Clone)]
pub struct RelevanceFilter {
    keys: KeyIndex,
}

impl RelevanceFilter {
    pub fn new(keys: KeyIndex) -> Self {
        Self { keys }
    }

    pub fn filter_block(&self, record: &BlockRecord) -> Result<FilteredBlock, WalletError> {
        let mut transactions = Vec::new();
        for tx in &record.block.txdata {
            if let Some(relevant) = self.filter_transaction(tx)? {
                transactions.push(relevant);
            }
        }

        trace!(
            "Block {} at height {}: {} of {} transactions relevant",
            record.hash(),
            record.height,
            transactions.len(),
            record.block.txdata.len()
        );

        Ok(FilteredBlock {
            height: record.height,
            hash: record.hash(),
            prev_hash: record.block.header.prev_blockhash,
            transactions,
        })
    }

    pub fn filter_transaction(
        &self,
        tx: &Transaction,
    ) -> Result<Option<RelevantTransaction>, WalletError> {
        let mut inputs = Vec::new();
        for (index, input) in tx.input.iter().enumerate() {
            let Some(pubkey) = script::script_hash_input_pubkey(&input.script_sig) else {
                continue;
            };
            if let Some(key_index) = self.keys.lookup(&pubkey)? {
                inputs.push(RelevantInput {
                    index: index as u32,
                    previous_output: input.previous_output,
                    key_index,
                });
            }
        }

        let mut outputs = Vec::new();
        for (index, output) in tx.output.iter().enumerate() {
            let Some(hash) = script::p2sh_hash(&output.script_pubkey) else {
                continue;
            };
            if let Some(key_index) = self.keys.lookup(&hash)? {
                outputs.push(RelevantOutput {
                    index: index as u32,
                    script: output.script_pubkey.clone(),
                    value: output.value.to_sat(),
                    key_index,
                });
            }
        }

        if inputs.is_empty() && outputs.is_empty() {
            return Ok(None);
        }

        Ok(Some(RelevantTransaction {
            txid: tx.txid(),
            tx: tx.clone(),
            inputs,
            outputs,
        }))
    }
}
