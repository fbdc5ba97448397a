//! Transaction and block builders shared by unit tests

#![cfg(test)]

use bitcoin::absolute::LockTime;
use bitcoin::block::{Header, Version as BlockVersion};
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, Block, BlockHash, CompactTarget, OutPoint, ScriptBuf, ScriptHash, Sequence,
    Transaction, TxIn, TxMerkleNode, TxOut, Txid, Witness,
};

use crate::types::BlockRecord;

pub fn p2sh_output(script_hash: &[u8], value: u64) -> TxOut {
    let mut hash = [0u8; 20];
    hash.copy_from_slice(script_hash);
    TxOut {
        value: Amount::from_sat(value),
        script_pubkey: ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(hash)),
    }
}

/// Script-hash spend of `prev` whose redeem script is `<pubkey> OP_CHECKSIG`.
pub fn p2sh_spend(prev: OutPoint, pubkey: &[u8]) -> TxIn {
    let mut redeem = vec![pubkey.len() as u8];
    redeem.extend_from_slice(pubkey);
    redeem.push(0xac);
    let script_sig = Builder::new()
        .push_slice(PushBytesBuf::try_from(vec![0x30u8; 71]).unwrap())
        .push_slice(PushBytesBuf::try_from(redeem).unwrap())
        .into_script();
    TxIn {
        previous_output: prev,
        script_sig,
        sequence: Sequence::MAX,
        witness: Witness::new(),
    }
}

pub fn foreign_input(tag: u8) -> TxIn {
    TxIn {
        previous_output: OutPoint::new(Txid::from_byte_array([tag; 32]), 0),
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::new(),
    }
}

pub fn transaction(input: Vec<TxIn>, output: Vec<TxOut>) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output,
    }
}

/// Transaction touching no wallet key.
pub fn unrelated_tx(tag: u8) -> Transaction {
    transaction(
        vec![foreign_input(tag)],
        vec![TxOut {
            value: Amount::from_sat(1_000 + tag as u64),
            script_pubkey: ScriptBuf::new_p2sh(&ScriptHash::from_byte_array([tag; 20])),
        }],
    )
}

/// Hands out height-contiguous, hash-linked blocks.
pub struct ChainBuilder {
    prev: BlockHash,
    height: u64,
}

impl ChainBuilder {
    pub fn new(first_height: u64) -> Self {
        Self {
            prev: BlockHash::all_zeros(),
            height: first_height,
        }
    }

    pub fn next(&mut self, txdata: Vec<Transaction>) -> BlockRecord {
        let mut block = Block {
            header: Header {
                version: BlockVersion::ONE,
                prev_blockhash: self.prev,
                merkle_root: TxMerkleNode::all_zeros(),
                time: 1_700_000_000 + self.height as u32,
                bits: CompactTarget::from_consensus(0x207f_ffff),
                nonce: 0,
            },
            txdata,
        };
        if let Some(root) = block.compute_merkle_root() {
            block.header.merkle_root = root;
        }
        let record = BlockRecord::new(self.height, block);
        self.prev = record.hash();
        self.height += 1;
        record
    }
}
