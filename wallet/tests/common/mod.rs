//! Fixtures shared by the integration tests

#![allow(dead_code)]

use bitcoin::absolute::LockTime;
use bitcoin::block::{Header, Version as BlockVersion};
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, Block, BlockHash, CompactTarget, Network, OutPoint, ScriptBuf, ScriptHash, Sequence,
    Transaction, TxIn, TxMerkleNode, TxOut, Txid, Witness,
};
use spv_wallet::keychain::Seed;
use spv_wallet::{BlockRecord, HdKey};

pub const PHRASE: &str =
    "legal winner thank year wave sausage worth useful legal winner thank yellow";

/// Receiving key `index` of the wallet restored from [`PHRASE`].
pub fn phrase_key(index: u32, network: Network) -> HdKey {
    let seed = Seed::from_mnemonic(PHRASE).unwrap();
    HdKey::from_seed(&seed, network)
        .unwrap()
        .external_chain()
        .unwrap()
        .derive_child(index, false)
        .unwrap()
}

pub fn pay_to(key: &HdKey, value: u64) -> TxOut {
    TxOut {
        value: Amount::from_sat(value),
        script_pubkey: ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(key.script_hash_bytes())),
    }
}

pub fn spend(prev: OutPoint, key: &HdKey) -> TxIn {
    let script_sig = Builder::new()
        .push_slice(PushBytesBuf::try_from(vec![0x30u8; 72]).unwrap())
        .push_slice(PushBytesBuf::try_from(key.redeem_script().into_bytes()).unwrap())
        .into_script();
    TxIn {
        previous_output: prev,
        script_sig,
        sequence: Sequence::MAX,
        witness: Witness::new(),
    }
}

pub fn external_input(tag: u8) -> TxIn {
    TxIn {
        previous_output: OutPoint::new(Txid::from_byte_array([tag; 32]), 3),
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::new(),
    }
}

pub fn tx(input: Vec<TxIn>, output: Vec<TxOut>) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output,
    }
}

pub fn noise(tag: u8) -> Transaction {
    tx(
        vec![external_input(tag)],
        vec![TxOut {
            value: Amount::from_sat(12_345),
            script_pubkey: ScriptBuf::new_p2sh(&ScriptHash::from_byte_array([tag; 20])),
        }],
    )
}

pub struct Chain {
    prev: BlockHash,
    height: u64,
}

impl Chain {
    pub fn starting_at(height: u64) -> Self {
        Self {
            prev: BlockHash::all_zeros(),
            height,
        }
    }

    pub fn block(&mut self, txdata: Vec<Transaction>) -> BlockRecord {
        let mut block = Block {
            header: Header {
                version: BlockVersion::TWO,
                prev_blockhash: self.prev,
                merkle_root: TxMerkleNode::all_zeros(),
                time: 1_600_000_000 + self.height as u32 * 600,
                bits: CompactTarget::from_consensus(0x207f_ffff),
                nonce: self.height as u32,
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
