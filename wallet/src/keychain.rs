//! Hierarchical deterministic key handling.
//!
//! Thin adapter over `bitcoin::bip32`: seed to root key, child derivation
//! (hardened or not) and the two identifying byte strings the wallet tracks
//! for every key, its compressed public key and the HASH160 of its
//! single-key redeem script.

use bitcoin::base58;
use bitcoin::bip32::{ChildNumber, Xpriv, Xpub};
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{Network, ScriptBuf};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::WalletError;

/// Length of freshly generated seeds.
pub const SEED_LEN: usize = 32;

/// Hardened account index of the wallet's single account.
pub const ACCOUNT_INDEX: u32 = 0;

/// Non-hardened chain index of receiving keys.
pub const EXTERNAL_CHAIN: u32 = 0;

/// Seed bytes, wiped from memory on drop.
pub struct Seed(Vec<u8>);

impl Seed {
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; SEED_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// BIP-39 English phrase to its 64-byte seed, empty passphrase.
    pub fn from_mnemonic(phrase: &str) -> Result<Self, WalletError> {
        let mnemonic = bip39::Mnemonic::parse_in_normalized(bip39::Language::English, phrase)
            .map_err(|e| WalletError::Mnemonic(e.to_string()))?;
        Ok(Self(mnemonic.to_seed("").to_vec()))
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for Seed {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Seed([REDACTED])")
    }
}

/// A private extended key together with the context needed to derive from it.
#[derive(Clone)]
pub struct HdKey {
    xpriv: Xpriv,
    secp: Secp256k1<All>,
}

impl HdKey {
    pub fn from_seed(seed: &Seed, network: Network) -> Result<Self, WalletError> {
        let xpriv = Xpriv::new_master(network, seed.as_bytes())?;
        Ok(Self {
            xpriv,
            secp: Secp256k1::new(),
        })
    }

    pub fn derive_child(&self, index: u32, hardened: bool) -> Result<Self, WalletError> {
        let child = if hardened {
            ChildNumber::from_hardened_idx(index)?
        } else {
            ChildNumber::from_normal_idx(index)?
        };
        let xpriv = self.xpriv.derive_priv(&self.secp, &[child])?;
        Ok(Self {
            xpriv,
            secp: self.secp.clone(),
        })
    }

    /// `m/0'/0`, the parent of every receiving key.
    pub fn external_chain(&self) -> Result<Self, WalletError> {
        self.derive_child(ACCOUNT_INDEX, true)?
            .derive_child(EXTERNAL_CHAIN, false)
    }

    pub fn xpub(&self) -> Xpub {
        Xpub::from_priv(&self.secp, &self.xpriv)
    }

    pub fn public_key(&self) -> bitcoin::PublicKey {
        bitcoin::PublicKey::new(self.xpub().public_key)
    }

    /// Compressed SEC1 public key.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.xpub().public_key.serialize().to_vec()
    }

    /// `<pubkey> OP_CHECKSIG`
    pub fn redeem_script(&self) -> ScriptBuf {
        ScriptBuf::new_p2pk(&self.public_key())
    }

    pub fn script_hash_bytes(&self) -> [u8; 20] {
        self.redeem_script().script_hash().to_byte_array()
    }

    /// Both identifying elements, public key first.
    pub fn elements(&self) -> [Vec<u8>; 2] {
        [self.public_key_bytes(), self.script_hash_bytes().to_vec()]
    }

    /// Base58check extended public key under caller supplied version bytes.
    pub fn encode_xpub(&self, version: [u8; 4]) -> String {
        let mut data = self.xpub().encode();
        data[..4].copy_from_slice(&version);
        base58::encode_check(&data)
    }
}

impl std::fmt::Debug for HdKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdKey")
            .field("fingerprint", &self.xpriv.fingerprint(&self.secp))
            .field("depth", &self.xpriv.depth)
            .field("child_number", &self.xpriv.child_number)
            .finish()
    }
}
