//! Script pattern recognition and address rendering.

use bitcoin::base58;
use bitcoin::blockdata::opcodes::all::OP_CHECKSIG;
use bitcoin::script::{Instruction, Script};

use crate::config::NetworkParams;

const COMPRESSED_PUBKEY_LEN: usize = 33;
const UNCOMPRESSED_PUBKEY_LEN: usize = 65;

/// Hash committed by a pay-to-script-hash locking script.
pub fn p2sh_hash(script_pubkey: &Script) -> Option<[u8; 20]> {
    if !script_pubkey.is_p2sh() {
        return None;
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&script_pubkey.as_bytes()[2..22]);
    Some(hash)
}

/// Public key of a `<pubkey> OP_CHECKSIG` redeem script.
pub fn single_key_pubkey(redeem_script: &Script) -> Option<&[u8]> {
    let bytes = redeem_script.as_bytes();
    let (&push, rest) = bytes.split_first()?;
    let (&last, key) = rest.split_last()?;
    let len = push as usize;
    if last != OP_CHECKSIG.to_u8() || key.len() != len {
        return None;
    }
    if len != COMPRESSED_PUBKEY_LEN && len != UNCOMPRESSED_PUBKEY_LEN {
        return None;
    }
    Some(key)
}

/// Public key from a script-hash unlocking script whose redeem script (the
/// final push) is a single-key script.
pub fn script_hash_input_pubkey(script_sig: &Script) -> Option<Vec<u8>> {
    let mut redeem: Option<&[u8]> = None;
    for instruction in script_sig.instructions() {
        match instruction.ok()? {
            Instruction::PushBytes(bytes) => redeem = Some(bytes.as_bytes()),
            // unlocking scripts of script-hash spends are push-only
            Instruction::Op(_) => return None,
        }
    }
    single_key_pubkey(Script::from_bytes(redeem?)).map(<[u8]>::to_vec)
}

/// Base58check script-hash address.
pub fn script_hash_address(hash: &[u8; 20], params: &NetworkParams) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(params.script_hash_version);
    payload.extend_from_slice(hash);
    base58::encode_check(&payload)
}
