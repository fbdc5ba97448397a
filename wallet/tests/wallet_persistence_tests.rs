mod common;

use common::*;
use spv_wallet::store::{Section, INFO_KEY, SEED_KEY, SYNC_KEY};
use spv_wallet::keychain::Seed;
use spv_wallet::{
    NetworkParams, StoreBatch, StoreError, SyncCursor, Wallet, WalletConfig, WalletError,
    WalletInfo, WalletOptions, WalletStore,
};
use std::path::Path;
use tempfile::tempdir;

const LOOK_AHEAD: u32 = 5;

fn options() -> WalletOptions {
    WalletOptions::new(NetworkParams::regtest()).with_look_ahead(LOOK_AHEAD)
}

fn open_at(path: &Path, options: WalletOptions) -> Result<Wallet, WalletError> {
    let store = WalletStore::open(path)?.with_flush_on_commit(true);
    Wallet::open(store, options).map(|(wallet, _events)| wallet)
}

#[test]
fn test_reopen_resumes_cursor_and_identity() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wallet.db");

    let (cursor, info, first_address, xpub) = {
        let mut wallet = open_at(&path, options()).unwrap();
        let first_address = wallet.create_address().unwrap();
        wallet.create_key().unwrap();
        wallet.create_key().unwrap();
        (
            wallet.cursor().clone(),
            wallet.info().clone(),
            first_address,
            wallet.account_xpub(),
        )
    };
    assert_eq!(cursor.keys.used, 3);

    let mut wallet = open_at(&path, options()).unwrap();
    assert_eq!(wallet.cursor(), &cursor);
    assert_eq!(wallet.info(), &info);
    assert_eq!(wallet.address_at(0).unwrap(), first_address);
    assert_eq!(wallet.account_xpub(), xpub);
    assert_eq!(wallet.create_key().unwrap().index, 3);
}

#[test]
fn test_reopen_with_wider_window_extends_index() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wallet.db");

    {
        let mut wallet = open_at(&path, options()).unwrap();
        wallet.create_key().unwrap();
    }

    let wallet = open_at(&path, options().with_look_ahead(12)).unwrap();
    assert_eq!(wallet.cursor().keys.used, 1);
    assert_eq!(wallet.cursor().keys.derived, 13);
    assert_eq!(wallet.store().key_index().len(), 2 * 13);
}

#[test]
fn test_processed_blocks_survive_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wallet.db");
    let mut chain = Chain::starting_at(100);

    let tip = {
        let mut wallet = open_at(&path, options().with_mnemonic(PHRASE)).unwrap();
        let key = phrase_key(1, bitcoin::Network::Regtest);
        let funding = tx(vec![external_input(1)], vec![pay_to(&key, 75_000)]);
        let block = chain.block(vec![noise(2), funding]);
        wallet.ingest(&block).unwrap();
        block.hash()
    };

    let mut wallet = open_at(&path, options()).unwrap();
    assert_eq!(wallet.cursor().height, 100);
    assert_eq!(wallet.cursor().hash, Some(tip));
    assert_eq!(wallet.cursor().keys.used, 2);
    assert_eq!(wallet.balance().unwrap(), 75_000);

    // the resumed wallet keeps following the same chain
    wallet.ingest(&chain.block(vec![noise(3)])).unwrap();
    assert_eq!(wallet.cursor().height, 101);
}

#[test]
fn test_missing_sync_record_is_init_conflict() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wallet.db");
    let info = open_at(&path, options()).unwrap().info().clone();

    let store = WalletStore::open(&path).unwrap();
    let mut batch = StoreBatch::new();
    batch.remove(Section::Meta, SYNC_KEY);
    store.commit(batch).unwrap();

    match Wallet::open(store, options()) {
        Err(WalletError::InitConflict { sync, info, seed }) => {
            assert!(!sync);
            assert!(info);
            assert!(seed);
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("open succeeded on a partial identity"),
    }

    // nothing was rewritten
    let store = WalletStore::open(&path).unwrap();
    assert_eq!(store.load_sync().unwrap(), None);
    assert_eq!(store.load_info().unwrap(), Some(info));
    assert_eq!(store.section_len(Section::Meta), 2);
}

#[test]
fn test_lone_seed_record_is_init_conflict() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wallet.db");
    drop(open_at(&path, options()).unwrap());

    let store = WalletStore::open(&path).unwrap();
    let mut batch = StoreBatch::new();
    batch.remove(Section::Meta, SYNC_KEY);
    batch.remove(Section::Meta, INFO_KEY);
    store.commit(batch).unwrap();

    let err = Wallet::open(store, options().with_mnemonic(PHRASE)).err().unwrap();
    assert!(matches!(
        err,
        WalletError::InitConflict { sync: false, info: false, seed: true }
    ));
    assert!(!err.is_recoverable());
}

#[test]
fn test_identity_is_never_overwritten() {
    let store = WalletStore::temporary().unwrap();
    let (wallet, _events) = Wallet::open(store, options()).unwrap();
    let cursor = wallet.cursor().clone();

    let mut batch = StoreBatch::new();
    batch
        .create_identity(&SyncCursor::default(), &WalletInfo::new("regtest"), &Seed::generate())
        .unwrap();
    assert!(matches!(
        wallet.store().commit(batch),
        Err(StoreError::AlreadyExists(_))
    ));

    assert_eq!(wallet.store().load_sync().unwrap(), Some(cursor));
    assert_eq!(wallet.store().section_len(Section::Meta), 3);
}

#[test]
fn test_failed_batch_leaves_no_partial_writes() {
    let store = WalletStore::temporary().unwrap();
    let (wallet, _events) = Wallet::open(store, options()).unwrap();
    let keys_before = wallet.store().key_index().len();

    let mut batch = StoreBatch::new();
    batch.put_key_index(&[0xab; 20], 999);
    batch.create(Section::Meta, SEED_KEY, vec![0u8; 8]);
    assert!(wallet.store().commit(batch).is_err());

    assert_eq!(wallet.key_index_of(&[0xab; 20]).unwrap(), None);
    assert_eq!(wallet.store().key_index().len(), keys_before);
}

#[test]
fn test_open_with_config() {
    let dir = tempdir().unwrap();
    let config = WalletConfig {
        data_dir: dir.path().to_path_buf(),
        network: "regtest".to_string(),
        look_ahead: 4,
        ..WalletConfig::default()
    };

    let address = {
        let (wallet, _events) = Wallet::open_with_config(&config).unwrap();
        assert_eq!(wallet.look_ahead(), 4);
        assert_eq!(wallet.params().name, "regtest");
        assert_eq!(wallet.cursor().keys.derived, 4);
        wallet.address_at(0).unwrap()
    };
    assert!(config.store_path().exists());

    let (mut wallet, _events) = Wallet::open_with_config(&config).unwrap();
    assert_eq!(wallet.create_address().unwrap(), address);
}

#[test]
fn test_open_with_unknown_network_fails() {
    let dir = tempdir().unwrap();
    let config = WalletConfig {
        data_dir: dir.path().to_path_buf(),
        network: "moonnet".to_string(),
        ..WalletConfig::default()
    };
    assert!(matches!(
        Wallet::open_with_config(&config),
        Err(WalletError::Config(_))
    ));
    assert!(!config.store_path().exists());
}

#[test]
fn test_reopen_under_other_network_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wallet.db");
    let info = open_at(&path, options()).unwrap().info().clone();
    assert_eq!(info.network, "regtest");

    let testnet = WalletOptions::new(NetworkParams::testnet()).with_look_ahead(LOOK_AHEAD);
    assert!(matches!(open_at(&path, testnet), Err(WalletError::Config(_))));

    let wallet = open_at(&path, options()).unwrap();
    assert_eq!(wallet.info(), &info);
}
