use ethereum_types::{Address, H256, U256};
use replay_state::{
    Account, InMemoryStateDb, StateDb, StateError, VmState, WORLD_STATE_FILE, WorldState,
};

#[test]
fn directory_backed_state_survives_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let address = Address::from_low_u64_be(7);

    let mut db = InMemoryStateDb::open(dir.path(), false).unwrap();
    db.begin_block(1).unwrap();
    db.begin_transaction(0).unwrap();
    db.create_account(address);
    db.set_balance(address, U256::from(42));
    db.set_storage(address, H256::from_low_u64_be(1), H256::from_low_u64_be(2));
    db.end_transaction().unwrap();
    db.end_block().unwrap();
    let hash = db.state_hash().unwrap();
    db.close().unwrap();
    assert!(matches!(db.close(), Err(StateError::Closed)));

    let reopened = InMemoryStateDb::open(dir.path(), false).unwrap();
    assert_eq!(reopened.get_balance(&address), U256::from(42));
    assert_eq!(reopened.state_hash().unwrap(), hash);
}

#[test]
fn world_state_json_uses_hex_encoding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(WORLD_STATE_FILE);
    let address = Address::from_low_u64_be(1);
    let world = WorldState::new().with_account(
        address,
        Account::new(U256::from(1), 3).with_code(vec![0x60, 0x00]),
    );
    world.write_json_file(&path).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"0x6000\""));
    assert_eq!(WorldState::from_json_file(&path).unwrap(), world);
}

#[test]
fn unopened_directory_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let db = InMemoryStateDb::open(&dir.path().join("missing"), true).unwrap();
    assert!(db.world_state().is_empty());
    assert_eq!(db.get_archive_block_height().unwrap(), None);
}
