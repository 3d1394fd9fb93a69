//! End-to-end sync/unwind scenarios driven through `SyncCoordinator`
//! against an in-memory node and store: an empty chain, a single
//! coinbase block, a reorg, crash recovery between the movements and
//! block writes, an out-of-sequence apply, and a deep unwind.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;

use bulwark_carver::address_cache::AddressCache;
use bulwark_carver::classify::ScriptClassifier;
use bulwark_carver::config::Config;
use bulwark_carver::error::{Error, Result};
use bulwark_carver::models::{Label, MovementType, ParsedMovement};
use bulwark_carver::rpc::{NodeClient, RpcBlock, RpcChainInfo, RpcScriptPubKey, RpcTransaction, RpcVin, RpcVout};
use bulwark_carver::sequence_applier::SequenceApplier;
use bulwark_carver::store::memory::MemoryStore;
use bulwark_carver::store::Store;
use bulwark_carver::sync_coordinator::SyncCoordinator;

/// A tiny scriptable node: a height-indexed chain of single-coinbase-tx
/// blocks, each paying a fixed reward to a deterministic address. Tests
/// mutate `blocks`/`txs` directly to simulate reorgs between sync passes.
struct FakeNode {
    blocks: Mutex<HashMap<u64, RpcBlock>>,
    txs: Mutex<HashMap<String, RpcTransaction>>,
    tip: Mutex<u64>,
}

impl FakeNode {
    fn new() -> Self {
        Self {
            blocks: Mutex::new(HashMap::new()),
            txs: Mutex::new(HashMap::new()),
            tip: Mutex::new(0),
        }
    }

    /// Appends a coinbase-only block at `height` paying `reward` to
    /// `address`, using `hash` as both its own hash and its coinbase txid.
    fn push_block(&self, height: u64, hash: &str, prev_hash: Option<&str>, reward: Decimal, address: &str) {
        let txid = format!("cb-{}", hash);
        let tx = RpcTransaction {
            txid: txid.clone(),
            vin: vec![RpcVin::Coinbase],
            vout: vec![RpcVout {
                n: 0,
                value: reward,
                script_pub_key: RpcScriptPubKey {
                    addresses: vec![address.to_string()],
                    script_type: "pubkeyhash".to_string(),
                },
            }],
            confirmed_height: Some(height),
        };
        let block = RpcBlock {
            height,
            hash: hash.to_string(),
            prev_hash: prev_hash.map(|s| s.to_string()),
            merkle_root: format!("merkle-{}", hash),
            bits: "1d00ffff".to_string(),
            nonce: 0,
            difficulty: 1.0,
            size: 250,
            version: 1,
            confirmations: 100,
            time: chrono::Utc::now(),
            tx_ids: vec![txid.clone()],
        };
        self.txs.lock().unwrap().insert(txid, tx);
        self.blocks.lock().unwrap().insert(height, block);
        let mut tip = self.tip.lock().unwrap();
        if height > *tip {
            *tip = height;
        }
    }

    fn set_tip(&self, height: u64) {
        *self.tip.lock().unwrap() = height;
    }
}

#[async_trait]
impl NodeClient for FakeNode {
    async fn get_info(&self) -> Result<RpcChainInfo> {
        Ok(RpcChainInfo {
            blocks: *self.tip.lock().unwrap(),
        })
    }

    async fn get_block_hash(&self, height: u64) -> Result<String> {
        self.blocks
            .lock()
            .unwrap()
            .get(&height)
            .map(|b| b.hash.clone())
            .ok_or_else(|| Error::Rpc(format!("no block at height {}", height)))
    }

    async fn get_block(&self, hash: &str) -> Result<RpcBlock> {
        self.blocks
            .lock()
            .unwrap()
            .values()
            .find(|b| b.hash == hash)
            .cloned()
            .ok_or_else(|| Error::Rpc(format!("no such block '{}'", hash)))
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<RpcTransaction> {
        self.txs
            .lock()
            .unwrap()
            .get(txid)
            .cloned()
            .ok_or_else(|| Error::Rpc(format!("no such tx '{}'", txid)))
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.lock_path = std::env::temp_dir().join(format!(
        "carver-sync-scenarios-{}-{}.lock",
        std::process::id(),
        rand_suffix()
    ));
    config.block_confirmations = 6;
    config
}

fn rand_suffix() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .subsec_nanos() as u64
}

#[tokio::test]
async fn empty_chain_syncs_nothing() {
    let node = FakeNode::new(); // tip stays 0, no block at height 1
    let store = MemoryStore::new();
    let classifier = ScriptClassifier;
    let config = test_config();

    let coordinator = SyncCoordinator::new(&config, &node, &store, &classifier);
    coordinator.run(None).await.unwrap();

    assert!(store.last_block().await.unwrap().is_none());
    assert_eq!(store.max_movement_sequence().await.unwrap(), 0);
}

#[tokio::test]
async fn single_coinbase_block_produces_two_movements_and_three_addresses() {
    let node = FakeNode::new();
    node.push_block(1, "h1", None, Decimal::new(5000, 2), "A");
    let store = MemoryStore::new();
    let classifier = ScriptClassifier;
    let config = test_config();

    let coordinator = SyncCoordinator::new(&config, &node, &store, &classifier);
    coordinator.run(None).await.unwrap();

    let block = store.last_block().await.unwrap().unwrap();
    assert_eq!(block.height, 1);
    assert_eq!(block.sequence_end, 2);

    let movements = store.movements_with_height_gte_desc(0, 10).await.unwrap();
    assert_eq!(movements.len(), 2);

    assert!(store.get_address(&Label::coinbase()).await.unwrap().is_some());
    assert!(store.get_address(&Label::tx("cb-h1")).await.unwrap().is_some());
    let a = store.get_address(&Label::address("A")).await.unwrap().unwrap();
    assert_eq!(a.balance, Decimal::new(5000, 2));
}

#[tokio::test]
async fn reorg_replaces_confirmed_height_on_merkle_root_mismatch() {
    let node = FakeNode::new();
    node.push_block(1, "h1", None, Decimal::new(5000, 2), "A");
    let store = MemoryStore::new();
    let classifier = ScriptClassifier;
    let config = test_config();

    {
        let coordinator = SyncCoordinator::new(&config, &node, &store, &classifier);
        coordinator.run(None).await.unwrap();
    }

    // The node now reports a different block at height 1 (its merkle root
    // differs), simulating a reorg the engine missed while it happened.
    node.push_block(1, "h1b", None, Decimal::new(5000, 2), "A");
    node.set_tip(1);

    let coordinator = SyncCoordinator::new(&config, &node, &store, &classifier);
    coordinator.run(None).await.unwrap();

    let block = store.last_block().await.unwrap().unwrap();
    assert_eq!(block.hash, "h1b");
}

#[tokio::test]
async fn crash_between_movements_and_block_is_repaired_on_next_run() {
    let node = FakeNode::new();
    node.push_block(1, "h1", None, Decimal::new(5000, 2), "A");
    let store = MemoryStore::new();
    let mut cache = AddressCache::new(1000);

    // Simulate a crash: movements and addresses were durably written for
    // height 1, but the block row never made it to disk.
    let mut applier = SequenceApplier::new(0);
    let parsed = vec![
        ParsedMovement {
            from: Label::coinbase(),
            to: Label::tx("cb-h1"),
            amount: Decimal::new(5000, 2),
            movement_type: MovementType::CoinbaseToTx,
            date: chrono::Utc::now(),
            block_height: 1,
            destination_address: None,
            pos_input_amount: None,
            pos_input_block_height_diff: None,
        },
        ParsedMovement {
            from: Label::tx("cb-h1"),
            to: Label::address("A"),
            amount: Decimal::new(5000, 2),
            movement_type: MovementType::TxToAddress,
            date: chrono::Utc::now(),
            block_height: 1,
            destination_address: None,
            pos_input_amount: None,
            pos_input_block_height_diff: None,
        },
    ];
    let (records, addresses) = applier.apply_block(parsed, &mut cache, &store).await.unwrap();
    store.insert_movements(records).await.unwrap();
    store.save_addresses(addresses).await.unwrap();
    // No insert_block call: the crash landed right here.

    let classifier = ScriptClassifier;
    let config = test_config();
    let coordinator = SyncCoordinator::new(&config, &node, &store, &classifier);
    coordinator.run(None).await.unwrap();

    // Recovery unwinds the orphaned height-1 work, then the sync loop
    // re-derives it cleanly with a block row this time.
    let block = store.last_block().await.unwrap().unwrap();
    assert_eq!(block.height, 1);
    assert_eq!(block.sequence_end, 2);
    let a = store.get_address(&Label::address("A")).await.unwrap().unwrap();
    assert_eq!(a.balance, Decimal::new(5000, 2));
}

#[tokio::test]
async fn out_of_sequence_apply_is_a_reconciliation_error() {
    let store = MemoryStore::new();
    let mut cache = AddressCache::new(1000);

    let mut stale = bulwark_carver::models::CarverAddress::new(Label::address("A"), 1);
    stale.sequence = 50;
    cache.put(stale);

    let mut applier = SequenceApplier::new(1);
    let parsed = vec![ParsedMovement {
        from: Label::coinbase(),
        to: Label::address("A"),
        amount: Decimal::ONE,
        movement_type: MovementType::CoinbaseToTx,
        date: chrono::Utc::now(),
        block_height: 1,
        destination_address: None,
        pos_input_amount: None,
        pos_input_block_height_diff: None,
    }];

    let err = applier.apply_block(parsed, &mut cache, &store).await.unwrap_err();
    assert!(matches!(err, Error::Reconciliation { .. }));
}

#[tokio::test]
async fn deep_unwind_restores_every_touched_address_to_pre_chain_state() {
    const DEPTH: u64 = 200;

    let node = FakeNode::new();
    for h in 1..=DEPTH {
        node.push_block(h, &format!("h{}", h), Some(&format!("h{}", h - 1)), Decimal::new(100, 2), "A");
    }
    let store = MemoryStore::new();
    let classifier = ScriptClassifier;
    let config = test_config();

    let coordinator = SyncCoordinator::new(&config, &node, &store, &classifier);
    coordinator.run(None).await.unwrap();

    let a = store.get_address(&Label::address("A")).await.unwrap().unwrap();
    assert_eq!(a.balance, Decimal::new(100, 2) * Decimal::from(DEPTH));

    coordinator.undo_only(1).await.unwrap();

    assert!(store.last_block().await.unwrap().is_none());
    assert!(store.get_address(&Label::address("A")).await.unwrap().is_none());
    assert!(store.get_address(&Label::coinbase()).await.unwrap().is_none());
    assert_eq!(store.max_movement_sequence().await.unwrap(), 0);
    assert_eq!(store.max_address_sequence().await.unwrap(), 0);
}
