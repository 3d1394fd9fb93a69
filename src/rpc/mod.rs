//! Node RPC boundary.
//!
//! Treated as an external collaborator: this module only defines the shape
//! the rest of the engine needs and one concrete adapter. Nothing here
//! decides chain validity — the engine trusts whatever the node reports.

pub mod bitcoind;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// A single transaction input: either a reference to a prior output, or a
/// coinbase marker.
#[derive(Debug, Clone)]
pub enum RpcVin {
    Coinbase,
    Spend { txid: String, vout: u32 },
}

#[derive(Debug, Clone)]
pub struct RpcScriptPubKey {
    pub addresses: Vec<String>,
    pub script_type: String,
}

#[derive(Debug, Clone)]
pub struct RpcVout {
    pub n: u32,
    pub value: rust_decimal::Decimal,
    pub script_pub_key: RpcScriptPubKey,
}

#[derive(Debug, Clone)]
pub struct RpcTransaction {
    pub txid: String,
    pub vin: Vec<RpcVin>,
    pub vout: Vec<RpcVout>,
    /// Height of the block this transaction is confirmed in, when the node
    /// reports one (an unconfirmed mempool tx has none). Used to compute how
    /// many blocks old a spent output was when it fed a coinstake.
    pub confirmed_height: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RpcBlock {
    pub height: u64,
    pub hash: String,
    pub prev_hash: Option<String>,
    pub merkle_root: String,
    pub bits: String,
    pub nonce: u64,
    pub difficulty: f64,
    pub size: u64,
    pub version: i32,
    pub confirmations: i64,
    pub time: DateTime<Utc>,
    pub tx_ids: Vec<String>,
}

/// `getinfo`'s `{blocks: integer}` summary.
#[derive(Debug, Clone, Copy)]
pub struct RpcChainInfo {
    pub blocks: u64,
}

/// The node RPC surface this engine depends on:
/// `getinfo`, `getblockhash`, `getblock`, `getrawtransaction`.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn get_info(&self) -> Result<RpcChainInfo>;
    async fn get_block_hash(&self, height: u64) -> Result<String>;
    async fn get_block(&self, hash: &str) -> Result<RpcBlock>;
    async fn get_raw_transaction(&self, txid: &str) -> Result<RpcTransaction>;
}
