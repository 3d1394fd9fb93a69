//! A `NodeClient` backed by Bitcoin Core's JSON-RPC interface.
//!
//! `bitcoincore_rpc::Client` is a blocking client; each call is driven
//! through `tokio::task::spawn_blocking` so it behaves as a proper
//! suspension point on the async side.
//!
//! Deliberately calls through `RpcApi::call` with raw JSON rather than the
//! crate's typed `get_block_info`/`get_raw_transaction_info` helpers: those
//! helpers model a specific Bitcoin Core version's response shape, whereas
//! this engine only needs a handful of fields and would rather tolerate
//! extra/missing ones than break on a node version bump.

use std::sync::Arc;

use async_trait::async_trait;
use bitcoincore_rpc::{Auth, Client, RpcApi};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::config::RpcConfig;
use crate::error::{Error, Result};

use super::{NodeClient, RpcBlock, RpcChainInfo, RpcScriptPubKey, RpcTransaction, RpcVin, RpcVout};

pub struct BitcoindClient {
    client: Arc<Client>,
    timeout: std::time::Duration,
}

impl BitcoindClient {
    pub fn connect(config: &RpcConfig) -> Result<Self> {
        let auth = match (&config.user, &config.password) {
            (Some(user), Some(pass)) => Auth::UserPass(user.clone(), pass.clone()),
            _ => Auth::None,
        };
        let client = Client::new(&config.url, auth).map_err(Error::from)?;
        Ok(Self {
            client: Arc::new(client),
            timeout: config.timeout(),
        })
    }

    /// Every call is a suspension point wrapped in the configured timeout
    /// (default ~8s per the engine's cancellation model) — a node that hangs
    /// aborts the current block rather than the whole process; no `Block`
    /// row gets written, so the block is simply retried next run.
    async fn call<T>(&self, method: &'static str, params: Vec<Value>) -> Result<T>
    where
        T: for<'de> Deserialize<'de> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        let call = tokio::task::spawn_blocking(move || client.call::<T>(method, &params));

        match tokio::time::timeout(self.timeout, call).await {
            Ok(joined) => joined
                .map_err(|e| Error::Rpc(format!("rpc task panicked: {}", e)))?
                .map_err(Error::from),
            Err(_) => Err(Error::Rpc(format!(
                "rpc call '{}' timed out after {:?}",
                method, self.timeout
            ))),
        }
    }
}

#[derive(Deserialize)]
struct RawChainInfo {
    blocks: u64,
}

#[derive(Deserialize)]
struct RawScriptPubKey {
    #[serde(rename = "type")]
    script_type: String,
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Deserialize)]
struct RawVout {
    value: f64,
    n: u32,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: RawScriptPubKey,
}

#[derive(Deserialize, Default)]
struct RawVin {
    txid: Option<String>,
    vout: Option<u32>,
    #[serde(default)]
    coinbase: Option<String>,
}

#[derive(Deserialize)]
struct RawTransaction {
    txid: String,
    vin: Vec<RawVin>,
    vout: Vec<RawVout>,
    #[serde(default)]
    height: Option<u64>,
}

#[derive(Deserialize)]
struct RawBlock {
    height: u64,
    hash: String,
    #[serde(default)]
    previousblockhash: Option<String>,
    merkleroot: String,
    bits: String,
    nonce: u64,
    difficulty: f64,
    size: u64,
    version: i32,
    confirmations: i64,
    time: i64,
    tx: Vec<String>,
}

fn block_time(raw_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(raw_secs, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
}

#[async_trait]
impl NodeClient for BitcoindClient {
    async fn get_info(&self) -> Result<RpcChainInfo> {
        let raw: RawChainInfo = self.call("getinfo", vec![]).await?;
        Ok(RpcChainInfo { blocks: raw.blocks })
    }

    async fn get_block_hash(&self, height: u64) -> Result<String> {
        self.call("getblockhash", vec![Value::from(height)]).await
    }

    async fn get_block(&self, hash: &str) -> Result<RpcBlock> {
        let raw: RawBlock = self
            .call("getblock", vec![Value::from(hash.to_string()), Value::from(1)])
            .await?;

        Ok(RpcBlock {
            height: raw.height,
            hash: raw.hash,
            prev_hash: raw.previousblockhash,
            merkle_root: raw.merkleroot,
            bits: raw.bits,
            nonce: raw.nonce,
            difficulty: raw.difficulty,
            size: raw.size,
            version: raw.version,
            confirmations: raw.confirmations,
            time: block_time(raw.time),
            tx_ids: raw.tx,
        })
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<RpcTransaction> {
        let raw: RawTransaction = self
            .call(
                "getrawtransaction",
                vec![Value::from(txid.to_string()), Value::from(1)],
            )
            .await?;

        let vin = raw
            .vin
            .into_iter()
            .map(|v| match (v.coinbase, v.txid, v.vout) {
                (Some(_), _, _) => RpcVin::Coinbase,
                (None, Some(txid), Some(vout)) => RpcVin::Spend { txid, vout },
                _ => RpcVin::Coinbase,
            })
            .collect();

        let vout = raw
            .vout
            .into_iter()
            .map(|v| RpcVout {
                n: v.n,
                value: Decimal::try_from(v.value).unwrap_or(Decimal::ZERO),
                script_pub_key: RpcScriptPubKey {
                    addresses: v.script_pub_key.addresses,
                    script_type: v.script_pub_key.script_type,
                },
            })
            .collect();

        Ok(RpcTransaction {
            txid: raw.txid,
            vin,
            vout,
            confirmed_height: raw.height,
        })
    }
}
