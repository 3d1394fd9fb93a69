//! Resolves transaction inputs to the outputs they spend.
//!
//! No caching survives across blocks — the resolver is pure relative to the
//! node's view. Within one block's processing, outputs produced by
//! transactions already handled in this same batch are resolved from an
//! in-memory map before falling back to the node, since the node may not
//! yet consider them part of any block.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::rpc::{NodeClient, RpcVin};

#[derive(Debug, Clone)]
pub struct ResolvedOutput {
    pub value: Decimal,
    pub script_type: String,
    pub addresses: Vec<String>,
    /// Height of the block the spent output was itself confirmed in, when
    /// known — feeds `pos_input_block_height_diff` on a coinstake's staked
    /// input. `None` when the originating tx reported no height (e.g. an
    /// output produced earlier in this same batch, or a node that doesn't
    /// report one).
    pub origin_height: Option<u64>,
}

#[derive(Debug, Clone)]
pub enum ResolvedInput {
    Coinbase,
    Output(ResolvedOutput),
}

pub struct UtxoResolver<'a, C: NodeClient> {
    client: &'a C,
    batch_outputs: HashMap<(String, u32), ResolvedOutput>,
}

impl<'a, C: NodeClient> UtxoResolver<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            batch_outputs: HashMap::new(),
        }
    }

    /// Registers an output produced by a transaction already processed
    /// earlier in this same sync batch, so a later transaction in the same
    /// block that spends it resolves without a round-trip to the node.
    pub fn register_batch_output(&mut self, txid: &str, vout: u32, output: ResolvedOutput) {
        self.batch_outputs.insert((txid.to_string(), vout), output);
    }

    pub async fn resolve(&mut self, vin: &RpcVin) -> Result<ResolvedInput> {
        let (txid, vout) = match vin {
            RpcVin::Coinbase => return Ok(ResolvedInput::Coinbase),
            RpcVin::Spend { txid, vout } => (txid.clone(), *vout),
        };

        if let Some(cached) = self.batch_outputs.get(&(txid.clone(), vout)) {
            return Ok(ResolvedInput::Output(cached.clone()));
        }

        let tx = self.client.get_raw_transaction(&txid).await?;
        let out = tx
            .vout
            .into_iter()
            .find(|o| o.n == vout)
            .ok_or_else(|| Error::Decode(format!("vout {} not found in tx {}", vout, txid)))?;

        let resolved = ResolvedOutput {
            value: out.value,
            script_type: out.script_pub_key.script_type,
            addresses: out.script_pub_key.addresses,
            origin_height: tx.confirmed_height,
        };
        self.batch_outputs
            .insert((txid, vout), resolved.clone());
        Ok(ResolvedInput::Output(resolved))
    }
}
