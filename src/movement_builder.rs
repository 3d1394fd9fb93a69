//! Builds the movements a single transaction produces.
//!
//! Two sweeps:
//!
//! 1. **Required movements** — flatten inputs and outputs into typed stubs,
//!    each naming a source label, a destination label, an amount, and a
//!    movement type. Input amounts are only knowable by resolving the prior
//!    output they spend, so this sweep interleaves with
//!    [`crate::utxo_resolver::UtxoResolver`] rather than running ahead of it
//!    — stub assembly itself is pure once inputs are resolved, even though
//!    the sweep as a whole isn't I/O-free.
//! 2. **Parse** — warm the address cache for every label the stubs
//!    reference, batching store reads per transaction instead of per
//!    movement, and stamp `date`/`block_height`.
//!
//! Classification heuristic (judgment call): real address
//! classification is delegated entirely to [`crate::classify`], which has no
//! notion of PoW/PoS/MN. This builder decides those routes from transaction
//! *shape*: a transaction whose sole input is [`crate::rpc::RpcVin::Coinbase`]
//! is a coinbase; a non-coinbase transaction at index 1 in the block whose
//! first output carries zero value is a coinstake. Everything else is an
//! ordinary transaction. This mirrors how PoS alts actually structure these
//! transactions on the wire, but the engine never confirms it against
//! consensus rules — it takes the node's word for vin/vout shape.
use chrono::Utc;
use rust_decimal::Decimal;

use crate::address_cache::AddressCache;
use crate::classify::AddressClassifier;
use crate::error::Result;
use crate::models::{Label, ParsedMovement, RequiredMovement};
use crate::rpc::{NodeClient, RpcTransaction};
use crate::store::Store;
use crate::utxo_resolver::{ResolvedInput, UtxoResolver};

/// Where a transaction sits in its block, needed to recognize a coinstake
/// (conventionally the second transaction, right after an empty marker).
#[derive(Debug, Clone, Copy)]
pub struct TxContext {
    pub tx_index: usize,
    pub block_height: u64,
}

pub struct MovementBuilder<'a, 'b, C: NodeClient> {
    resolver: &'a mut UtxoResolver<'b, C>,
    classifier: &'a dyn AddressClassifier,
}

impl<'a, 'b, C: NodeClient> MovementBuilder<'a, 'b, C> {
    pub fn new(resolver: &'a mut UtxoResolver<'b, C>, classifier: &'a dyn AddressClassifier) -> Self {
        Self {
            resolver,
            classifier,
        }
    }

    /// Runs both sweeps for one transaction, returning the movements it
    /// produces. An empty non-standard transaction (no inputs and no
    /// outputs — some chains emit these as coinstake markers) yields an
    /// empty vector without touching anything.
    pub async fn build<S: Store>(
        &mut self,
        tx: &RpcTransaction,
        ctx: TxContext,
        cache: &mut AddressCache,
        store: &S,
    ) -> Result<Vec<ParsedMovement>> {
        // Some chains emit empty non-standard marker transactions (e.g. a
        // coinstake's placeholder predecessor) with no inputs or outputs at
        // all; they carry no value and are skipped without touching sequence.
        if tx.vin.is_empty() && tx.vout.is_empty() {
            return Ok(Vec::new());
        }

        let required = self.required_movements(tx, ctx).await?;
        self.warm_cache(&required, cache, store).await?;

        let now = Utc::now();
        Ok(required
            .into_iter()
            .map(|r| ParsedMovement {
                from: r.from,
                to: r.to,
                amount: r.amount,
                movement_type: r.movement_type,
                date: now,
                block_height: ctx.block_height,
                destination_address: r.destination_address,
                pos_input_amount: r.pos_input_amount,
                pos_input_block_height_diff: r.pos_input_block_height_diff,
            })
            .collect())
    }

    async fn required_movements(
        &mut self,
        tx: &RpcTransaction,
        ctx: TxContext,
    ) -> Result<Vec<RequiredMovement>> {
        let mut resolved_inputs = Vec::with_capacity(tx.vin.len());
        for vin in &tx.vin {
            resolved_inputs.push(self.resolver.resolve(vin).await?);
        }

        // Output produced by this transaction, so a later transaction in the
        // same block that spends it resolves without a round-trip.
        for vout in &tx.vout {
            self.resolver.register_batch_output(
                &tx.txid,
                vout.n,
                crate::utxo_resolver::ResolvedOutput {
                    value: vout.value,
                    script_type: vout.script_pub_key.script_type.clone(),
                    addresses: vout.script_pub_key.addresses.clone(),
                    origin_height: Some(ctx.block_height),
                },
            );
        }

        Ok(self.assemble(tx, ctx, &resolved_inputs))
    }

    /// Pure: takes already-resolved inputs and the raw transaction and
    /// produces the stub list. No I/O past this point.
    fn assemble(
        &self,
        tx: &RpcTransaction,
        ctx: TxContext,
        resolved_inputs: &[ResolvedInput],
    ) -> Vec<RequiredMovement> {
        let is_coinbase = resolved_inputs
            .iter()
            .any(|i| matches!(i, ResolvedInput::Coinbase));
        let is_coinstake = !is_coinbase
            && ctx.tx_index == 1
            && tx.vout.len() >= 2
            && tx.vout[0].value.is_zero();

        let tx_label = Label::tx(tx.txid.clone());
        let mut movements = Vec::new();

        if is_coinbase {
            self.assemble_coinbase(tx, &tx_label, &mut movements);
        } else if is_coinstake {
            self.assemble_coinstake(tx, &tx_label, ctx, resolved_inputs, &mut movements);
        } else {
            self.assemble_standard(tx, &tx_label, resolved_inputs, &mut movements);
        }

        movements
    }

    fn assemble_coinbase(&self, tx: &RpcTransaction, tx_label: &Label, out: &mut Vec<RequiredMovement>) {
        let total: Decimal = tx.vout.iter().map(|o| o.value).sum();
        out.push(plain(Label::coinbase(), tx_label.clone(), total, crate::models::MovementType::CoinbaseToTx));

        for vout in &tx.vout {
            let dest = self
                .classifier
                .classify_script(&vout.script_pub_key.script_type, &vout.script_pub_key.addresses);

            match dest.kind {
                crate::models::LabelKind::ProofOfWork => {
                    out.push(RequiredMovement {
                        from: tx_label.clone(),
                        to: Label::proof_of_work(),
                        amount: vout.value,
                        movement_type: crate::models::MovementType::TxToPowAddress,
                        destination_address: Some(dest.clone()),
                        pos_input_amount: None,
                        pos_input_block_height_diff: None,
                    });
                    out.push(plain(
                        Label::proof_of_work(),
                        dest,
                        vout.value,
                        crate::models::MovementType::PowAddressReward,
                    ));
                }
                _ => out.push(plain(
                    tx_label.clone(),
                    dest,
                    vout.value,
                    crate::models::MovementType::TxToAddress,
                )),
            }
        }
    }

    fn assemble_coinstake(
        &self,
        tx: &RpcTransaction,
        tx_label: &Label,
        ctx: TxContext,
        resolved_inputs: &[ResolvedInput],
        out: &mut Vec<RequiredMovement>,
    ) {
        // vin[0] is the staked UTXO; its own value re-enters the tx as an
        // ordinary spend, separate from the reward the tx mints.
        let staked_value = match resolved_inputs.first() {
            Some(ResolvedInput::Output(o)) => o.value,
            _ => Decimal::ZERO,
        };
        // How many blocks old the staked input was when it matured into this
        // reward — only knowable when the spent output's own confirmation
        // height was resolved (same-batch outputs and RPC lookups that
        // report one; unknown outputs leave this `None`, not zero).
        let staked_height_diff = match resolved_inputs.first() {
            Some(ResolvedInput::Output(o)) => o
                .origin_height
                .map(|origin| ctx.block_height.saturating_sub(origin) as i64),
            _ => None,
        };
        if let Some(ResolvedInput::Output(staked)) = resolved_inputs.first() {
            let staker = self
                .classifier
                .classify_script(&staked.script_type, &staked.addresses);
            out.push(plain(
                staker,
                tx_label.clone(),
                staked_value,
                crate::models::MovementType::AddressToTx,
            ));
        }

        // Remaining non-coinbase inputs, if any, are ordinary spends feeding
        // the same coinstake transaction.
        for input in resolved_inputs.iter().skip(1) {
            if let ResolvedInput::Output(resolved) = input {
                self.push_standard_input(resolved, tx_label, out);
            }
        }

        let payouts = &tx.vout[1..]; // vout[0] is the empty marker
        let total_out: Decimal = payouts.iter().map(|o| o.value).sum();
        let has_mn_payout = payouts.len() >= 2;
        let mn_amount = if has_mn_payout {
            payouts.last().map(|o| o.value).unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };
        let reward = (total_out - staked_value).max(Decimal::ZERO);
        let pos_amount = (reward - mn_amount).max(Decimal::ZERO);

        if pos_amount > Decimal::ZERO {
            out.push(RequiredMovement {
                from: Label::proof_of_stake(),
                to: tx_label.clone(),
                amount: pos_amount,
                movement_type: crate::models::MovementType::PosRewardToTx,
                destination_address: None,
                pos_input_amount: Some(staked_value),
                pos_input_block_height_diff: staked_height_diff,
            });
        }
        if has_mn_payout && mn_amount > Decimal::ZERO {
            out.push(RequiredMovement {
                from: Label::masternode(),
                to: tx_label.clone(),
                amount: mn_amount,
                movement_type: crate::models::MovementType::MasternodeRewardToTx,
                destination_address: None,
                pos_input_amount: None,
                pos_input_block_height_diff: None,
            });
        }

        for (i, vout) in payouts.iter().enumerate() {
            let dest = self
                .classifier
                .classify_script(&vout.script_pub_key.script_type, &vout.script_pub_key.addresses);
            let is_last_mn_payout = has_mn_payout && i == payouts.len() - 1;
            let movement_type = if is_last_mn_payout {
                crate::models::MovementType::TxToMnAddress
            } else {
                crate::models::MovementType::TxToPosAddress
            };
            out.push(plain(tx_label.clone(), dest, vout.value, movement_type));
        }
    }

    fn assemble_standard(
        &self,
        tx: &RpcTransaction,
        tx_label: &Label,
        resolved_inputs: &[ResolvedInput],
        out: &mut Vec<RequiredMovement>,
    ) {
        let mut total_in = Decimal::ZERO;
        for input in resolved_inputs {
            if let ResolvedInput::Output(resolved) = input {
                total_in += resolved.value;
                self.push_standard_input(resolved, tx_label, out);
            }
        }

        let mut total_out = Decimal::ZERO;
        for vout in &tx.vout {
            total_out += vout.value;
            let dest = self
                .classifier
                .classify_script(&vout.script_pub_key.script_type, &vout.script_pub_key.addresses);
            let movement_type = if dest.kind == crate::models::LabelKind::Zerocoin {
                crate::models::MovementType::TxToZerocoin
            } else {
                crate::models::MovementType::TxToAddress
            };
            out.push(plain(tx_label.clone(), dest, vout.value, movement_type));
        }

        let fee = total_in - total_out;
        if fee > Decimal::ZERO {
            out.push(plain(
                tx_label.clone(),
                Label::fee(),
                fee,
                crate::models::MovementType::TxToFee,
            ));
        }
    }

    fn push_standard_input(
        &self,
        resolved: &crate::utxo_resolver::ResolvedOutput,
        tx_label: &Label,
        out: &mut Vec<RequiredMovement>,
    ) {
        let source = self
            .classifier
            .classify_script(&resolved.script_type, &resolved.addresses);
        let movement_type = match source.kind {
            crate::models::LabelKind::Fee => crate::models::MovementType::FeeToTx,
            crate::models::LabelKind::Zerocoin => crate::models::MovementType::ZerocoinToTx,
            _ => crate::models::MovementType::AddressToTx,
        };
        out.push(plain(source, tx_label.clone(), resolved.value, movement_type));
    }

    async fn warm_cache<S: Store>(
        &self,
        required: &[RequiredMovement],
        cache: &mut AddressCache,
        store: &S,
    ) -> Result<()> {
        let mut labels = Vec::new();
        for movement in required {
            if !labels.contains(&movement.from) {
                labels.push(movement.from.clone());
            }
            if !labels.contains(&movement.to) {
                labels.push(movement.to.clone());
            }
        }

        for label in labels {
            if cache.get(&label).is_some() {
                continue;
            }
            if let Some(address) = store.get_address(&label).await? {
                cache.put(address);
            }
        }
        Ok(())
    }
}

fn plain(from: Label, to: Label, amount: Decimal, movement_type: crate::models::MovementType) -> RequiredMovement {
    RequiredMovement {
        from,
        to,
        amount,
        movement_type,
        destination_address: None,
        pos_input_amount: None,
        pos_input_block_height_diff: None,
    }
}
