//! Reverses every movement at or above a height.
//!
//! Called for a reorg, for a detected corruption, or by startup crash
//! recovery. The order is the crash-safety linchpin, symmetric to
//! [`crate::sequence_applier::SequenceApplier`]'s own write order in
//! reverse: blocks are deleted *first* (their absence is the dirty-state
//! marker a concurrent reader or a retried unwind can recognize), then
//! movements are reversed and deleted batch by batch, then addresses with
//! `block_height >= height` are deleted last.
//!
//! Partial-movement tolerance (the `movement.sequence != endpoint.sequence`
//! skip below) exists because a crash can leave a movement durably written
//! whose endpoint address update never made it to disk. Removing that
//! tolerance would turn an ordinary crash-recovery unwind into a fatal
//! [`crate::error::Error::Unreconciliation`] — do not "fix" it away.

use crate::address_cache::AddressCache;
use crate::error::{Error, Result};
use crate::models::{CarverAddress, CarverMovement, RewardCategory};
use crate::store::Store;

pub struct Unwinder<'a, S: Store> {
    store: &'a S,
    batch_size: usize,
}

impl<'a, S: Store> Unwinder<'a, S> {
    pub fn new(store: &'a S, batch_size: usize) -> Self {
        Self { store, batch_size }
    }

    /// Unwinds every block, movement and address with height `>= height`.
    pub async fn unwind(&self, height: u64, cache: &mut AddressCache) -> Result<()> {
        self.store.delete_blocks_with_height_gte(height).await?;

        loop {
            let batch = self
                .store
                .movements_with_height_gte_desc(height, self.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }

            let min_sequence = batch.iter().map(|m| m.sequence).min().unwrap();
            let mut touched = std::collections::HashMap::new();

            for movement in &batch {
                self.reverse_one(movement, &mut touched).await?;
            }

            let addresses: Vec<CarverAddress> = touched.into_values().collect();
            self.store.save_addresses(addresses).await?;
            self.store
                .delete_movements_with_sequence_gte(min_sequence)
                .await?;
        }

        self.store.delete_addresses_with_height_gte(height).await?;
        cache.clear();
        Ok(())
    }

    async fn reverse_one(
        &self,
        movement: &CarverMovement,
        touched: &mut std::collections::HashMap<crate::models::Label, CarverAddress>,
    ) -> Result<()> {
        self.reverse_endpoint(&movement.from, movement, touched, false)
            .await?;
        if movement.to != movement.from {
            self.reverse_endpoint(&movement.to, movement, touched, true)
                .await?;
        }
        Ok(())
    }

    /// Reverses this movement's effect on one endpoint. `is_credit` is
    /// whether the endpoint was originally credited (`to`) or debited
    /// (`from`) when the movement was applied.
    async fn reverse_endpoint(
        &self,
        label: &crate::models::Label,
        movement: &CarverMovement,
        touched: &mut std::collections::HashMap<crate::models::Label, CarverAddress>,
        is_credit: bool,
    ) -> Result<()> {
        // A missing row is equivalent to one at `sequence == 0`: the
        // endpoint was never durably saved, which the crash-safety
        // tolerance below already treats as "nothing to undo".
        let mut address = match touched.get(label) {
            Some(existing) => existing.clone(),
            None => self
                .store
                .get_address(label)
                .await?
                .unwrap_or_else(|| CarverAddress::new(label.clone(), movement.block_height)),
        };

        // The crash-safety tolerance: this endpoint was never actually
        // advanced to this movement (a crash landed between writing the
        // movement and writing the address), so there is nothing to undo.
        if address.sequence != movement.sequence {
            if address.sequence > movement.sequence {
                return Err(Error::Unreconciliation {
                    endpoint_sequence: address.sequence,
                    movement_sequence: movement.sequence,
                });
            }
            touched.insert(label.clone(), address);
            return Ok(());
        }

        if is_credit {
            undo_credit(&mut address, movement);
        } else {
            undo_debit(&mut address, movement);
        }

        address.sequence = if is_credit {
            movement.last_to_movement_sequence()
        } else {
            movement.last_from_movement_sequence()
        };
        address.last_movement = if is_credit {
            movement.last_to_movement.clone()
        } else {
            movement.last_from_movement.clone()
        };

        touched.insert(label.clone(), address);
        Ok(())
    }
}

fn undo_debit(address: &mut CarverAddress, movement: &CarverMovement) {
    address.balance += movement.amount;
    address.value_out -= movement.amount;
    address.count_out -= 1;
}

fn undo_credit(address: &mut CarverAddress, movement: &CarverMovement) {
    address.balance -= movement.amount;
    address.value_in -= movement.amount;
    address.count_in -= 1;

    match movement.movement_type.reward_category() {
        Some(RewardCategory::Pow) => {
            address.pow_count_in = address.pow_count_in.saturating_sub(1);
            address.pow_value_in -= movement.amount;
        }
        Some(RewardCategory::Pos) => {
            address.pos_count_in = address.pos_count_in.saturating_sub(1);
            address.pos_value_in -= movement.amount;
            if address.pos_reward_movement.as_deref() == movement.id.as_deref() {
                address.pos_reward_movement = None;
            }
        }
        Some(RewardCategory::Mn) => {
            address.mn_count_in = address.mn_count_in.saturating_sub(1);
            address.mn_value_in -= movement.amount;
            if address.mn_reward_movement.as_deref() == movement.id.as_deref() {
                address.mn_reward_movement = None;
            }
        }
        None => {}
    }
}

/// `CarverMovement` only stores the *id* of the movement that preceded it on
/// each endpoint, not that movement's sequence; extracting the sequence
/// from the id is the engine's own encoding (`"{block_height}:{sequence}"`),
/// so it stays local to the Unwinder rather than growing into a model
/// method other callers might lean on.
trait LastMovementSequence {
    fn last_from_movement_sequence(&self) -> u64;
    fn last_to_movement_sequence(&self) -> u64;
}

impl LastMovementSequence for CarverMovement {
    fn last_from_movement_sequence(&self) -> u64 {
        sequence_of(&self.last_from_movement)
    }

    fn last_to_movement_sequence(&self) -> u64 {
        sequence_of(&self.last_to_movement)
    }
}

fn sequence_of(movement_id: &Option<String>) -> u64 {
    movement_id
        .as_ref()
        .and_then(|id| id.rsplit(':').next())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Label, MovementType};
    use crate::sequence_applier::SequenceApplier;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn unwinding_a_coinbase_block_restores_zero_balances() {
        let store = MemoryStore::new();
        let mut cache = AddressCache::new(1000);
        let mut applier = SequenceApplier::new(0);

        let parsed = vec![
            crate::models::ParsedMovement {
                from: Label::coinbase(),
                to: Label::tx("t1"),
                amount: Decimal::new(5000, 2),
                movement_type: MovementType::CoinbaseToTx,
                date: chrono::Utc::now(),
                block_height: 1,
                destination_address: None,
                pos_input_amount: None,
                pos_input_block_height_diff: None,
            },
            crate::models::ParsedMovement {
                from: Label::tx("t1"),
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
        store
            .insert_block(crate::models::Block {
                height: 1,
                hash: "h1".into(),
                prev_hash: None,
                merkle_root: "m".into(),
                bits: "1".into(),
                nonce: 0,
                difficulty: 1.0,
                size: 1,
                version: 1,
                confirmations_at_ingest: 0,
                created_at: chrono::Utc::now(),
                vins_count: 1,
                vouts_count: 1,
                sequence_start: 1,
                sequence_end: 2,
                is_confirmed: false,
            })
            .await
            .unwrap();

        let unwinder = Unwinder::new(&store, 1000);
        unwinder.unwind(1, &mut cache).await.unwrap();

        assert!(store.find_block_by_height(1).await.unwrap().is_none());
        assert!(store.get_address(&Label::address("A")).await.unwrap().is_none());
        assert_eq!(store.max_movement_sequence().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn partial_movement_is_skipped_instead_of_erroring() {
        let store = MemoryStore::new();
        let mut cache = AddressCache::new(1000);

        // A movement durably written whose `from` endpoint was never
        // advanced past sequence 0 — simulates a crash between the two
        // persistence steps.
        let movement = CarverMovement {
            id: Some("1:1".into()),
            label: "coinbase_to_tx".into(),
            amount: Decimal::ONE,
            date: chrono::Utc::now(),
            block_height: 1,
            from: Label::coinbase(),
            to: Label::tx("t1"),
            destination_address: None,
            from_balance: Decimal::ZERO,
            to_balance: Decimal::ZERO,
            movement_type: MovementType::CoinbaseToTx,
            sequence: 1,
            last_from_movement: None,
            last_to_movement: None,
            context_address: None,
            context_tx: Some(Label::tx("t1")),
            pos_reward_amount: None,
            pos_input_amount: None,
            pos_input_block_height_diff: None,
        };
        store.insert_movements(vec![movement]).await.unwrap();
        store
            .save_addresses(vec![CarverAddress::new(Label::coinbase(), 1)])
            .await
            .unwrap();

        let unwinder = Unwinder::new(&store, 1000);
        unwinder.unwind(1, &mut cache).await.unwrap();

        assert_eq!(store.max_movement_sequence().await.unwrap(), 0);
    }
}
