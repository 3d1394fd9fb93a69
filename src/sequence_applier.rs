//! Applies a block's parsed movements in order, assigning the monotonic
//! `sequence` counter and updating every touched address.
//!
//! The counter is threaded explicitly rather than kept as a singleton so a
//! crash-recovery run can seed it from whatever the store says is highest,
//! not from zero. Persistence order within a block is the
//! crate's crash-safety invariant and must never change: movements, then
//! addresses, then the block row last — a crash between any two of those
//! steps leaves the store in a state the Confirmer and startup recovery can
//! both detect and repair.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::address_cache::AddressCache;
use crate::error::{Error, Result};
use crate::models::{CarverAddress, CarverMovement, Label, ParsedMovement, RewardCategory};
use crate::store::Store;

pub struct SequenceApplier {
    sequence: u64,
}

impl SequenceApplier {
    /// `starting_sequence` is the last sequence already durably assigned —
    /// the first movement applied gets `starting_sequence + 1`.
    pub fn new(starting_sequence: u64) -> Self {
        Self {
            sequence: starting_sequence,
        }
    }

    pub fn current_sequence(&self) -> u64 {
        self.sequence
    }

    /// Applies every movement of one block, returning the finished
    /// [`CarverMovement`] rows and the addresses they touched. Does not
    /// write anything — the caller persists in the required order.
    pub async fn apply_block<S: Store>(
        &mut self,
        parsed: Vec<ParsedMovement>,
        cache: &mut AddressCache,
        store: &S,
    ) -> Result<(Vec<CarverMovement>, Vec<CarverAddress>)> {
        let mut touched: HashMap<Label, CarverAddress> = HashMap::new();
        let mut finished = Vec::with_capacity(parsed.len());

        for movement in parsed {
            let record = self
                .apply_one(movement, &mut touched, cache, store)
                .await?;
            finished.push(record);
        }

        Ok((finished, touched.into_values().collect()))
    }

    async fn apply_one<S: Store>(
        &mut self,
        movement: ParsedMovement,
        touched: &mut HashMap<Label, CarverAddress>,
        cache: &mut AddressCache,
        store: &S,
    ) -> Result<CarverMovement> {
        let next_sequence = self.sequence + 1;

        let mut from = self.seed(&movement.from, movement.block_height, touched, cache, store).await?;
        let mut to = if movement.to == movement.from {
            None
        } else {
            Some(self.seed(&movement.to, movement.block_height, touched, cache, store).await?)
        };

        // `from`/`to` must each have been last touched strictly before this
        // movement — a violation means the ledger has drifted from what the
        // addresses themselves record.
        if from.sequence >= next_sequence {
            return Err(Error::Reconciliation {
                endpoint: "from",
                endpoint_sequence: from.sequence,
                next_sequence,
            });
        }
        if let Some(to) = &to {
            if to.sequence >= next_sequence {
                return Err(Error::Reconciliation {
                    endpoint: "to",
                    endpoint_sequence: to.sequence,
                    next_sequence,
                });
            }
        }

        self.sequence = next_sequence;

        let from_balance = from.balance;
        let to_balance = to.as_ref().map(|t| t.balance).unwrap_or(from_balance);

        let id = format!("{}:{}", movement.block_height, next_sequence);
        let (context_address, context_tx) = CarverMovement::compute_context(&movement.from, &movement.to);

        let record = CarverMovement {
            id: Some(id.clone()),
            label: movement.movement_type.label().to_string(),
            amount: movement.amount,
            date: movement.date,
            block_height: movement.block_height,
            from: movement.from.clone(),
            to: movement.to.clone(),
            destination_address: movement.destination_address.clone(),
            from_balance,
            to_balance,
            movement_type: movement.movement_type,
            sequence: next_sequence,
            last_from_movement: from.last_movement.clone(),
            last_to_movement: to.as_ref().and_then(|t| t.last_movement.clone()),
            context_address,
            context_tx,
            pos_reward_amount: if movement.movement_type == crate::models::MovementType::PosRewardToTx
                || movement.movement_type == crate::models::MovementType::MasternodeRewardToTx
            {
                Some(movement.amount)
            } else {
                None
            },
            pos_input_amount: movement.pos_input_amount,
            pos_input_block_height_diff: movement.pos_input_block_height_diff,
        };

        debit(&mut from, movement.amount, next_sequence, &id);
        if let Some(to) = to.as_mut() {
            credit(to, movement.amount, next_sequence, &id, movement.movement_type.reward_category());
        } else {
            // `from == to`: a movement whose two endpoints are the same
            // entity nets to zero balance change, but still advances
            // sequence and counters on both sides.
            credit(&mut from, movement.amount, next_sequence, &id, movement.movement_type.reward_category());
        }

        touched.insert(from.label.clone(), from.clone());
        if let Some(to) = to {
            touched.insert(to.label.clone(), to);
        }

        Ok(record)
    }

    /// Locates the working copy of a label: already touched this block,
    /// else seeded from the cache, else read from the store, else a fresh
    /// address (`sequence == 0`, never touched before).
    async fn seed<S: Store>(
        &self,
        label: &Label,
        block_height: u64,
        touched: &mut HashMap<Label, CarverAddress>,
        cache: &mut AddressCache,
        store: &S,
    ) -> Result<CarverAddress> {
        if let Some(existing) = touched.get(label) {
            return Ok(existing.clone());
        }
        if let Some(cached) = cache.get(label) {
            return Ok(cached.clone());
        }
        if let Some(stored) = store.get_address(label).await? {
            cache.put(stored.clone());
            return Ok(stored);
        }
        Ok(CarverAddress::new(label.clone(), block_height))
    }
}

/// `block_height` is the height this address was *first created* at (§3);
/// touching it again on a later block must never overwrite that — the
/// Unwinder and both `Store` impls use it to decide whether a rolled-back
/// address was created inside the unwound range (delete outright) or merely
/// had a later movement reversed (keep, balance already restored).
fn debit(address: &mut CarverAddress, amount: Decimal, sequence: u64, movement_id: &str) {
    address.balance -= amount;
    address.value_out += amount;
    address.count_out += 1;
    address.sequence = sequence;
    address.last_movement = Some(movement_id.to_string());
}

fn credit(
    address: &mut CarverAddress,
    amount: Decimal,
    sequence: u64,
    movement_id: &str,
    reward_category: Option<RewardCategory>,
) {
    address.balance += amount;
    address.value_in += amount;
    address.count_in += 1;
    address.sequence = sequence;
    address.last_movement = Some(movement_id.to_string());

    match reward_category {
        Some(RewardCategory::Pow) => {
            address.pow_count_in += 1;
            address.pow_value_in += amount;
        }
        Some(RewardCategory::Pos) => {
            address.pos_count_in += 1;
            address.pos_value_in += amount;
            address.pos_reward_movement = Some(movement_id.to_string());
        }
        Some(RewardCategory::Mn) => {
            address.mn_count_in += 1;
            address.mn_value_in += amount;
            address.mn_reward_movement = Some(movement_id.to_string());
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MovementType;
    use crate::store::memory::MemoryStore;

    fn mv(from: Label, to: Label, amount: Decimal, movement_type: MovementType) -> ParsedMovement {
        mv_at(from, to, amount, movement_type, 1)
    }

    fn mv_at(from: Label, to: Label, amount: Decimal, movement_type: MovementType, block_height: u64) -> ParsedMovement {
        ParsedMovement {
            from,
            to,
            amount,
            movement_type,
            date: chrono::Utc::now(),
            block_height,
            destination_address: None,
            pos_input_amount: None,
            pos_input_block_height_diff: None,
        }
    }

    #[tokio::test]
    async fn applying_coinbase_then_payout_balances_the_tx_pseudo_address() {
        let mut applier = SequenceApplier::new(0);
        let mut cache = AddressCache::new(1000);
        let store = MemoryStore::new();

        let parsed = vec![
            mv(Label::coinbase(), Label::tx("t1"), Decimal::new(5000, 2), MovementType::CoinbaseToTx),
            mv(Label::tx("t1"), Label::address("A"), Decimal::new(5000, 2), MovementType::TxToAddress),
        ];

        let (records, addresses) = applier.apply_block(parsed, &mut cache, &store).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, 1);
        assert_eq!(records[1].sequence, 2);
        assert_eq!(applier.current_sequence(), 2);

        let tx_addr = addresses.iter().find(|a| a.label == Label::tx("t1")).unwrap();
        assert_eq!(tx_addr.balance, Decimal::ZERO);

        let a = addresses.iter().find(|a| a.label == Label::address("A")).unwrap();
        assert_eq!(a.balance, Decimal::new(5000, 2));
    }

    #[tokio::test]
    async fn out_of_sequence_endpoint_is_rejected() {
        let mut applier = SequenceApplier::new(10);
        let mut cache = AddressCache::new(1000);
        let store = MemoryStore::new();

        // Seed an address whose own sequence is already ahead of what this
        // applier is about to assign next.
        let mut stale = CarverAddress::new(Label::address("A"), 1);
        stale.sequence = 99;
        cache.put(stale);

        let parsed = vec![mv(
            Label::coinbase(),
            Label::address("A"),
            Decimal::ONE,
            MovementType::CoinbaseToTx,
        )];

        let err = applier.apply_block(parsed, &mut cache, &store).await.unwrap_err();
        assert!(matches!(err, Error::Reconciliation { .. }));
    }

    #[tokio::test]
    async fn block_height_stays_at_first_creation_across_later_touches() {
        let mut applier = SequenceApplier::new(0);
        let mut cache = AddressCache::new(1000);
        let store = MemoryStore::new();

        // `A` is created at height 1, then credited again at height 50; its
        // `block_height` must keep naming height 1 (first creation), not
        // drift to the height of the most recent movement that touched it.
        let parsed = vec![
            mv_at(Label::coinbase(), Label::address("A"), Decimal::ONE, MovementType::CoinbaseToTx, 1),
            mv_at(Label::coinbase(), Label::address("A"), Decimal::ONE, MovementType::CoinbaseToTx, 50),
        ];

        let (_, addresses) = applier.apply_block(parsed, &mut cache, &store).await.unwrap();
        let a = addresses.iter().find(|a| a.label == Label::address("A")).unwrap();
        assert_eq!(a.block_height, 1);
    }
}
