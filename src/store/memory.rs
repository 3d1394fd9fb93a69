//! An in-memory `Store`, used by tests and by the admin `undo`-only path
//! (where standing up a real MongoDB connection just to discard it would be
//! wasted ceremony).

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Block, CarverAddress, CarverMovement, Label};

use super::Store;

#[derive(Default)]
struct State {
    blocks: Vec<Block>,
    movements: Vec<CarverMovement>,
    addresses: std::collections::HashMap<Label, CarverAddress>,
}

pub struct MemoryStore {
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_block(&self, block: Block) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.blocks.retain(|b| b.height != block.height);
        state.blocks.push(block);
        Ok(())
    }

    async fn find_block_by_height(&self, height: u64) -> Result<Option<Block>> {
        let state = self.state.lock().unwrap();
        Ok(state.blocks.iter().find(|b| b.height == height).cloned())
    }

    async fn last_block(&self) -> Result<Option<Block>> {
        let state = self.state.lock().unwrap();
        Ok(state.blocks.iter().max_by_key(|b| b.height).cloned())
    }

    async fn delete_blocks_with_height_gte(&self, height: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.blocks.retain(|b| b.height < height);
        Ok(())
    }

    async fn unconfirmed_blocks_from(&self, from_height: u64) -> Result<Vec<Block>> {
        let state = self.state.lock().unwrap();
        let mut blocks: Vec<Block> = state
            .blocks
            .iter()
            .filter(|b| !b.is_confirmed && b.height >= from_height)
            .cloned()
            .collect();
        blocks.sort_by_key(|b| b.height);
        Ok(blocks)
    }

    async fn mark_block_confirmed(&self, height: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(block) = state.blocks.iter_mut().find(|b| b.height == height) {
            block.is_confirmed = true;
        }
        Ok(())
    }

    async fn insert_movements(&self, movements: Vec<CarverMovement>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.movements.extend(movements);
        Ok(())
    }

    async fn movements_with_height_gte_desc(
        &self,
        height: u64,
        limit: usize,
    ) -> Result<Vec<CarverMovement>> {
        let state = self.state.lock().unwrap();
        let mut matches: Vec<CarverMovement> = state
            .movements
            .iter()
            .filter(|m| m.block_height >= height)
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn delete_movements_with_sequence_gte(&self, sequence: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.movements.retain(|m| m.sequence < sequence);
        Ok(())
    }

    async fn max_movement_sequence(&self) -> Result<u64> {
        let state = self.state.lock().unwrap();
        Ok(state.movements.iter().map(|m| m.sequence).max().unwrap_or(0))
    }

    async fn get_address(&self, label: &Label) -> Result<Option<CarverAddress>> {
        let state = self.state.lock().unwrap();
        Ok(state.addresses.get(label).cloned())
    }

    async fn save_addresses(&self, addresses: Vec<CarverAddress>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for address in addresses {
            state.addresses.insert(address.label.clone(), address);
        }
        Ok(())
    }

    async fn delete_addresses_with_height_gte(&self, height: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.addresses.retain(|_, a| a.block_height < height);
        Ok(())
    }

    async fn max_address_sequence(&self) -> Result<u64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .addresses
            .values()
            .map(|a| a.sequence)
            .max()
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LabelKind;

    #[tokio::test]
    async fn delete_blocks_with_height_gte_keeps_lower_heights() {
        let store = MemoryStore::new();
        for h in 0..5 {
            store
                .insert_block(Block {
                    height: h,
                    hash: format!("h{}", h),
                    prev_hash: None,
                    merkle_root: "m".into(),
                    bits: "1".into(),
                    nonce: 0,
                    difficulty: 1.0,
                    size: 1,
                    version: 1,
                    confirmations_at_ingest: 1,
                    created_at: chrono::Utc::now(),
                    vins_count: 0,
                    vouts_count: 0,
                    sequence_start: 0,
                    sequence_end: 0,
                    is_confirmed: false,
                })
                .await
                .unwrap();
        }

        store.delete_blocks_with_height_gte(3).await.unwrap();
        assert!(store.find_block_by_height(2).await.unwrap().is_some());
        assert!(store.find_block_by_height(3).await.unwrap().is_none());
        assert!(store.find_block_by_height(4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn movements_sorted_descending_by_sequence() {
        let store = MemoryStore::new();
        let mk = |seq: u64| CarverMovement {
            id: Some(seq.to_string()),
            label: "x".into(),
            amount: Default::default(),
            date: chrono::Utc::now(),
            block_height: 1,
            from: Label::new("a", LabelKind::Address),
            to: Label::new("b", LabelKind::Address),
            destination_address: None,
            from_balance: Default::default(),
            to_balance: Default::default(),
            movement_type: crate::models::MovementType::AddressToTx,
            sequence: seq,
            last_from_movement: None,
            last_to_movement: None,
            context_address: None,
            context_tx: None,
            pos_reward_amount: None,
            pos_input_amount: None,
            pos_input_block_height_diff: None,
        };
        store
            .insert_movements(vec![mk(1), mk(3), mk(2)])
            .await
            .unwrap();

        let got = store
            .movements_with_height_gte_desc(0, 10)
            .await
            .unwrap();
        let sequences: Vec<u64> = got.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![3, 2, 1]);
    }
}
