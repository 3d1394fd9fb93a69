//! Confirms synced blocks once the node itself reports enough confirmations,
//! rechecking each one's merkle root against the node's current view before
//! trusting it.
//!
//! A mismatch means the block this engine stored is no longer on the node's
//! best chain (a reorg landed after the block was synced but before it
//! reached `block_confirmations`) — the engine didn't see the reorg happen,
//! it only notices on recheck. The fix is the same one a live reorg takes:
//! unwind from that height and let the sync loop re-derive it.

use crate::address_cache::AddressCache;
use crate::error::Result;
use crate::models::Block;
use crate::rpc::NodeClient;
use crate::store::Store;
use crate::unwinder::Unwinder;

pub struct Confirmer<'a, C: NodeClient, S: Store> {
    client: &'a C,
    store: &'a S,
    required_confirmations: u32,
    unwind_batch_size: usize,
}

impl<'a, C: NodeClient, S: Store> Confirmer<'a, C, S> {
    pub fn new(client: &'a C, store: &'a S, required_confirmations: u32, unwind_batch_size: usize) -> Self {
        Self {
            client,
            store,
            required_confirmations,
            unwind_batch_size,
        }
    }

    /// Walks unconfirmed blocks ascending from `from_height`, confirming
    /// each one whose merkle root still matches the node and stopping at
    /// the first block the node doesn't yet confirm deeply enough. A
    /// merkle-root mismatch unwinds from that height and recurses rather
    /// than simply stopping, since a reorg can span more than one of the
    /// blocks this walk would otherwise confirm in sequence; recursion
    /// terminates because every unwind strictly decreases the height of
    /// the last stored block.
    pub async fn run(&self, from_height: u64, cache: &mut AddressCache) -> Result<()> {
        let pending = self.store.unconfirmed_blocks_from(from_height).await?;

        for block in pending {
            match self.confirm_one(&block, cache).await? {
                Outcome::Confirmed => continue,
                Outcome::NotDeepEnough => break,
                Outcome::Reorg => {
                    let rest: std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> =
                        Box::pin(self.run(block.height, cache));
                    return rest.await;
                }
            }
        }
        Ok(())
    }

    async fn confirm_one(&self, block: &Block, cache: &mut AddressCache) -> Result<Outcome> {
        let hash = self.client.get_block_hash(block.height).await?;
        let node_block = self.client.get_block(&hash).await?;

        if node_block.confirmations < self.required_confirmations as i64 {
            return Ok(Outcome::NotDeepEnough);
        }

        if node_block.merkle_root != block.merkle_root {
            let unwinder = Unwinder::new(self.store, self.unwind_batch_size);
            unwinder.unwind(block.height, cache).await?;
            return Ok(Outcome::Reorg);
        }

        self.store.mark_block_confirmed(block.height).await?;
        Ok(Outcome::Confirmed)
    }
}

enum Outcome {
    Confirmed,
    NotDeepEnough,
    Reorg,
}
