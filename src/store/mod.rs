//! Document-store boundary.
//!
//! Treated as an external collaborator: the document store's own crash
//! semantics, replication, etc. are out of scope. What matters to this
//! engine is the operation set it needs — insert-one/insert-many,
//! predicate find with sort+limit, predicate delete, update-by-id — over
//! three collections (`blocks`, `carver_movements`, `carver_addresses`).

pub mod memory;
pub mod mongo;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Block, CarverAddress, CarverMovement, Label};

#[async_trait]
pub trait Store: Send + Sync {
    // -- blocks --

    /// Writes the block row. This must be the last write of a height's
    /// work — callers, not this trait, enforce that ordering.
    async fn insert_block(&self, block: Block) -> Result<()>;

    async fn find_block_by_height(&self, height: u64) -> Result<Option<Block>>;

    /// The highest-height stored block, confirmed or not.
    async fn last_block(&self) -> Result<Option<Block>>;

    /// Deletes every block with `height >= height`. Called first by the
    /// Unwinder — its completion is the dirty-state marker for a resumed
    /// unwind.
    async fn delete_blocks_with_height_gte(&self, height: u64) -> Result<()>;

    /// Blocks with `is_confirmed == false`, ascending by height, starting
    /// at `from_height`. Used by the Confirmer.
    async fn unconfirmed_blocks_from(&self, from_height: u64) -> Result<Vec<Block>>;

    async fn mark_block_confirmed(&self, height: u64) -> Result<()>;

    // -- movements --

    /// Batch insert; these must be written before the addresses they
    /// touch.
    async fn insert_movements(&self, movements: Vec<CarverMovement>) -> Result<()>;

    /// Up to `limit` movements with `block_height >= height`, sorted by
    /// `sequence` descending. Used by the Unwinder to walk a height's
    /// movements back-to-front in batches.
    async fn movements_with_height_gte_desc(
        &self,
        height: u64,
        limit: usize,
    ) -> Result<Vec<CarverMovement>>;

    async fn delete_movements_with_sequence_gte(&self, sequence: u64) -> Result<()>;

    /// `0` if the collection is empty — callers compare this against
    /// `block.sequence_end` to detect partial writes left by a crash.
    async fn max_movement_sequence(&self) -> Result<u64>;

    // -- addresses --

    async fn get_address(&self, label: &Label) -> Result<Option<CarverAddress>>;

    /// Independent per-label writes; order is immaterial since this engine
    /// is the sole writer to these collections.
    async fn save_addresses(&self, addresses: Vec<CarverAddress>) -> Result<()>;

    async fn delete_addresses_with_height_gte(&self, height: u64) -> Result<()>;

    async fn max_address_sequence(&self) -> Result<u64>;
}
