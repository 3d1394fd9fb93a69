//! A `Store` backed by MongoDB, with this collection/index layout:
//! `blocks` (unique on `height`), `carver_movements` (indexed on
//! `sequence`, `block_height`, `from`, `to`, `context_tx`,
//! `context_address`), `carver_addresses` (unique on `label`, indexed on
//! `sequence`, `block_height`).

use async_trait::async_trait;
use bson::doc;
use futures::TryStreamExt;
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};

use crate::config::StoreConfig;
use crate::error::Result;
use crate::models::{Block, CarverAddress, CarverMovement, Label};

pub struct MongoStore {
    blocks: Collection<Block>,
    movements: Collection<CarverMovement>,
    addresses: Collection<CarverAddress>,
}

impl MongoStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let client = Client::with_uri_str(&config.connection_string).await?;
        let db = client.database(&config.database);

        let blocks = db.collection::<Block>("blocks");
        let movements = db.collection::<CarverMovement>("carver_movements");
        let addresses = db.collection::<CarverAddress>("carver_addresses");

        let store = Self {
            blocks,
            movements,
            addresses,
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    /// Creating an index that already exists is a no-op in MongoDB, so this
    /// is safe to call on every startup.
    async fn ensure_indexes(&self) -> Result<()> {
        let unique = |field: &str| {
            IndexModel::builder()
                .keys(doc! { field: 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };
        let plain = |field: &str| IndexModel::builder().keys(doc! { field: 1 }).build();

        self.blocks.create_index(unique("height"), None).await?;
        self.blocks.create_index(plain("is_confirmed"), None).await?;

        self.movements.create_index(plain("sequence"), None).await?;
        self.movements.create_index(plain("block_height"), None).await?;
        self.movements
            .create_index(plain("from.value"), None)
            .await?;
        self.movements.create_index(plain("to.value"), None).await?;
        self.movements
            .create_index(plain("context_tx.value"), None)
            .await?;
        self.movements
            .create_index(plain("context_address.value"), None)
            .await?;

        self.addresses
            .create_index(unique("label.value"), None)
            .await?;
        self.addresses.create_index(plain("sequence"), None).await?;
        self.addresses
            .create_index(plain("block_height"), None)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl super::Store for MongoStore {
    async fn insert_block(&self, block: Block) -> Result<()> {
        self.blocks
            .delete_many(doc! { "height": block.height as i64 }, None)
            .await?;
        self.blocks.insert_one(block, None).await?;
        Ok(())
    }

    async fn find_block_by_height(&self, height: u64) -> Result<Option<Block>> {
        Ok(self
            .blocks
            .find_one(doc! { "height": height as i64 }, None)
            .await?)
    }

    async fn last_block(&self) -> Result<Option<Block>> {
        let opts = FindOptions::builder()
            .sort(doc! { "height": -1 })
            .limit(1)
            .build();
        let mut cursor = self.blocks.find(doc! {}, opts).await?;
        Ok(cursor.try_next().await?)
    }

    async fn delete_blocks_with_height_gte(&self, height: u64) -> Result<()> {
        self.blocks
            .delete_many(doc! { "height": { "$gte": height as i64 } }, None)
            .await?;
        Ok(())
    }

    async fn unconfirmed_blocks_from(&self, from_height: u64) -> Result<Vec<Block>> {
        let opts = FindOptions::builder().sort(doc! { "height": 1 }).build();
        let cursor = self
            .blocks
            .find(
                doc! { "is_confirmed": false, "height": { "$gte": from_height as i64 } },
                opts,
            )
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn mark_block_confirmed(&self, height: u64) -> Result<()> {
        self.blocks
            .update_one(
                doc! { "height": height as i64 },
                doc! { "$set": { "is_confirmed": true } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn insert_movements(&self, movements: Vec<CarverMovement>) -> Result<()> {
        if movements.is_empty() {
            return Ok(());
        }
        self.movements.insert_many(movements, None).await?;
        Ok(())
    }

    async fn movements_with_height_gte_desc(
        &self,
        height: u64,
        limit: usize,
    ) -> Result<Vec<CarverMovement>> {
        let opts = FindOptions::builder()
            .sort(doc! { "sequence": -1 })
            .limit(limit as i64)
            .build();
        let cursor = self
            .movements
            .find(doc! { "block_height": { "$gte": height as i64 } }, opts)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn delete_movements_with_sequence_gte(&self, sequence: u64) -> Result<()> {
        self.movements
            .delete_many(doc! { "sequence": { "$gte": sequence as i64 } }, None)
            .await?;
        Ok(())
    }

    async fn max_movement_sequence(&self) -> Result<u64> {
        let opts = FindOptions::builder()
            .sort(doc! { "sequence": -1 })
            .limit(1)
            .build();
        let mut cursor = self.movements.find(doc! {}, opts).await?;
        Ok(cursor
            .try_next()
            .await?
            .map(|m| m.sequence)
            .unwrap_or(0))
    }

    async fn get_address(&self, label: &Label) -> Result<Option<CarverAddress>> {
        Ok(self
            .addresses
            .find_one(doc! { "label.value": &label.value }, None)
            .await?)
    }

    async fn save_addresses(&self, addresses: Vec<CarverAddress>) -> Result<()> {
        for address in addresses {
            self.addresses
                .update_one(
                    doc! { "label.value": &address.label.value },
                    doc! { "$set": bson::to_document(&address)? },
                    mongodb::options::UpdateOptions::builder()
                        .upsert(true)
                        .build(),
                )
                .await?;
        }
        Ok(())
    }

    async fn delete_addresses_with_height_gte(&self, height: u64) -> Result<()> {
        self.addresses
            .delete_many(doc! { "block_height": { "$gte": height as i64 } }, None)
            .await?;
        Ok(())
    }

    async fn max_address_sequence(&self) -> Result<u64> {
        let opts = FindOptions::builder()
            .sort(doc! { "sequence": -1 })
            .limit(1)
            .build();
        let mut cursor = self.addresses.find(doc! {}, opts).await?;
        Ok(cursor
            .try_next()
            .await?
            .map(|a| a.sequence)
            .unwrap_or(0))
    }
}
