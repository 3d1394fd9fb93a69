use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A synced block. `(sequence_start, sequence_end]` brackets the sequences
/// of every movement produced while processing this height; the `Block`
/// row is written last within a height's work and is therefore the sole
/// commit marker for that height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub prev_hash: Option<String>,
    pub merkle_root: String,
    pub bits: String,
    pub nonce: u64,
    pub difficulty: f64,
    pub size: u64,
    pub version: i32,
    pub confirmations_at_ingest: i64,
    pub created_at: DateTime<Utc>,
    pub vins_count: u64,
    pub vouts_count: u64,
    pub sequence_start: u64,
    pub sequence_end: u64,
    pub is_confirmed: bool,
}
