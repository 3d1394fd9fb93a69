use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::address::Label;

/// The closed set of movement kinds the [`crate::movement_builder::MovementBuilder`]
/// can ever produce. Closed by design: a new on-chain shape should map onto
/// one of these, not grow the taxonomy ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementType {
    CoinbaseToTx,
    TxToPowAddress,
    PowAddressReward,
    PosRewardToTx,
    TxToPosAddress,
    MasternodeRewardToTx,
    TxToMnAddress,
    FeeToTx,
    TxToFee,
    AddressToTx,
    TxToAddress,
    ZerocoinToTx,
    TxToZerocoin,
}

impl MovementType {
    /// Human-readable label stored on the movement record's own `label`
    /// field, distinct from the `CarverAddress` label.
    pub fn label(self) -> &'static str {
        match self {
            MovementType::CoinbaseToTx => "coinbase_to_tx",
            MovementType::TxToPowAddress => "tx_to_pow_address",
            MovementType::PowAddressReward => "pow_address_reward",
            MovementType::PosRewardToTx => "pos_reward_to_tx",
            MovementType::TxToPosAddress => "tx_to_pos_address",
            MovementType::MasternodeRewardToTx => "masternode_reward_to_tx",
            MovementType::TxToMnAddress => "tx_to_mn_address",
            MovementType::FeeToTx => "fee_to_tx",
            MovementType::TxToFee => "tx_to_fee",
            MovementType::AddressToTx => "address_to_tx",
            MovementType::TxToAddress => "tx_to_address",
            MovementType::ZerocoinToTx => "zerocoin_to_tx",
            MovementType::TxToZerocoin => "tx_to_zerocoin",
        }
    }

    /// Whether this movement type credits a PoW/PoS/MN category counter on
    /// its `to` endpoint. For PoW that endpoint is the real miner address
    /// reached by `PowAddressReward` (the second hop past the `POW` pool
    /// label), mirroring how `TxToPosAddress`/`TxToMnAddress` credit the
    /// real payee directly.
    pub fn reward_category(self) -> Option<RewardCategory> {
        match self {
            MovementType::PowAddressReward => Some(RewardCategory::Pow),
            MovementType::TxToPosAddress => Some(RewardCategory::Pos),
            MovementType::TxToMnAddress => Some(RewardCategory::Mn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardCategory {
    Pow,
    Pos,
    Mn,
}

/// Output of the MovementBuilder's required-movements sweep: names which
/// addresses will be touched, without yet resolving full address records.
/// `from`/`to` are labels rather than ids because the address may not exist
/// in the store yet.
#[derive(Debug, Clone)]
pub struct RequiredMovement {
    pub from: Label,
    pub to: Label,
    pub amount: Decimal,
    pub movement_type: MovementType,
    /// The eventual payee when this movement is a pass-through hop through a
    /// pool address (e.g. `TxToPowAddress` routes through `POW` on its way
    /// to the real miner address) — lets a reader skip straight to the
    /// payee without joining the follow-up movement.
    pub destination_address: Option<Label>,
    pub pos_input_amount: Option<Decimal>,
    pub pos_input_block_height_diff: Option<i64>,
}

/// Output of the parse sweep: a `RequiredMovement` with its addresses
/// resolved, ready for [`crate::sequence_applier::SequenceApplier`].
#[derive(Debug, Clone)]
pub struct ParsedMovement {
    pub from: Label,
    pub to: Label,
    pub amount: Decimal,
    pub movement_type: MovementType,
    pub date: DateTime<Utc>,
    pub block_height: u64,
    pub destination_address: Option<Label>,
    pub pos_input_amount: Option<Decimal>,
    pub pos_input_block_height_diff: Option<i64>,
}

/// An immutable ledger record. Never mutated after insertion; deleted only
/// by the [`crate::unwinder::Unwinder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarverMovement {
    /// Store-assigned id (e.g. a `"{block_height}:{sequence}"` string); set
    /// on insertion, not before.
    pub id: Option<String>,
    pub label: String,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    pub block_height: u64,
    pub from: Label,
    pub to: Label,
    pub destination_address: Option<Label>,
    /// Balance of `from` immediately *before* this movement was applied.
    pub from_balance: Decimal,
    /// Balance of `to` immediately *before* this movement was applied.
    pub to_balance: Decimal,
    pub movement_type: MovementType,
    pub sequence: u64,
    pub last_from_movement: Option<String>,
    pub last_to_movement: Option<String>,
    pub context_address: Option<Label>,
    pub context_tx: Option<Label>,
    pub pos_reward_amount: Option<Decimal>,
    pub pos_input_amount: Option<Decimal>,
    pub pos_input_block_height_diff: Option<i64>,
}

impl CarverMovement {
    /// Splits `from`/`to` into `context_address`/`context_tx`: whichever
    /// side is of kind `Tx` goes to `context_tx`, the other to
    /// `context_address`, enabling efficient lookups by either.
    pub fn compute_context(from: &Label, to: &Label) -> (Option<Label>, Option<Label>) {
        use super::address::LabelKind;

        match (from.kind, to.kind) {
            (LabelKind::Tx, LabelKind::Tx) => (None, Some(from.clone())),
            (LabelKind::Tx, _) => (Some(to.clone()), Some(from.clone())),
            (_, LabelKind::Tx) => (Some(from.clone()), Some(to.clone())),
            _ => (Some(from.clone()), None),
        }
    }
}
