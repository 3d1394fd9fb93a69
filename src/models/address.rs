use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The kind of accounting entity a [`CarverAddress`] represents.
///
/// Special kinds, plus `Tx`, are populated lazily and never evicted from
/// the [`crate::address_cache::AddressCache`] common tier; `Address` is the
/// only ordinary, potentially-evictable kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LabelKind {
    Address,
    Tx,
    Coinbase,
    Fee,
    Masternode,
    ProofOfStake,
    ProofOfWork,
    Zerocoin,
    /// A scriptPubKey the classifier could not decode. Value is never
    /// dropped on account of landing here; see `classify` module docs.
    Unknown,
}

/// A stable label identifying a [`CarverAddress`].
///
/// Special labels (`COINBASE`, `FEE`, `MN`, `POS`, `POW`, `ZEROCOIN`) are
/// singletons; ordinary labels are either a user-facing address string or a
/// transaction id standing in for that transaction's pseudo-address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub value: String,
    pub kind: LabelKind,
}

impl Label {
    pub fn new(value: impl Into<String>, kind: LabelKind) -> Self {
        Self {
            value: value.into(),
            kind,
        }
    }

    pub fn coinbase() -> Self {
        Self::new("COINBASE", LabelKind::Coinbase)
    }

    pub fn fee() -> Self {
        Self::new("FEE", LabelKind::Fee)
    }

    pub fn masternode() -> Self {
        Self::new("MN", LabelKind::Masternode)
    }

    pub fn proof_of_stake() -> Self {
        Self::new("POS", LabelKind::ProofOfStake)
    }

    pub fn proof_of_work() -> Self {
        Self::new("POW", LabelKind::ProofOfWork)
    }

    pub fn zerocoin() -> Self {
        Self::new("ZEROCOIN", LabelKind::Zerocoin)
    }

    pub fn tx(txid: impl Into<String>) -> Self {
        Self::new(txid, LabelKind::Tx)
    }

    pub fn address(addr: impl Into<String>) -> Self {
        Self::new(addr, LabelKind::Address)
    }

    pub fn unknown(raw: impl Into<String>) -> Self {
        Self::new(raw, LabelKind::Unknown)
    }

    /// Whether this label lives in the cache's unbounded common tier —
    /// every special label plus `Tx` pseudo-addresses. Only `Address` is
    /// ordinary and subject to the normal tier's wholesale eviction.
    pub fn is_special(&self) -> bool {
        !matches!(self.kind, LabelKind::Address)
    }
}

/// A unique accounting entity, identified by a stable [`Label`].
///
/// Invariants (checked by [`crate::sequence_applier::SequenceApplier`] and
/// [`crate::unwinder::Unwinder`], never by this struct itself):
/// - `balance == value_in - value_out`
/// - `sequence` is strictly increasing across the address's lifetime
/// - `last_movement` identifies the movement that last set `sequence`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarverAddress {
    pub label: Label,
    pub block_height: u64,
    pub sequence: u64,
    pub last_movement: Option<String>,
    pub balance: Decimal,
    pub count_in: u64,
    pub count_out: u64,
    pub value_in: Decimal,
    pub value_out: Decimal,
    pub pow_count_in: u64,
    pub pow_value_in: Decimal,
    pub pos_count_in: u64,
    pub pos_value_in: Decimal,
    pub mn_count_in: u64,
    pub mn_value_in: Decimal,
    pub pos_reward_movement: Option<String>,
    pub mn_reward_movement: Option<String>,
}

impl CarverAddress {
    /// A freshly-created address as it exists before any movement has ever
    /// touched it. `sequence == 0` is the sentinel the Unwinder treats as
    /// "never applied" when restoring `last_movement` pointers.
    pub fn new(label: Label, block_height: u64) -> Self {
        Self {
            label,
            block_height,
            sequence: 0,
            last_movement: None,
            balance: Decimal::ZERO,
            count_in: 0,
            count_out: 0,
            value_in: Decimal::ZERO,
            value_out: Decimal::ZERO,
            pow_count_in: 0,
            pow_value_in: Decimal::ZERO,
            pos_count_in: 0,
            pos_value_in: Decimal::ZERO,
            mn_count_in: 0,
            mn_value_in: Decimal::ZERO,
            pos_reward_movement: None,
            mn_reward_movement: None,
        }
    }
}
