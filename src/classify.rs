//! Address/script classification.
//!
//! A pure function over a scriptPubKey, delegated entirely to this module —
//! the rest of the engine only consumes its results. It decodes a
//! scriptPubKey into the ordinary `Address` label the rest of the engine
//! deals in. It does not decide *special* labels
//! (`COINBASE`/`FEE`/`POS`/`MN`/`POW`) — those follow from transaction
//! shape, not script content, and are assigned by
//! [`crate::movement_builder::MovementBuilder`].
//!
//! Coverage gap: zerocoin mint/spend scripts
//! and any other non-standard `scriptPubKey.type` this classifier does not
//! recognize fall through to `Label::Unknown`. The movement carrying that
//! label still records its full amount — value is never dropped on account
//! of an unrecognized script.

use crate::models::Label;

pub trait AddressClassifier: Send + Sync {
    /// Classify a single output's scriptPubKey into the label it pays.
    fn classify_script(&self, script_type: &str, addresses: &[String]) -> Label;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptClassifier;

impl AddressClassifier for ScriptClassifier {
    fn classify_script(&self, script_type: &str, addresses: &[String]) -> Label {
        match script_type {
            "pubkeyhash" | "scripthash" | "witness_v0_keyhash" | "witness_v0_scripthash"
            | "witness_v1_taproot" => addresses
                .first()
                .map(|a| Label::address(a.clone()))
                .unwrap_or_else(|| Label::unknown(script_type)),
            // Pool/fee/privacy script types some chains expose directly on
            // scriptPubKey.type. Most chains never produce these and every
            // output falls through to the branch above; `MovementBuilder`
            // still decides POS/MN routing from transaction shape, not from
            // here, since no script type marks a coinstake payout as such.
            "pow_pool" => Label::proof_of_work(),
            "fee_pool" => Label::fee(),
            "zerocoinmint" | "zerocoinspend" => Label::zerocoin(),
            _ => Label::unknown(script_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pubkeyhash_with_address_classifies_as_address() {
        let c = ScriptClassifier;
        let label = c.classify_script("pubkeyhash", &["A1".to_string()]);
        assert_eq!(label, Label::address("A1"));
    }

    #[test]
    fn nonstandard_script_classifies_as_unknown_and_keeps_identity() {
        let c = ScriptClassifier;
        let label = c.classify_script("nonstandard", &[]);
        assert_eq!(label.kind, crate::models::LabelKind::Unknown);
    }

    #[test]
    fn pubkeyhash_with_no_addresses_falls_back_to_unknown() {
        let c = ScriptClassifier;
        let label = c.classify_script("pubkeyhash", &[]);
        assert_eq!(label.kind, crate::models::LabelKind::Unknown);
    }
}
