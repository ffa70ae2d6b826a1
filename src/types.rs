use serde::{Deserialize, Serialize};

/// A spendable output as returned by the UTXO provider. Immutable once
/// fetched; the selector and assembler only ever read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentOutput {
    pub txid: String,
    pub vout: u32,
    pub value_sats: u64,
}

/// The fully balanced result of coin selection and fee resolution.
/// Built once by the assembler and never mutated afterwards; both the
/// immediate-sign and deferred-sign paths consume it as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPlan {
    pub source_address: String,
    pub target_address: String,
    pub total_balance_sats: u64,
    pub send_sats: u64,
    pub fee_sats: u64,
    /// None when the fee came from a flat USD amount.
    pub fee_rate_sats_per_vb: Option<f64>,
    pub fee_usd: f64,
    pub estimated_size_vbytes: u64,
    pub selected_inputs: Vec<UnspentOutput>,
    pub change_sats: u64,
}

impl TransactionPlan {
    pub fn input_total_sats(&self) -> u64 {
        self.selected_inputs.iter().map(|u| u.value_sats).sum()
    }

    pub fn output_count(&self) -> usize {
        if self.change_sats > 0 { 2 } else { 1 }
    }

    /// sum(inputs) == send + fee + change. Holds by construction for
    /// every plan the assembler produces; re-checked when a persisted
    /// bundle is loaded.
    pub fn is_balanced(&self) -> bool {
        self.input_total_sats() == self.send_sats + self.fee_sats + self.change_sats
    }
}

/// Terminal artifact of either signing path.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub raw_hex: String,
    pub source_address: String,
    pub target_address: String,
    pub send_sats: u64,
    pub change_sats: u64,
    pub fee_sats: u64,
}
