use std::fs;
use std::path::Path;

use bitcoin::Transaction;
use bitcoin::consensus::encode;
use serde::{Deserialize, Serialize};

use crate::cli::parse_network;
use crate::error::AppError;
use crate::signing;
use crate::types::TransactionPlan;

/// The portable hand-off between the prepare and sign invocations.
/// Written once, read once; the signer trusts it as the single source of
/// truth and never re-queries UTXOs or fee sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedBundle {
    pub network: String,
    pub plan: TransactionPlan,
    pub unsigned_tx_hex: String,
}

impl UnsignedBundle {
    pub fn write(&self, path: &Path) -> Result<(), AppError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Internal(format!("bundle serialization: {e}")))?;
        fs::write(path, json)?;
        log::info!("unsigned bundle written to {path:?}");
        Ok(())
    }

    /// Load and fully validate a persisted bundle. A bundle that fails
    /// any check is rejected whole; nothing is signed from it.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = fs::read_to_string(path)?;
        let bundle: UnsignedBundle =
            serde_json::from_str(&content).map_err(|e| malformed(path, e))?;
        bundle.validate(path)?;
        Ok(bundle)
    }

    fn validate(&self, path: &Path) -> Result<(), AppError> {
        if self.plan.selected_inputs.is_empty() {
            return Err(malformed(path, "no selected inputs"));
        }
        if !self.plan.is_balanced() {
            return Err(malformed(
                path,
                format!(
                    "amounts do not balance: inputs {} != send {} + fee {} + change {}",
                    self.plan.input_total_sats(),
                    self.plan.send_sats,
                    self.plan.fee_sats,
                    self.plan.change_sats
                ),
            ));
        }

        let network = parse_network(&self.network).map_err(|e| malformed(path, e))?;
        let raw = hex::decode(&self.unsigned_tx_hex).map_err(|e| malformed(path, e))?;
        let stored: Transaction = encode::deserialize(&raw).map_err(|e| malformed(path, e))?;
        let rebuilt = signing::build_unsigned(&self.plan, network)
            .map_err(|e| malformed(path, format!("cannot rebuild transaction: {e}")))?;
        if stored.compute_txid() != rebuilt.compute_txid() {
            return Err(malformed(
                path,
                "stored unsigned transaction does not match the plan",
            ));
        }
        Ok(())
    }
}

fn malformed(path: &Path, reason: impl std::fmt::Display) -> AppError {
    AppError::MalformedBundle {
        file_path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
