use std::path::PathBuf;
use bitcoin::address::ParseError as BitcoinAddressError;
use bitcoin::key::FromWifError as BitcoinKeyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bitcoin address error: {0}")]
    BitcoinAddress(#[from] BitcoinAddressError),

    #[error("private key (WIF) error: {0}")]
    BitcoinKey(#[from] BitcoinKeyError),

    #[error("network mismatch: CLI specified {cli_network}, key/address implies {inferred_network}")]
    NetworkMismatch {
        cli_network: String,
        inferred_network: String,
    },

    #[error("input validation error: {0}")]
    InputValidation(String),

    #[error("no UTXOs found for {address} on {network}")]
    NoUtxosFound { address: String, network: String },

    #[error("UTXO lookup failed for {address}: {reason}")]
    UtxoFetch { address: String, reason: String },

    #[error("fee oracle unavailable ({endpoint}): {reason}")]
    OracleUnavailable { endpoint: String, reason: String },

    #[error("invalid fee policy: {0}")]
    InvalidFeePolicy(String),

    #[error("insufficient funds: available {available} sats, required {required} sats (including fee of {fee} sats)")]
    InsufficientFunds {
        available: u64,
        required: u64,
        fee: u64,
    },

    #[error("malformed unsigned bundle {file_path:?}: {reason}")]
    MalformedBundle { file_path: PathBuf, reason: String },

    #[error("signing failed: {0}")]
    SigningFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}
