use std::path::PathBuf;

use bitcoin::Network as BitcoinNetwork;
use clap::{Parser, Subcommand};

use crate::error::AppError;
use crate::oracle::FeeRateSource;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Prepare and sign Bitcoin payment transactions", long_about = None)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Select UTXOs, compute the fee and build the transaction. Signs
    /// immediately when given a private key; with a bare address it
    /// writes an unsigned bundle for later signing.
    Prepare(PrepareArgs),

    /// Sign a previously prepared unsigned bundle with a private key.
    /// Amounts and addresses come from the bundle alone.
    Sign(SignArgs),
}

#[derive(clap::Args, Debug)]
pub struct PrepareArgs {
    /// Recipient address
    pub target_address: String,

    /// Private key (WIF) to sign now, or a funding address to prepare an unsigned bundle
    pub key_or_address: String,

    /// Amount to send in satoshis; default is the whole balance minus the fee
    #[clap(long)]
    pub send_sats: Option<u64>,

    /// Flat fee in USD (overrides any rate)
    #[clap(long)]
    pub fee_usd: Option<f64>,

    /// Fee rate in sats/vByte (overrides the fee-rate API)
    #[clap(long)]
    pub fee_rate: Option<f64>,

    /// Fee-rate API when --fee-rate is not set ("mempool" or "slipstream")
    #[clap(long, default_value = "mempool")]
    pub fee_source: String,

    /// Network ("bitcoin", "testnet", "signet", "regtest")
    #[clap(short, long, default_value = "bitcoin")]
    pub network: String,

    /// Where to write the unsigned bundle on the deferred-sign path
    #[clap(long, default_value = "unsigned_tx.json")]
    pub bundle_file: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct SignArgs {
    /// Path to the unsigned bundle written by `prepare`
    #[clap(long, default_value = "unsigned_tx.json")]
    pub bundle_file: PathBuf,

    /// Private key (WIF)
    #[clap(long)]
    pub private_key: String,
}

pub fn parse_network(network_str: &str) -> Result<BitcoinNetwork, AppError> {
    match network_str.to_lowercase().as_str() {
        "bitcoin" | "mainnet" => Ok(BitcoinNetwork::Bitcoin),
        "testnet" => Ok(BitcoinNetwork::Testnet),
        "signet" => Ok(BitcoinNetwork::Signet),
        "regtest" => Ok(BitcoinNetwork::Regtest),
        s => Err(AppError::InputValidation(format!("invalid network: {s}"))),
    }
}

/// Canonical name persisted into the unsigned bundle; round-trips
/// through `parse_network`.
pub fn network_name(network: BitcoinNetwork) -> &'static str {
    match network {
        BitcoinNetwork::Bitcoin => "bitcoin",
        BitcoinNetwork::Testnet => "testnet",
        BitcoinNetwork::Signet => "signet",
        _ => "regtest",
    }
}

pub fn parse_fee_source(source_str: &str) -> Result<FeeRateSource, AppError> {
    match source_str.to_lowercase().as_str() {
        "mempool" => Ok(FeeRateSource::Mempool),
        "slipstream" => Ok(FeeRateSource::Slipstream),
        s => Err(AppError::InputValidation(format!("invalid fee source: {s}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_names_round_trip() {
        for network in [
            BitcoinNetwork::Bitcoin,
            BitcoinNetwork::Testnet,
            BitcoinNetwork::Signet,
            BitcoinNetwork::Regtest,
        ] {
            assert_eq!(parse_network(network_name(network)).unwrap(), network);
        }
        assert_eq!(parse_network("mainnet").unwrap(), BitcoinNetwork::Bitcoin);
        assert!(parse_network("litecoin").is_err());
    }

    #[test]
    fn fee_sources_parse() {
        assert_eq!(parse_fee_source("mempool").unwrap(), FeeRateSource::Mempool);
        assert_eq!(
            parse_fee_source("Slipstream").unwrap(),
            FeeRateSource::Slipstream
        );
        assert!(parse_fee_source("other").is_err());
    }
}
