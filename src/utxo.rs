use std::time::Duration;

use bitcoin::Network;
use serde::Deserialize;

use crate::error::AppError;
use crate::types::UnspentOutput;

const MEMPOOL_MAINNET_API: &str = "https://mempool.space/api";
const MEMPOOL_TESTNET_API: &str = "https://mempool.space/testnet/api";
const MEMPOOL_SIGNET_API: &str = "https://mempool.space/signet/api";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

fn api_base(network: Network) -> &'static str {
    match network {
        Network::Bitcoin => MEMPOOL_MAINNET_API,
        Network::Signet => MEMPOOL_SIGNET_API,
        _ => MEMPOOL_TESTNET_API,
    }
}

/// Esplora UTXO record; only the fields the engine needs.
#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
}

/// Fetch the spendable outputs for an address, preserving the provider's
/// order. The selector depends on that order being stable.
pub fn fetch_utxos(address: &str, network: Network) -> Result<Vec<UnspentOutput>, AppError> {
    let url = format!("{}/address/{}/utxo", api_base(network), address);
    log::info!("fetching UTXOs from {url}");

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| fetch_error(address, e))?;
    let response = client
        .get(&url)
        .send()
        .map_err(|e| fetch_error(address, e))?
        .error_for_status()
        .map_err(|e| fetch_error(address, e))?;
    let raw: Vec<EsploraUtxo> = response.json().map_err(|e| fetch_error(address, e))?;

    if raw.is_empty() {
        return Err(AppError::NoUtxosFound {
            address: address.to_string(),
            network: format!("{network:?}"),
        });
    }

    let utxos: Vec<UnspentOutput> = raw
        .into_iter()
        .map(|u| UnspentOutput {
            txid: u.txid,
            vout: u.vout,
            value_sats: u.value,
        })
        .collect();
    log::info!(
        "found {} UTXOs, total {} sats",
        utxos.len(),
        utxos.iter().map(|u| u.value_sats).sum::<u64>()
    );
    Ok(utxos)
}

fn fetch_error(address: &str, reason: impl std::fmt::Display) -> AppError {
    AppError::UtxoFetch {
        address: address.to_string(),
        reason: reason.to_string(),
    }
}
