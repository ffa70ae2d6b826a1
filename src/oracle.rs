use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::AppError;

const COINGECKO_PRICE_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd";
const MEMPOOL_FEES_URL: &str = "https://mempool.space/api/v1/fees/recommended";
const SLIPSTREAM_INFO_URL: &str = "https://slipstream.mara.com/rest-api/getinfo";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Which provider to ask for a recommended fee rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeRateSource {
    Mempool,
    Slipstream,
}

/// External price / fee-rate data behind one interface. One network call
/// per method, bounded timeout, no retries; retry policy belongs to the
/// caller if it wants one.
pub trait FeeOracle {
    /// Current BTC price in USD.
    fn price_usd(&self) -> Result<f64, AppError>;

    /// Recommended fee rate in sats/vByte from the chosen provider.
    fn fee_rate(&self, source: FeeRateSource) -> Result<f64, AppError>;
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    bitcoin: PriceEntry,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    usd: f64,
}

#[derive(Debug, Deserialize)]
struct RecommendedFees {
    #[serde(rename = "fastestFee")]
    fastest_fee: f64,
}

#[derive(Debug, Deserialize)]
struct SlipstreamInfo {
    fee_rate: f64,
}

pub struct HttpFeeOracle {
    client: reqwest::blocking::Client,
}

impl HttpFeeOracle {
    pub fn new() -> Result<Self, AppError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| unavailable("http client", e))?;
        Ok(Self { client })
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| unavailable(url, e))?
            .error_for_status()
            .map_err(|e| unavailable(url, e))?;
        response.json().map_err(|e| unavailable(url, e))
    }
}

impl FeeOracle for HttpFeeOracle {
    fn price_usd(&self) -> Result<f64, AppError> {
        let price: PriceResponse = self.get_json(COINGECKO_PRICE_URL)?;
        require_positive(COINGECKO_PRICE_URL, price.bitcoin.usd)
    }

    fn fee_rate(&self, source: FeeRateSource) -> Result<f64, AppError> {
        match source {
            FeeRateSource::Mempool => {
                let fees: RecommendedFees = self.get_json(MEMPOOL_FEES_URL)?;
                require_positive(MEMPOOL_FEES_URL, fees.fastest_fee)
            }
            FeeRateSource::Slipstream => {
                let info: SlipstreamInfo = self.get_json(SLIPSTREAM_INFO_URL)?;
                require_positive(SLIPSTREAM_INFO_URL, info.fee_rate)
            }
        }
    }
}

fn unavailable(endpoint: &str, reason: impl std::fmt::Display) -> AppError {
    AppError::OracleUnavailable {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    }
}

fn require_positive(endpoint: &str, value: f64) -> Result<f64, AppError> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(unavailable(endpoint, format!("non-positive value {value}")))
    }
}
