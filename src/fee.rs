use crate::error::AppError;
use crate::oracle::{FeeOracle, FeeRateSource};

// Fixed legacy-style linear size model, reused for both the
// pre-selection estimate and the post-selection final estimate.
const INPUT_VBYTES: u64 = 148;
const OUTPUT_VBYTES: u64 = 34;
const OVERHEAD_VBYTES: u64 = 10;

const SATS_PER_BTC: f64 = 1e8;

/// Estimated transaction size in virtual bytes.
pub fn estimate_size(input_count: usize, output_count: usize) -> u64 {
    INPUT_VBYTES * input_count as u64 + OUTPUT_VBYTES * output_count as u64 + OVERHEAD_VBYTES
}

/// Exactly one way of arriving at the fee is active per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeePolicy {
    /// Flat USD amount, converted at the current price.
    FlatUsd(f64),
    /// User-supplied sats/vByte rate.
    ExplicitRate(f64),
    /// Rate fetched from the named provider.
    OracleRate(FeeRateSource),
}

impl FeePolicy {
    /// CLI precedence: a flat USD fee overrides a rate, an explicit rate
    /// overrides the provider lookup.
    pub fn from_overrides(
        fee_usd: Option<f64>,
        fee_rate: Option<f64>,
        source: FeeRateSource,
    ) -> FeePolicy {
        match (fee_usd, fee_rate) {
            (Some(usd), _) => FeePolicy::FlatUsd(usd),
            (None, Some(rate)) => FeePolicy::ExplicitRate(rate),
            (None, None) => FeePolicy::OracleRate(source),
        }
    }

    /// Rejected before any network call is made.
    fn validate(&self) -> Result<(), AppError> {
        match *self {
            FeePolicy::FlatUsd(usd) if !(usd > 0.0) => Err(AppError::InvalidFeePolicy(format!(
                "flat fee must be a positive USD amount, got {usd}"
            ))),
            FeePolicy::ExplicitRate(rate) if !(rate > 0.0) => Err(AppError::InvalidFeePolicy(
                format!("fee rate must be positive sats/vByte, got {rate}"),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedFee {
    pub fee_sats: u64,
    pub fee_usd: f64,
    /// None for a flat-USD fee, where no rate was involved.
    pub rate_sats_per_vb: Option<f64>,
}

/// Turn a fee policy into concrete satoshis plus a USD equivalent, using
/// the size estimated from the assumed input/output counts.
pub fn resolve_fee(
    policy: FeePolicy,
    oracle: &dyn FeeOracle,
    input_count: usize,
    output_count: usize,
) -> Result<ResolvedFee, AppError> {
    policy.validate()?;

    let rate = match policy {
        FeePolicy::FlatUsd(usd) => {
            let price = oracle.price_usd()?;
            let fee_sats = (usd / price * SATS_PER_BTC).round() as u64;
            log::debug!("flat fee ${usd} at price ${price} -> {fee_sats} sats");
            return Ok(ResolvedFee {
                fee_sats,
                fee_usd: usd,
                rate_sats_per_vb: None,
            });
        }
        FeePolicy::ExplicitRate(rate) => rate,
        FeePolicy::OracleRate(source) => oracle.fee_rate(source)?,
    };

    let estimated_size = estimate_size(input_count, output_count);
    let fee_sats = (rate * estimated_size as f64).floor() as u64;
    let fee_usd = fee_sats as f64 / SATS_PER_BTC * oracle.price_usd()?;
    log::debug!(
        "rate {rate} sats/vB over estimated {estimated_size} vB -> {fee_sats} sats (~${fee_usd:.2})"
    );
    Ok(ResolvedFee {
        fee_sats,
        fee_usd,
        rate_sats_per_vb: Some(rate),
    })
}
