use crate::error::AppError;
use crate::fee::{ResolvedFee, estimate_size};
use crate::select::select_utxos;
use crate::types::{TransactionPlan, UnspentOutput};

/// When no explicit amount is given the whole balance minus the fee is
/// sent (send-all).
pub fn resolve_send_amount(
    total_balance_sats: u64,
    send_sats: Option<u64>,
    fee_sats: u64,
) -> Result<u64, AppError> {
    match send_sats {
        Some(amount) => Ok(amount),
        None => {
            if fee_sats >= total_balance_sats {
                return Err(AppError::InsufficientFunds {
                    available: total_balance_sats,
                    required: fee_sats,
                    fee: fee_sats,
                });
            }
            Ok(total_balance_sats - fee_sats)
        }
    }
}

/// Select covering inputs and build the balanced plan: one output to the
/// target plus a change output back to the source, suppressed when the
/// change is exactly zero.
pub fn assemble_plan(
    source_address: &str,
    target_address: &str,
    send_sats: u64,
    fee: &ResolvedFee,
    utxos: &[UnspentOutput],
) -> Result<TransactionPlan, AppError> {
    let required_sats = send_sats
        .checked_add(fee.fee_sats)
        .ok_or_else(|| AppError::InputValidation("send amount plus fee overflows".to_string()))?;

    let selection = select_utxos(utxos, required_sats).map_err(|s| AppError::InsufficientFunds {
        available: s.accumulated_sats,
        required: s.required_sats,
        fee: fee.fee_sats,
    })?;

    let change_sats = selection.accumulated_sats - required_sats;
    let output_count = if change_sats > 0 { 2 } else { 1 };
    let estimated_size_vbytes = estimate_size(selection.chosen.len(), output_count);

    // The fee was quoted against a pre-selection size estimate. When the
    // actual input count ends up larger the fee is NOT re-solved, so the
    // transaction may slightly underpay the target rate.
    if let Some(rate) = fee.rate_sats_per_vb {
        let implied_fee = (rate * estimated_size_vbytes as f64).floor() as u64;
        if implied_fee > fee.fee_sats {
            log::warn!(
                "actual size {} vB implies {} sats at {} sats/vB; keeping quoted fee of {} sats",
                estimated_size_vbytes,
                implied_fee,
                rate,
                fee.fee_sats
            );
        }
    }

    log::debug!(
        "plan: {} inputs ({} sats), send {}, fee {}, change {}",
        selection.chosen.len(),
        selection.accumulated_sats,
        send_sats,
        fee.fee_sats,
        change_sats
    );

    Ok(TransactionPlan {
        source_address: source_address.to_string(),
        target_address: target_address.to_string(),
        total_balance_sats: utxos.iter().map(|u| u.value_sats).sum(),
        send_sats,
        fee_sats: fee.fee_sats,
        fee_rate_sats_per_vb: fee.rate_sats_per_vb,
        fee_usd: fee.fee_usd,
        estimated_size_vbytes,
        selected_inputs: selection.chosen,
        change_sats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";
    const TARGET: &str = "bc1q7cyrfmck2ffu2ud3rn5l5a8yv6f0chkp0zpemf";

    fn utxo(vout: u32, value_sats: u64) -> UnspentOutput {
        UnspentOutput {
            txid: "0000000000000000000000000000000000000000000000000000000000000000"
                .to_string(),
            vout,
            value_sats,
        }
    }

    fn fee(fee_sats: u64, rate: Option<f64>) -> ResolvedFee {
        ResolvedFee {
            fee_sats,
            fee_usd: 1.0,
            rate_sats_per_vb: rate,
        }
    }

    #[test]
    fn change_goes_back_to_source() {
        let utxos = vec![utxo(0, 50_000), utxo(1, 30_000)];
        let plan = assemble_plan(SOURCE, TARGET, 60_000, &fee(1_000, Some(10.0)), &utxos).unwrap();
        assert_eq!(plan.selected_inputs.len(), 2);
        assert_eq!(plan.change_sats, 19_000);
        assert_eq!(plan.output_count(), 2);
        assert_eq!(plan.estimated_size_vbytes, 148 * 2 + 34 * 2 + 10);
        assert!(plan.is_balanced());
    }

    #[test]
    fn zero_change_is_suppressed() {
        let utxos = vec![utxo(0, 61_000)];
        let plan = assemble_plan(SOURCE, TARGET, 60_000, &fee(1_000, None), &utxos).unwrap();
        assert_eq!(plan.change_sats, 0);
        assert_eq!(plan.output_count(), 1);
        assert!(plan.is_balanced());
    }

    #[test]
    fn send_all_leaves_no_change() {
        let utxos = vec![utxo(0, 100_000)];
        let total: u64 = utxos.iter().map(|u| u.value_sats).sum();
        let send = resolve_send_amount(total, None, 2_260).unwrap();
        assert_eq!(send, 97_740);
        let plan = assemble_plan(SOURCE, TARGET, send, &fee(2_260, Some(10.0)), &utxos).unwrap();
        assert_eq!(plan.change_sats, 0);
        assert_eq!(plan.output_count(), 1);
        assert!(plan.is_balanced());
    }

    #[test]
    fn send_all_fails_when_fee_eats_the_balance() {
        let err = resolve_send_amount(2_000, None, 2_000).unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { available: 2_000, .. }));
    }

    #[test]
    fn shortfall_reports_balance_and_requirement() {
        let utxos = vec![utxo(0, 15_000), utxo(1, 25_000)];
        let err = assemble_plan(SOURCE, TARGET, 50_000, &fee(1_000, None), &utxos).unwrap_err();
        match err {
            AppError::InsufficientFunds {
                available,
                required,
                fee,
            } => {
                assert_eq!(available, 40_000);
                assert_eq!(required, 51_000);
                assert_eq!(fee, 1_000);
            }
            other => panic!("expected InsufficientFunds, got {other:?}"),
        }
    }

    #[test]
    fn selection_is_a_prefix_of_the_provider_order() {
        let utxos = vec![utxo(0, 10_000), utxo(1, 80_000), utxo(2, 5_000)];
        let plan = assemble_plan(SOURCE, TARGET, 50_000, &fee(500, None), &utxos).unwrap();
        assert_eq!(plan.selected_inputs, utxos[..2].to_vec());
    }
}
