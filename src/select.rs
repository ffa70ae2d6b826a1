use crate::types::UnspentOutput;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub chosen: Vec<UnspentOutput>,
    pub accumulated_sats: u64,
}

/// Accumulated value fell short of the requirement; the caller turns
/// this into a user-facing error with the fee attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub accumulated_sats: u64,
    pub required_sats: u64,
}

/// Pick the first prefix of `utxos`, in the order the provider returned
/// them, whose accumulated value covers `required_sats`. No reordering
/// and no optimality attempt: selection must be a pure function of the
/// input order so the deferred-sign phase can reproduce the exact same
/// inputs from persisted data.
pub fn select_utxos(utxos: &[UnspentOutput], required_sats: u64) -> Result<Selection, Shortfall> {
    let mut chosen = Vec::new();
    let mut accumulated_sats = 0u64;
    for utxo in utxos {
        accumulated_sats += utxo.value_sats;
        chosen.push(utxo.clone());
        if accumulated_sats >= required_sats {
            return Ok(Selection {
                chosen,
                accumulated_sats,
            });
        }
    }
    Err(Shortfall {
        accumulated_sats,
        required_sats,
    })
}
