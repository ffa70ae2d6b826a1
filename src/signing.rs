use std::str::FromStr;

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode;
use bitcoin::hashes::Hash;
use bitcoin::key::TapTweak;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{All, Keypair, Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType};
use bitcoin::{
    Address, Amount, CompressedPublicKey, Network, OutPoint, PrivateKey, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut, Txid, Witness,
};

use crate::error::AppError;
use crate::types::{SignedTransaction, TransactionPlan};

/// What the user handed us as the funding side: a private key that can
/// sign right away, or a bare address that can only prepare.
#[derive(Debug)]
pub enum FundingSource {
    Credential { key: PrivateKey, address: Address },
    Watch(Address),
}

impl FundingSource {
    pub fn address(&self) -> &Address {
        match self {
            FundingSource::Credential { address, .. } => address,
            FundingSource::Watch(address) => address,
        }
    }
}

/// Structural category of the source address, which decides how each
/// input is signed and encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningScheme {
    Legacy,
    WrappedSegwit,
    NativeSegwit,
    Taproot,
}

/// Explicit parse of the key-or-address argument. A WIF string yields a
/// credential with its canonical legacy address (the size model assumes
/// legacy inputs); anything else must parse as an address on the chosen
/// network.
pub fn classify_funding(
    input: &str,
    network: Network,
    secp: &Secp256k1<All>,
) -> Result<FundingSource, AppError> {
    if let Ok(key) = PrivateKey::from_wif(input) {
        if key.network != network.into() {
            return Err(AppError::NetworkMismatch {
                cli_network: format!("{network:?}"),
                inferred_network: format!("{:?}", key.network),
            });
        }
        let address = Address::p2pkh(&key.public_key(secp), network);
        log::info!("funding credential recognized, canonical address {address}");
        return Ok(FundingSource::Credential { key, address });
    }
    let address = parse_checked_address(input, network)?;
    log::info!("funding address {address} (prepare-only, no credential)");
    Ok(FundingSource::Watch(address))
}

pub fn parse_checked_address(input: &str, network: Network) -> Result<Address, AppError> {
    Ok(Address::from_str(input)?.require_network(network)?)
}

pub fn scheme_for_address(address: &Address) -> Result<SigningScheme, AppError> {
    let script_pubkey = address.script_pubkey();
    if script_pubkey.is_p2pkh() {
        Ok(SigningScheme::Legacy)
    } else if script_pubkey.is_p2sh() {
        Ok(SigningScheme::WrappedSegwit)
    } else if script_pubkey.is_p2wpkh() {
        Ok(SigningScheme::NativeSegwit)
    } else if script_pubkey.is_p2tr() {
        Ok(SigningScheme::Taproot)
    } else {
        Err(AppError::SigningFailure(format!(
            "unsupported source address type: {address}"
        )))
    }
}

/// Rebuild the transaction structure from a plan: selected inputs in
/// their persisted order, the payment output, and the change output when
/// change is non-zero. Script sigs and witnesses stay empty.
pub fn build_unsigned(plan: &TransactionPlan, network: Network) -> Result<Transaction, AppError> {
    let source = parse_checked_address(&plan.source_address, network)?;
    let target = parse_checked_address(&plan.target_address, network)?;

    let input = plan
        .selected_inputs
        .iter()
        .map(|utxo| {
            let txid = Txid::from_str(&utxo.txid).map_err(|e| {
                AppError::InputValidation(format!("invalid txid {}: {e}", utxo.txid))
            })?;
            Ok(TxIn {
                previous_output: OutPoint::new(txid, utxo.vout),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let mut output = vec![TxOut {
        value: Amount::from_sat(plan.send_sats),
        script_pubkey: target.script_pubkey(),
    }];
    if plan.change_sats > 0 {
        output.push(TxOut {
            value: Amount::from_sat(plan.change_sats),
            script_pubkey: source.script_pubkey(),
        });
    }

    Ok(Transaction {
        version: bitcoin::transaction::Version(2),
        lock_time: LockTime::ZERO,
        input,
        output,
    })
}

/// Sign a plan with a credential. The amounts and addresses come from
/// the plan alone; signing never recomputes them. Fails when the key
/// does not control the source address.
pub fn sign_plan(
    plan: &TransactionPlan,
    key: &PrivateKey,
    network: Network,
    secp: &Secp256k1<All>,
) -> Result<SignedTransaction, AppError> {
    if key.network != network.into() {
        return Err(AppError::NetworkMismatch {
            cli_network: format!("{network:?}"),
            inferred_network: format!("{:?}", key.network),
        });
    }

    let source = parse_checked_address(&plan.source_address, network)?;
    let scheme = scheme_for_address(&source)?;
    log::info!("signing {} input(s) as {scheme:?}", plan.selected_inputs.len());

    let derived = derived_address_for(scheme, key, network, secp)?;
    if derived != source {
        return Err(AppError::SigningFailure(format!(
            "credential does not control source address {source} (derives {derived})"
        )));
    }

    let mut tx = build_unsigned(plan, network)?;
    match scheme {
        SigningScheme::Legacy => sign_legacy(&mut tx, key, &source, secp)?,
        SigningScheme::WrappedSegwit | SigningScheme::NativeSegwit => {
            sign_segwit_v0(&mut tx, plan, key, scheme, secp)?
        }
        SigningScheme::Taproot => sign_taproot(&mut tx, plan, key, &source, secp)?,
    }
    log::info!("all inputs signed");

    Ok(SignedTransaction {
        raw_hex: encode::serialize_hex(&tx),
        source_address: plan.source_address.clone(),
        target_address: plan.target_address.clone(),
        send_sats: plan.send_sats,
        change_sats: plan.change_sats,
        fee_sats: plan.fee_sats,
    })
}

/// The address the credential would control under the given scheme.
fn derived_address_for(
    scheme: SigningScheme,
    key: &PrivateKey,
    network: Network,
    secp: &Secp256k1<All>,
) -> Result<Address, AppError> {
    let pubkey = key.public_key(secp);
    match scheme {
        SigningScheme::Legacy => Ok(Address::p2pkh(&pubkey, network)),
        SigningScheme::WrappedSegwit => {
            Ok(Address::p2shwpkh(&compressed(&pubkey)?, network))
        }
        SigningScheme::NativeSegwit => {
            Ok(Address::p2wpkh(&compressed(&pubkey)?, network))
        }
        SigningScheme::Taproot => {
            let keypair = Keypair::from_secret_key(secp, &key.inner);
            let (xonly, _parity) = keypair.x_only_public_key();
            Ok(Address::p2tr(secp, xonly, None, network))
        }
    }
}

fn compressed(pubkey: &bitcoin::PublicKey) -> Result<CompressedPublicKey, AppError> {
    (*pubkey).try_into().map_err(|_| {
        AppError::SigningFailure("segwit signing requires a compressed public key".to_string())
    })
}

fn sighash_failure(input_index: usize, reason: impl std::fmt::Display) -> AppError {
    AppError::SigningFailure(format!("sighash for input {input_index}: {reason}"))
}

fn sign_legacy(
    tx: &mut Transaction,
    key: &PrivateKey,
    source: &Address,
    secp: &Secp256k1<All>,
) -> Result<(), AppError> {
    let script_pubkey = source.script_pubkey();
    let pubkey = key.public_key(secp);

    let mut encoded_sigs = Vec::with_capacity(tx.input.len());
    {
        let cache = SighashCache::new(&*tx);
        for input_index in 0..tx.input.len() {
            let sighash = cache
                .legacy_signature_hash(input_index, &script_pubkey, EcdsaSighashType::All.to_u32())
                .map_err(|e| sighash_failure(input_index, e))?;
            let message = Message::from_digest(sighash.to_byte_array());
            let signature = secp.sign_ecdsa(&message, &key.inner);
            let mut sig_bytes = signature.serialize_der().to_vec();
            sig_bytes.push(EcdsaSighashType::All as u8);
            encoded_sigs.push(sig_bytes);
        }
    }

    for (input_index, sig_bytes) in encoded_sigs.into_iter().enumerate() {
        let sig_push = PushBytesBuf::try_from(sig_bytes).map_err(|_| {
            AppError::SigningFailure(format!("signature encoding for input {input_index}"))
        })?;
        tx.input[input_index].script_sig = Builder::new()
            .push_slice(sig_push)
            .push_key(&pubkey)
            .into_script();
        log::debug!("input {input_index} signed (legacy)");
    }
    Ok(())
}

fn sign_segwit_v0(
    tx: &mut Transaction,
    plan: &TransactionPlan,
    key: &PrivateKey,
    scheme: SigningScheme,
    secp: &Secp256k1<All>,
) -> Result<(), AppError> {
    let pubkey = key.public_key(secp);
    let compressed = compressed(&pubkey)?;
    // Script code for the BIP143 digest; doubles as the redeem script on
    // the wrapped path.
    let script_code = ScriptBuf::new_p2wpkh(&compressed.wpubkey_hash());

    let mut witnesses = Vec::with_capacity(tx.input.len());
    {
        let mut cache = SighashCache::new(&*tx);
        for (input_index, utxo) in plan.selected_inputs.iter().enumerate() {
            let sighash = cache
                .p2wpkh_signature_hash(
                    input_index,
                    &script_code,
                    Amount::from_sat(utxo.value_sats),
                    EcdsaSighashType::All,
                )
                .map_err(|e| sighash_failure(input_index, e))?;
            let message = Message::from_digest(sighash.to_byte_array());
            let signature = bitcoin::ecdsa::Signature {
                signature: secp.sign_ecdsa(&message, &key.inner),
                sighash_type: EcdsaSighashType::All,
            };
            witnesses.push(Witness::p2wpkh(&signature, &pubkey.inner));
        }
    }

    for (input_index, witness) in witnesses.into_iter().enumerate() {
        tx.input[input_index].witness = witness;
        if scheme == SigningScheme::WrappedSegwit {
            let redeem_push = PushBytesBuf::try_from(script_code.to_bytes()).map_err(|_| {
                AppError::SigningFailure(format!("redeem script encoding for input {input_index}"))
            })?;
            tx.input[input_index].script_sig = Builder::new().push_slice(redeem_push).into_script();
        }
        log::debug!("input {input_index} signed ({scheme:?})");
    }
    Ok(())
}

fn sign_taproot(
    tx: &mut Transaction,
    plan: &TransactionPlan,
    key: &PrivateKey,
    source: &Address,
    secp: &Secp256k1<All>,
) -> Result<(), AppError> {
    let keypair = Keypair::from_secret_key(secp, &key.inner);
    let tweaked = keypair.tap_tweak(secp, None);
    let script_pubkey = source.script_pubkey();

    let prevouts: Vec<TxOut> = plan
        .selected_inputs
        .iter()
        .map(|utxo| TxOut {
            value: Amount::from_sat(utxo.value_sats),
            script_pubkey: script_pubkey.clone(),
        })
        .collect();
    let prevouts = Prevouts::All(&prevouts);

    let mut witnesses = Vec::with_capacity(tx.input.len());
    {
        let mut cache = SighashCache::new(&*tx);
        for input_index in 0..plan.selected_inputs.len() {
            let sighash = cache
                .taproot_key_spend_signature_hash(input_index, &prevouts, TapSighashType::Default)
                .map_err(|e| sighash_failure(input_index, e))?;
            let message = Message::from_digest(sighash.to_byte_array());
            let signature = bitcoin::taproot::Signature {
                signature: secp.sign_schnorr_no_aux_rand(&message, &tweaked.to_inner()),
                sighash_type: TapSighashType::Default,
            };
            witnesses.push(Witness::p2tr_key_spend(&signature));
        }
    }

    for (input_index, witness) in witnesses.into_iter().enumerate() {
        tx.input[input_index].witness = witness;
        log::debug!("input {input_index} signed (taproot key spend)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UnspentOutput;
    use bitcoin::secp256k1::SecretKey;

    const ZERO_TXID: &str = "0000000000000000000000000000000000000000000000000000000000000000";
    const TARGET: &str = "bc1q7cyrfmck2ffu2ud3rn5l5a8yv6f0chkp0zpemf";

    fn test_key(byte: u8) -> PrivateKey {
        PrivateKey::new(
            SecretKey::from_slice(&[byte; 32]).unwrap(),
            Network::Bitcoin,
        )
    }

    fn plan_for(source: &Address, inputs: Vec<UnspentOutput>, send: u64, fee: u64) -> TransactionPlan {
        let total: u64 = inputs.iter().map(|u| u.value_sats).sum();
        TransactionPlan {
            source_address: source.to_string(),
            target_address: TARGET.to_string(),
            total_balance_sats: total,
            send_sats: send,
            fee_sats: fee,
            fee_rate_sats_per_vb: Some(10.0),
            fee_usd: 1.5,
            estimated_size_vbytes: 192,
            selected_inputs: inputs,
            change_sats: total - send - fee,
        }
    }

    fn single_input(value_sats: u64) -> Vec<UnspentOutput> {
        vec![UnspentOutput {
            txid: ZERO_TXID.to_string(),
            vout: 0,
            value_sats,
        }]
    }

    fn decode(raw_hex: &str) -> Transaction {
        bitcoin::consensus::encode::deserialize(&hex::decode(raw_hex).unwrap()).unwrap()
    }

    #[test]
    fn scheme_follows_address_structure() {
        let secp = Secp256k1::new();
        let key = test_key(1);
        let genesis = parse_checked_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", Network::Bitcoin)
            .unwrap();
        assert_eq!(scheme_for_address(&genesis).unwrap(), SigningScheme::Legacy);

        let native = derived_address_for(SigningScheme::NativeSegwit, &key, Network::Bitcoin, &secp)
            .unwrap();
        assert_eq!(scheme_for_address(&native).unwrap(), SigningScheme::NativeSegwit);

        let wrapped =
            derived_address_for(SigningScheme::WrappedSegwit, &key, Network::Bitcoin, &secp)
                .unwrap();
        assert_eq!(scheme_for_address(&wrapped).unwrap(), SigningScheme::WrappedSegwit);

        let taproot = derived_address_for(SigningScheme::Taproot, &key, Network::Bitcoin, &secp)
            .unwrap();
        assert_eq!(scheme_for_address(&taproot).unwrap(), SigningScheme::Taproot);
    }

    #[test]
    fn classify_distinguishes_wif_from_address() {
        let secp = Secp256k1::new();
        let wif = test_key(7).to_wif();
        match classify_funding(&wif, Network::Bitcoin, &secp).unwrap() {
            FundingSource::Credential { key, address } => {
                assert_eq!(address, Address::p2pkh(&key.public_key(&secp), Network::Bitcoin));
            }
            other => panic!("expected credential, got {other:?}"),
        }

        match classify_funding(TARGET, Network::Bitcoin, &secp).unwrap() {
            FundingSource::Watch(address) => assert_eq!(address.to_string(), TARGET),
            other => panic!("expected watch address, got {other:?}"),
        }

        assert!(classify_funding("not-a-key-or-address", Network::Bitcoin, &secp).is_err());
    }

    #[test]
    fn unsigned_tx_mirrors_the_plan() {
        let secp = Secp256k1::new();
        let source = Address::p2pkh(&test_key(2).public_key(&secp), Network::Bitcoin);
        let plan = plan_for(&source, single_input(100_000), 60_000, 1_000);
        let tx = build_unsigned(&plan, Network::Bitcoin).unwrap();

        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.input[0].sequence, Sequence::MAX);
        assert!(tx.input[0].script_sig.is_empty());
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[0].value, Amount::from_sat(60_000));
        assert_eq!(tx.output[1].value, Amount::from_sat(39_000));
        assert_eq!(tx.output[1].script_pubkey, source.script_pubkey());
    }

    #[test]
    fn legacy_sign_fills_script_sigs_without_touching_amounts() {
        let secp = Secp256k1::new();
        let key = test_key(3);
        let source = Address::p2pkh(&key.public_key(&secp), Network::Bitcoin);
        let plan = plan_for(&source, single_input(100_000), 97_740, 2_260);

        let signed = sign_plan(&plan, &key, Network::Bitcoin, &secp).unwrap();
        assert_eq!(signed.send_sats, 97_740);
        assert_eq!(signed.fee_sats, 2_260);
        assert_eq!(signed.change_sats, 0);

        let tx = decode(&signed.raw_hex);
        assert_eq!(tx.output.len(), 1);
        assert_eq!(tx.output[0].value, Amount::from_sat(97_740));
        assert!(!tx.input[0].script_sig.is_empty());
        assert!(tx.input[0].witness.is_empty());
    }

    #[test]
    fn native_segwit_sign_fills_two_item_witness() {
        let secp = Secp256k1::new();
        let key = test_key(4);
        let source =
            derived_address_for(SigningScheme::NativeSegwit, &key, Network::Bitcoin, &secp).unwrap();
        let plan = plan_for(&source, single_input(50_000), 30_000, 1_500);

        let signed = sign_plan(&plan, &key, Network::Bitcoin, &secp).unwrap();
        let tx = decode(&signed.raw_hex);
        assert!(tx.input[0].script_sig.is_empty());
        assert_eq!(tx.input[0].witness.len(), 2);
        assert_eq!(tx.output.len(), 2);
    }

    #[test]
    fn wrapped_segwit_sign_sets_redeem_script_and_witness() {
        let secp = Secp256k1::new();
        let key = test_key(5);
        let source =
            derived_address_for(SigningScheme::WrappedSegwit, &key, Network::Bitcoin, &secp)
                .unwrap();
        let plan = plan_for(&source, single_input(80_000), 70_000, 2_000);

        let signed = sign_plan(&plan, &key, Network::Bitcoin, &secp).unwrap();
        let tx = decode(&signed.raw_hex);
        assert!(!tx.input[0].script_sig.is_empty());
        assert_eq!(tx.input[0].witness.len(), 2);
    }

    #[test]
    fn taproot_sign_produces_key_spend_witness() {
        let secp = Secp256k1::new();
        let key = test_key(6);
        let source =
            derived_address_for(SigningScheme::Taproot, &key, Network::Bitcoin, &secp).unwrap();
        let plan = plan_for(&source, single_input(40_000), 38_000, 2_000);

        let signed = sign_plan(&plan, &key, Network::Bitcoin, &secp).unwrap();
        let tx = decode(&signed.raw_hex);
        assert!(tx.input[0].script_sig.is_empty());
        assert_eq!(tx.input[0].witness.len(), 1);
        // Default sighash type serializes as a bare 64-byte signature.
        assert_eq!(tx.input[0].witness.iter().next().unwrap().len(), 64);
    }

    #[test]
    fn foreign_credential_is_rejected() {
        let secp = Secp256k1::new();
        let source = Address::p2pkh(&test_key(8).public_key(&secp), Network::Bitcoin);
        let plan = plan_for(&source, single_input(10_000), 9_000, 500);
        let wrong_key = test_key(9);
        let err = sign_plan(&plan, &wrong_key, Network::Bitcoin, &secp).unwrap_err();
        assert!(matches!(err, AppError::SigningFailure(_)));
    }

    #[test]
    fn network_mismatch_is_rejected_before_signing() {
        let secp = Secp256k1::new();
        let key = test_key(10);
        let source = Address::p2pkh(&key.public_key(&secp), Network::Bitcoin);
        let plan = plan_for(&source, single_input(10_000), 9_000, 500);
        let testnet_key = PrivateKey::new(key.inner, Network::Testnet);
        let err = sign_plan(&plan, &testnet_key, Network::Bitcoin, &secp).unwrap_err();
        assert!(matches!(err, AppError::NetworkMismatch { .. }));
    }
}
