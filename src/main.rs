use bitcoin::PrivateKey;
use bitcoin::consensus::encode;
use bitcoin::secp256k1::{All, Secp256k1};
use clap::Parser;

mod bundle;
mod cli;
mod error;
mod fee;
mod oracle;
mod plan;
mod select;
mod signing;
mod types;
mod utxo;

use bundle::UnsignedBundle;
use cli::{CliArgs, Command, PrepareArgs, SignArgs, network_name, parse_fee_source, parse_network};
use error::AppError;
use fee::FeePolicy;
use oracle::HttpFeeOracle;
use signing::FundingSource;
use types::TransactionPlan;

fn main() -> Result<(), AppError> {
    env_logger::init();

    let args = CliArgs::parse();
    log::info!("starting with arguments: {:?}", args.command);

    match args.command {
        Command::Prepare(prepare_args) => run_prepare(prepare_args),
        Command::Sign(sign_args) => run_sign(sign_args),
    }
}

fn run_prepare(args: PrepareArgs) -> Result<(), AppError> {
    let network = parse_network(&args.network)?;
    let fee_source = parse_fee_source(&args.fee_source)?;
    if args.send_sats == Some(0) {
        return Err(AppError::InputValidation(
            "send amount must be positive".to_string(),
        ));
    }

    let secp: Secp256k1<All> = Secp256k1::new();
    let target = signing::parse_checked_address(&args.target_address, network)?;
    let funding = signing::classify_funding(&args.key_or_address, network, &secp)?;
    let source_address = funding.address().to_string();

    let utxos = utxo::fetch_utxos(&source_address, network)?;
    let total_balance: u64 = utxos.iter().map(|u| u.value_sats).sum();

    let policy = FeePolicy::from_overrides(args.fee_usd, args.fee_rate, fee_source);
    let oracle = HttpFeeOracle::new()?;
    // Pre-selection assumption: every UTXO spent, change output only
    // when an explicit amount was given (send-all never has change).
    let assumed_outputs = if args.send_sats.is_some() { 2 } else { 1 };
    let resolved = fee::resolve_fee(policy, &oracle, utxos.len(), assumed_outputs)?;

    let send_sats = plan::resolve_send_amount(total_balance, args.send_sats, resolved.fee_sats)?;
    let plan = plan::assemble_plan(
        &source_address,
        &target.to_string(),
        send_sats,
        &resolved,
        &utxos,
    )?;

    match funding {
        FundingSource::Credential { key, .. } => {
            let signed = signing::sign_plan(&plan, &key, network, &secp)?;
            print_details(&plan, &signed.raw_hex);
        }
        FundingSource::Watch(_) => {
            let unsigned = signing::build_unsigned(&plan, network)?;
            let bundle = UnsignedBundle {
                network: network_name(network).to_string(),
                plan,
                unsigned_tx_hex: encode::serialize_hex(&unsigned),
            };
            bundle.write(&args.bundle_file)?;
            println!(
                "Unsigned transaction bundle written to {}",
                args.bundle_file.display()
            );
            println!(
                "Sign later with: bitcoin-payment-cli sign --bundle-file {} --private-key <WIF>",
                args.bundle_file.display()
            );
        }
    }
    Ok(())
}

fn run_sign(args: SignArgs) -> Result<(), AppError> {
    let bundle = UnsignedBundle::load(&args.bundle_file)?;
    let network = parse_network(&bundle.network)?;

    let secp: Secp256k1<All> = Secp256k1::new();
    let key = PrivateKey::from_wif(&args.private_key)?;

    let signed = signing::sign_plan(&bundle.plan, &key, network, &secp)?;
    print_details(&bundle.plan, &signed.raw_hex);
    Ok(())
}

const SATS_PER_BTC: f64 = 1e8;

fn print_details(plan: &TransactionPlan, raw_hex: &str) {
    println!("=== Transaction Details ===");
    println!("Source Address        : {}", plan.source_address);
    println!(
        "Explorer Link (Source): https://www.blockchain.com/btc/address/{}",
        plan.source_address
    );
    println!("Target Address        : {}", plan.target_address);
    println!(
        "Explorer Link (Target): https://www.blockchain.com/btc/address/{}",
        plan.target_address
    );
    println!(
        "Total Balance         : {:.8} BTC",
        plan.total_balance_sats as f64 / SATS_PER_BTC
    );
    println!(
        "Send Amount           : {} sats ({:.8} BTC)",
        plan.send_sats,
        plan.send_sats as f64 / SATS_PER_BTC
    );
    if plan.change_sats > 0 {
        println!(
            "Change Amount         : {} sats ({:.8} BTC)",
            plan.change_sats,
            plan.change_sats as f64 / SATS_PER_BTC
        );
    }
    println!(
        "Estimated Size        : {} vBytes",
        plan.estimated_size_vbytes
    );
    if let Some(rate) = plan.fee_rate_sats_per_vb {
        println!("Fee Rate              : {rate} sats/vByte");
    }
    println!(
        "Fee                   : {} sats (~${:.2})",
        plan.fee_sats, plan.fee_usd
    );
    println!("\nRaw Transaction Hex:");
    println!("{raw_hex}");
}
