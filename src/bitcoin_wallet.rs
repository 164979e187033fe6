use std::cmp::Reverse;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use bdk::bitcoin::bip32::ExtendedPrivKey;
use bdk::bitcoin::{Address, Amount, Denomination, Network, Transaction, Txid};
use bdk::database::MemoryDatabase;
use bdk::keys::bip39::{Language, Mnemonic, WordCount};
use bdk::keys::{DerivableKey, ExtendedKey, GeneratableKey, GeneratedKey};
use bdk::template::Bip84;
use bdk::wallet::{AddressIndex, Wallet};
use bdk::{KeychainKind, SignOptions, TransactionDetails};

const SATS_PER_BTC: u64 = 100_000_000;

pub fn generate_mnemonic_string() -> anyhow::Result<String> {
    let mnemonic: GeneratedKey<Mnemonic, bdk::descriptor::Segwitv0> =
        Mnemonic::generate((WordCount::Words12, Language::English))
            .map_err(|e| anyhow!("failed to generate mnemonic: {e:?}"))?;
    Ok(mnemonic.to_string())
}

pub fn generate_xpriv(mnemonic: &str, network: Network) -> anyhow::Result<ExtendedPrivKey> {
    let mnemonic = Mnemonic::parse(mnemonic).map_err(|e| anyhow!("invalid mnemonic: {e}"))?;
    let xkey: ExtendedKey = mnemonic
        .into_extended_key()
        .map_err(|e| anyhow!("failed to derive extended key: {e:?}"))?;
    xkey.into_xprv(network)
        .ok_or_else(|| anyhow!("mnemonic did not yield a private key"))
}

pub fn generate_wallet(priv_key: &str, network: Network) -> anyhow::Result<Wallet<MemoryDatabase>> {
    let xpriv = ExtendedPrivKey::from_str(priv_key)?;
    let wallet = Wallet::new(
        Bip84(xpriv, KeychainKind::External),
        Some(Bip84(xpriv, KeychainKind::Internal)),
        network,
        MemoryDatabase::new(),
    )?;
    Ok(wallet)
}

/// First external address; stable for a given key, no network needed.
pub fn receive_address(wallet: &Wallet<MemoryDatabase>) -> anyhow::Result<String> {
    Ok(wallet.get_address(AddressIndex::Peek(0))?.to_string())
}

pub fn format_btc(sats: u64) -> String {
    format!("{}.{:08}", sats / SATS_PER_BTC, sats % SATS_PER_BTC)
}

pub fn format_signed_btc(sats: i64) -> String {
    let sign = if sats < 0 { "-" } else { "" };
    format!("{sign}{}", format_btc(sats.unsigned_abs()))
}

/// Net effect of a transaction on the wallet, in sats.
pub fn transaction_total(details: &TransactionDetails) -> i64 {
    details.received as i64 - details.sent as i64
}

/// Address paid by the first output. Any standard script is decoded, so
/// segwit outputs resolve as well as P2PKH.
pub fn first_output_address(transaction: &Transaction, network: Network) -> Option<Address> {
    let output = transaction.output.first()?;
    Address::from_script(&output.script_pubkey, network).ok()
}

/// One-line description of a transaction as seen by the local wallet.
pub fn transaction_summary(
    amount: i64,
    transaction: Option<&Transaction>,
    txid: &Txid,
    network: Network,
) -> String {
    if amount > 0 {
        return format!("Incoming payment of {}", format_signed_btc(amount));
    }
    if amount < 0 {
        if let Some(address) = transaction.and_then(|tx| first_output_address(tx, network)) {
            return format!("Outbound payment to {address}");
        }
    }
    format!("payment with id {txid}")
}

pub fn describe_transaction(details: &TransactionDetails, network: Network) -> String {
    transaction_summary(
        transaction_total(details),
        details.transaction.as_ref(),
        &details.txid,
        network,
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub recipient: Address,
    pub amount: u64,
}

/// Checks a send request typed by the user. Every problem found is reported,
/// not just the first. `amount` is in BTC.
pub fn validate_payment(
    recipient: &str,
    amount: &str,
    network: Network,
    own_address: &str,
    available: u64,
) -> Result<PaymentRequest, Vec<String>> {
    let mut problems = Vec::new();
    let recipient = recipient.trim();

    let address = match Address::from_str(recipient) {
        Ok(address) => match address.require_network(network) {
            Ok(address) => Some(address),
            Err(_) => {
                problems.push(format!("Address is not valid on {network}"));
                None
            }
        },
        Err(_) => {
            problems.push("Invalid Bitcoin Address".to_string());
            None
        }
    };
    if recipient == own_address {
        problems.push("Can't send to own address".to_string());
    }

    let amount = match Amount::from_str_in(amount.trim(), Denomination::Bitcoin) {
        Ok(amount) if amount == Amount::ZERO => {
            problems.push("Amount must be more than zero".to_string());
            None
        }
        Ok(amount) if amount.to_sat() > available => {
            problems.push("Insufficient funds in wallet for requested transaction".to_string());
            None
        }
        Ok(amount) => Some(amount.to_sat()),
        Err(_) => {
            problems.push("Amount needs to be a number of BTC".to_string());
            None
        }
    };

    match (address, amount) {
        (Some(recipient), Some(amount)) if problems.is_empty() => {
            Ok(PaymentRequest { recipient, amount })
        }
        _ => Err(problems),
    }
}

/// Builds and signs a payment. Broadcasting is left to the caller.
pub fn make_transaction(
    wallet: &Wallet<MemoryDatabase>,
    payment: &PaymentRequest,
) -> anyhow::Result<Transaction> {
    let mut tx_builder = wallet.build_tx();
    tx_builder
        .add_recipient(payment.recipient.script_pubkey(), payment.amount)
        .enable_rbf();
    let (mut psbt, _details) = tx_builder.finish()?;
    if !wallet.sign(&mut psbt, SignOptions::default())? {
        bail!("transaction could not be fully signed");
    }
    Ok(psbt.extract_tx())
}

/// Unconfirmed first, then newest confirmation first.
pub fn sort_transactions(transactions: &mut [TransactionDetails]) {
    transactions.sort_by_key(|tx| {
        Reverse(
            tx.confirmation_time
                .as_ref()
                .map_or(u64::MAX, |time| time.timestamp),
        )
    });
}
