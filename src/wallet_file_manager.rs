use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{bail, Context};
use bdk::bitcoin::Txid;
use bdk::blockchain::{Blockchain, ElectrumBlockchain, Progress};
use bdk::database::MemoryDatabase;
use bdk::electrum_client::Client;
use bdk::wallet::Wallet;
use bdk::{Balance, SyncOptions, TransactionDetails};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::bitcoin_wallet::{
    generate_mnemonic_string, generate_wallet, generate_xpriv, make_transaction, receive_address,
    sort_transactions, PaymentRequest,
};
use crate::launch_config::{LaunchConfig, NetworkId};
use crate::progress_coordinator::ProgressSink;

pub const WALLET_FILE: &str = "wallet.json";
const DEFAULT_WALLET_NAME: &str = "My Wallet";
const RESYNC_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JsonWallet {
    pub network: NetworkId,
    pub priv_key: String,
    pub pub_key: String,
    pub wallet_name: String,
}

pub struct SyncData {
    pub balance: Balance,
    pub transactions: Vec<TransactionDetails>,
}

/// Requests handled on the sync worker, which owns the wallet.
pub enum WalletCommand {
    Send(PaymentRequest),
}

pub enum WalletUpdate {
    Synced(SyncData),
    Sent(Txid),
    SendFailed(String),
}

/// The wallet key file kept in the data directory.
pub struct WalletModel {
    filename: PathBuf,
    json_wallet: JsonWallet,
}

impl WalletModel {
    /// Loads `wallet.json` from the data directory, creating it from a fresh
    /// mnemonic on first run. The mnemonic is returned only when one was made.
    pub fn open_or_create(config: &LaunchConfig) -> anyhow::Result<(Self, Option<String>)> {
        let filename = config.data_dir.join(WALLET_FILE);
        if filename.exists() {
            return Ok((Self::load(&filename, config.network)?, None));
        }
        let mnemonic = generate_mnemonic_string()?;
        let model = Self::create_from_mnemonic(&filename, config.network, &mnemonic)?;
        info!("created new wallet at {}", filename.display());
        Ok((model, Some(mnemonic)))
    }

    pub fn load(filename: &Path, network: NetworkId) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(filename)
            .with_context(|| format!("failed to read {}", filename.display()))?;
        let json_wallet: JsonWallet = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", filename.display()))?;
        if json_wallet.network != network {
            bail!(
                "{} belongs to network {}, not {}",
                filename.display(),
                json_wallet.network,
                network
            );
        }
        Ok(Self {
            filename: filename.to_path_buf(),
            json_wallet,
        })
    }

    pub fn create_from_mnemonic(
        filename: &Path,
        network: NetworkId,
        mnemonic: &str,
    ) -> anyhow::Result<Self> {
        let json_wallet = json_wallet_from_mnemonic(network, mnemonic, DEFAULT_WALLET_NAME)?;
        let model = Self {
            filename: filename.to_path_buf(),
            json_wallet,
        };
        model.save()?;
        Ok(model)
    }

    /// Replaces the key with one derived from `mnemonic`. The file is only
    /// rewritten once the mnemonic is known to be valid.
    pub fn restore_from_mnemonic(&mut self, mnemonic: &str) -> anyhow::Result<()> {
        let json_wallet = json_wallet_from_mnemonic(
            self.json_wallet.network,
            mnemonic,
            &self.json_wallet.wallet_name,
        )?;
        self.json_wallet = json_wallet;
        self.save()?;
        info!("restored wallet {}", self.json_wallet.pub_key);
        Ok(())
    }

    pub fn address(&self) -> &str {
        &self.json_wallet.pub_key
    }

    pub fn wallet_name(&self) -> &str {
        &self.json_wallet.wallet_name
    }

    pub fn network(&self) -> NetworkId {
        self.json_wallet.network
    }

    fn save(&self) -> anyhow::Result<()> {
        let json_string = serde_json::to_string_pretty(&self.json_wallet)?;
        fs::write(&self.filename, json_string)
            .with_context(|| format!("failed to write {}", self.filename.display()))?;
        Ok(())
    }

    /// Spawns the thread that syncs against Electrum, reports progress to
    /// `progress` and sends each result on `updates`. It re-syncs every
    /// [`RESYNC_INTERVAL`], and straight after handling a command, until the
    /// `commands` sender is dropped.
    pub fn start_wallet_syncing_worker(
        &self,
        electrum_url: &str,
        progress: ProgressSink,
        updates: Sender<WalletUpdate>,
        commands: Receiver<WalletCommand>,
    ) -> anyhow::Result<JoinHandle<()>> {
        let wallet = generate_wallet(
            &self.json_wallet.priv_key,
            self.json_wallet.network.bitcoin_network(),
        )?;
        let electrum_url = electrum_url.to_string();
        let handle = thread::Builder::new()
            .name("wallet-sync".to_string())
            .spawn(move || loop {
                match sync_once(&wallet, &electrum_url, &progress) {
                    Ok(sync_data) => {
                        if updates.send(WalletUpdate::Synced(sync_data)).is_err() {
                            break;
                        }
                        progress.sync_progress(1.0);
                    }
                    Err(e) => error!("wallet sync failed: {e:#}"),
                }
                match commands.recv_timeout(RESYNC_INTERVAL) {
                    Ok(WalletCommand::Send(payment)) => {
                        let update = match send_payment(&wallet, &electrum_url, &payment) {
                            Ok(txid) => {
                                info!("sent {} sats to {}: {txid}", payment.amount, payment.recipient);
                                WalletUpdate::Sent(txid)
                            }
                            Err(e) => {
                                error!("send failed: {e:#}");
                                WalletUpdate::SendFailed(e.to_string())
                            }
                        };
                        if updates.send(update).is_err() {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        debug!("wallet sync worker stopping");
                        break;
                    }
                }
            })?;
        Ok(handle)
    }
}

fn json_wallet_from_mnemonic(
    network: NetworkId,
    mnemonic: &str,
    wallet_name: &str,
) -> anyhow::Result<JsonWallet> {
    let xpriv = generate_xpriv(mnemonic, network.bitcoin_network())?.to_string();
    let wallet = generate_wallet(&xpriv, network.bitcoin_network())?;
    Ok(JsonWallet {
        network,
        pub_key: receive_address(&wallet)?,
        priv_key: xpriv,
        wallet_name: wallet_name.to_string(),
    })
}

fn connect(electrum_url: &str) -> anyhow::Result<ElectrumBlockchain> {
    let client = Client::new(electrum_url)
        .with_context(|| format!("failed to connect to {electrum_url}"))?;
    Ok(ElectrumBlockchain::from(client))
}

fn send_payment(
    wallet: &Wallet<MemoryDatabase>,
    electrum_url: &str,
    payment: &PaymentRequest,
) -> anyhow::Result<Txid> {
    let transaction = make_transaction(wallet, payment)?;
    connect(electrum_url)?.broadcast(&transaction)?;
    Ok(transaction.txid())
}

fn sync_once(
    wallet: &Wallet<MemoryDatabase>,
    electrum_url: &str,
    progress: &ProgressSink,
) -> anyhow::Result<SyncData> {
    let blockchain = connect(electrum_url)?;
    wallet.sync(
        &blockchain,
        SyncOptions {
            progress: Some(Box::new(SyncProgressReporter(progress.clone()))),
        },
    )?;

    let balance = wallet.get_balance()?;
    let mut transactions = wallet.list_transactions(true)?;
    sort_transactions(&mut transactions);
    info!(
        "synced: {} sats across {} transactions",
        balance.get_total(),
        transactions.len()
    );
    Ok(SyncData {
        balance,
        transactions,
    })
}

/// bdk reports percentages; the coordinator wants fractions. Capped below
/// 1.0 since completion is only reported after the wallet data is sent.
#[derive(Debug)]
struct SyncProgressReporter(ProgressSink);

impl Progress for SyncProgressReporter {
    fn update(&self, progress: f32, message: Option<String>) -> Result<(), bdk::Error> {
        if let Some(message) = message {
            debug!("sync: {message}");
        }
        self.0
            .sync_progress((f64::from(progress) / 100.0).clamp(0.0, 0.99));
        Ok(())
    }
}
