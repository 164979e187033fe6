//! Desktop Bitcoin wallet.
//!
//! Usage: `wallet_template -net <main|test|regtest> -d <data dir> [--electrum <url>]`
//!
//! Logs to stderr and `<data dir>/wallet.log`, `RUST_LOG=debug` for more detail.

mod app;
mod bitcoin_wallet;
mod launch_config;
mod logging;
mod notification_bar;
mod progress_coordinator;
mod wallet_file_manager;

use app::WalletApp;
use eframe::egui;
use launch_config::LaunchConfig;
use wallet_file_manager::WalletModel;

fn main() -> Result<(), eframe::Error> {
    let parsed = LaunchConfig::parse(std::env::args_os());
    let log_path = parsed
        .as_ref()
        .ok()
        .map(|config| config.data_dir.join(logging::LOG_FILE));
    logging::init(log_path.as_deref());

    // Nothing else starts until the launch parameters are valid.
    let config = LaunchConfig::exit_on_error(parsed);

    let (wallet_model, new_mnemonic) = match WalletModel::open_or_create(&config) {
        Ok(opened) => opened,
        Err(e) => {
            log::error!("failed to open wallet: {e:#}");
            std::process::exit(1);
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([900.0, 640.0]),
        ..Default::default()
    };
    let title = format!("Rust Bitcoin Wallet ({})", config.network);
    eframe::run_native(
        &title,
        options,
        Box::new(move |cc| {
            Box::new(WalletApp::new(cc, config, wallet_model, new_mnemonic, None))
        }),
    )
}
