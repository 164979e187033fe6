mod app_centrepanel;
mod app_toppanel;

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::anyhow;
use bdk::bitcoin::Txid;
use bdk::{Balance, TransactionDetails};
use log::error;
use qrcode_generator::QrCodeEcc;

use crate::bitcoin_wallet::{format_btc, validate_payment, PaymentRequest};
use crate::launch_config::LaunchConfig;
use crate::logging::{read_log_tail, LOG_FILE, LOG_TAIL_LINES};
use crate::notification_bar::{NotificationBar, ANIM_OUT_DURATION};
use crate::progress_coordinator::{
    Animations, ProgressCoordinator, ProgressEvent, ProgressSink, TorClient,
};
use crate::wallet_file_manager::{WalletCommand, WalletModel, WalletUpdate};

#[derive(Clone)]
pub struct DialogBox {
    pub dialog_box_enum: DialogBoxEnum,
    pub title: &'static str,
    pub message: Option<String>,
    pub line_edit: Option<String>,
    pub amount_edit: Option<String>,
    pub optional: bool,
}

impl DialogBox {
    fn notice(dialog_box_enum: DialogBoxEnum, title: &'static str, message: String) -> Self {
        Self {
            dialog_box_enum,
            title,
            message: Some(message),
            line_edit: None,
            amount_edit: None,
            optional: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DialogBoxEnum {
    NewMnemonic,
    RestoreFromSeed,
    SendMoney,
    ConfirmSend,
    PaymentSent,
    ShowLog,
    Error,
}

/// Visibility targets for the controls box and the receive address. The
/// panels ease towards them; this only decides when they flip.
#[derive(Default)]
pub struct ControlsAnimation {
    controls_visible: bool,
    address_visible: bool,
    reveal_at: Option<Instant>,
}

impl ControlsAnimation {
    /// Applies a pending reveal once its delay has passed. Returns true while
    /// one is still pending.
    pub fn update(&mut self, now: Instant) -> bool {
        match self.reveal_at {
            Some(at) if now >= at => {
                self.controls_visible = true;
                self.address_visible = true;
                self.reveal_at = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn controls_visible(&self) -> bool {
        self.controls_visible
    }

    pub fn address_visible(&self) -> bool {
        self.address_visible
    }
}

impl Animations for ControlsAnimation {
    fn ready_to_go(&mut self) {
        // Wait for the notification bar to clear first.
        self.reveal_at = Some(Instant::now() + ANIM_OUT_DURATION);
    }

    fn restore_from_seed(&mut self) {
        self.reveal_at = None;
        self.controls_visible = false;
    }
}

/// One run of sync against the current key. Dropping it stops the worker.
struct WalletSession {
    coordinator: ProgressCoordinator,
    progress_receiver: Receiver<ProgressEvent>,
    update_receiver: Receiver<WalletUpdate>,
    command_sender: Sender<WalletCommand>,
    _worker: Option<JoinHandle<()>>,
}

pub struct WalletApp {
    config: LaunchConfig,
    egui_ctx: egui::Context,
    wallet_model: WalletModel,
    tor_client: Option<Box<dyn TorClient>>,
    tor_subscribed: bool,
    session: Option<WalletSession>,
    notification_bar: NotificationBar,
    animations: ControlsAnimation,
    balance: Option<Balance>,
    transactions: Vec<TransactionDetails>,
    address_texture: Option<egui::TextureHandle>,
    dialog_box: Option<DialogBox>,
    pending_payment: Option<PaymentRequest>,
}

impl WalletApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: LaunchConfig,
        wallet_model: WalletModel,
        new_mnemonic: Option<String>,
        tor_client: Option<Box<dyn TorClient>>,
    ) -> Self {
        let dialog_box = new_mnemonic.map(|mnemonic| {
            DialogBox::notice(
                DialogBoxEnum::NewMnemonic,
                "New Wallet Mnemonic",
                format!(
                    "Write down these words, they are the only way to restore this wallet:\n\n{mnemonic}"
                ),
            )
        });

        let mut slf = Self {
            config,
            egui_ctx: cc.egui_ctx.clone(),
            wallet_model,
            tor_client,
            tor_subscribed: false,
            session: None,
            notification_bar: NotificationBar::new(),
            animations: ControlsAnimation::default(),
            balance: None,
            transactions: Vec::new(),
            address_texture: None,
            dialog_box,
            pending_payment: None,
        };
        slf.start_session();
        slf
    }

    fn start_session(&mut self) {
        let (progress_sender, progress_receiver) = mpsc::channel();
        let (update_sender, update_receiver) = mpsc::channel();
        let (command_sender, command_receiver) = mpsc::channel();
        let sink = ProgressSink::new(progress_sender, Some(self.egui_ctx.clone()));

        // Tor only bootstraps once per process; later sessions don't wait on it.
        let tor_configured = match self.tor_client.as_mut() {
            Some(tor_client) if !self.tor_subscribed => {
                tor_client.add_initialization_listener(sink.clone());
                self.tor_subscribed = true;
                true
            }
            _ => false,
        };

        self.address_texture = match generate_qrcode_from_address(self.wallet_model.address()) {
            Ok(image) => Some(
                self.egui_ctx
                    .load_texture("address-qr", image, Default::default()),
            ),
            Err(e) => {
                error!("failed to render address QR code: {e:#}");
                None
            }
        };

        let mut coordinator = ProgressCoordinator::new();
        coordinator.start(tor_configured, &mut self.notification_bar);

        let worker = match self.wallet_model.start_wallet_syncing_worker(
            self.config.electrum_url(),
            sink,
            update_sender,
            command_receiver,
        ) {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("failed to start wallet sync: {e:#}");
                self.show_error(format!("Failed to start wallet sync: {e}"));
                None
            }
        };

        self.session = Some(WalletSession {
            coordinator,
            progress_receiver,
            update_receiver,
            command_sender,
            _worker: worker,
        });
    }

    fn poll_session(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.coordinator.drain(
            &session.progress_receiver,
            &mut self.notification_bar,
            &mut self.animations,
        );
        let updates: Vec<WalletUpdate> = session.update_receiver.try_iter().collect();
        for update in updates {
            match update {
                WalletUpdate::Synced(sync_data) => {
                    self.balance = Some(sync_data.balance);
                    self.transactions = sync_data.transactions;
                }
                WalletUpdate::Sent(txid) => self.show_payment_sent(txid),
                WalletUpdate::SendFailed(message) => {
                    self.show_error(format!("Payment failed: {message}"))
                }
            }
        }
    }

    pub fn can_send(&self) -> bool {
        sending_allowed(self.balance.as_ref())
    }

    pub fn open_send_dialog(&mut self) {
        self.dialog_box = Some(DialogBox {
            dialog_box_enum: DialogBoxEnum::SendMoney,
            title: "Send money out",
            message: Some("Recipient address, then the amount in BTC".to_string()),
            line_edit: Some(String::new()),
            amount_edit: Some(String::new()),
            optional: true,
        });
    }

    pub fn open_log_dialog(&mut self) {
        let path = self.config.data_dir.join(LOG_FILE);
        match read_log_tail(&path, LOG_TAIL_LINES) {
            Ok(contents) => {
                let mut dialog_box =
                    DialogBox::notice(DialogBoxEnum::ShowLog, "Session log", contents);
                dialog_box.optional = true;
                self.dialog_box = Some(dialog_box);
            }
            Err(e) => {
                error!("cannot show log: {e:#}");
                self.show_error(format!("Cannot show log: {e}"));
            }
        }
    }

    fn review_payment(&mut self, recipient: &str, amount: &str) {
        let available = self
            .balance
            .as_ref()
            .map_or(0, |balance| balance.get_spendable());
        match validate_payment(
            recipient,
            amount,
            self.wallet_model.network().bitcoin_network(),
            self.wallet_model.address(),
            available,
        ) {
            Ok(payment) => {
                let mut dialog_box = DialogBox::notice(
                    DialogBoxEnum::ConfirmSend,
                    "Confirm payment",
                    format!(
                        "Are you sure you want to send {} BTC to {}?",
                        format_btc(payment.amount),
                        payment.recipient
                    ),
                );
                dialog_box.optional = true;
                self.pending_payment = Some(payment);
                self.dialog_box = Some(dialog_box);
            }
            Err(problems) => self.show_error(problems.join("\n")),
        }
    }

    fn send_pending_payment(&mut self) {
        let Some(payment) = self.pending_payment.take() else {
            return;
        };
        let delivered = self
            .session
            .as_ref()
            .is_some_and(|session| session.command_sender.send(WalletCommand::Send(payment)).is_ok());
        if !delivered {
            self.show_error("Payment failed: the wallet is not connected".to_string());
        }
    }

    fn show_payment_sent(&mut self, txid: Txid) {
        self.dialog_box = Some(DialogBox::notice(
            DialogBoxEnum::PaymentSent,
            "Payment sent",
            format!("Transaction {txid} was broadcast"),
        ));
    }

    fn restore_from_seed(&mut self, mnemonic: &str) {
        if let Err(e) = self.wallet_model.restore_from_mnemonic(mnemonic.trim()) {
            error!("restore from seed failed: {e:#}");
            self.show_error(format!("Could not restore wallet: {e}"));
            return;
        }
        if let Some(session) = &self.session {
            session.coordinator.restore_from_seed(&mut self.animations);
        }
        self.session = None;
        self.balance = None;
        self.transactions.clear();
        self.start_session();
    }

    // A freshly generated mnemonic must stay on screen; the error is already logged.
    fn show_error(&mut self, message: String) {
        if self
            .dialog_box
            .as_ref()
            .is_some_and(|d| d.dialog_box_enum == DialogBoxEnum::NewMnemonic)
        {
            return;
        }
        self.dialog_box = Some(DialogBox::notice(DialogBoxEnum::Error, "Error", message));
    }

    fn accept_process(&mut self, dialog_box: DialogBox) {
        match dialog_box.dialog_box_enum {
            DialogBoxEnum::RestoreFromSeed => {
                let mnemonic = dialog_box.line_edit.unwrap_or_default();
                self.restore_from_seed(&mnemonic);
            }
            DialogBoxEnum::SendMoney => {
                let recipient = dialog_box.line_edit.unwrap_or_default();
                let amount = dialog_box.amount_edit.unwrap_or_default();
                self.review_payment(&recipient, &amount);
            }
            DialogBoxEnum::ConfirmSend => self.send_pending_payment(),
            DialogBoxEnum::NewMnemonic
            | DialogBoxEnum::PaymentSent
            | DialogBoxEnum::ShowLog
            | DialogBoxEnum::Error => {}
        }
    }

    fn render_dialog_box(&mut self, ctx: &egui::Context) {
        let Some(dialog_box) = self.dialog_box.as_mut() else {
            return;
        };
        let single_line = dialog_box.dialog_box_enum == DialogBoxEnum::SendMoney;
        let mut accepted = false;
        let mut cancelled = false;
        egui::Window::new(dialog_box.title)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                if let Some(message) = &dialog_box.message {
                    egui::ScrollArea::vertical()
                        .max_height(320.0)
                        .show(ui, |ui| {
                            ui.vertical_centered(|ui| {
                                ui.label(message.as_str());
                            });
                        });
                }
                if let Some(line_edit) = &mut dialog_box.line_edit {
                    ui.vertical_centered(|ui| {
                        if single_line {
                            ui.text_edit_singleline(line_edit);
                        } else {
                            ui.text_edit_multiline(line_edit);
                        }
                    });
                }
                if let Some(amount_edit) = &mut dialog_box.amount_edit {
                    ui.vertical_centered(|ui| {
                        ui.text_edit_singleline(amount_edit);
                    });
                }
                ui.vertical_centered(|ui| {
                    if dialog_box.optional && ui.button("Cancel").clicked() {
                        cancelled = true;
                    }
                    if ui.button("Accept").clicked() {
                        accepted = true;
                    }
                });
            });

        if accepted {
            if let Some(dialog_box) = self.dialog_box.take() {
                self.accept_process(dialog_box);
            }
        } else if cancelled {
            self.dialog_box = None;
            self.pending_payment = None;
        }
    }
}

impl eframe::App for WalletApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_session();
        if self.animations.update(Instant::now()) {
            ctx.request_repaint_after(ANIM_OUT_DURATION);
        }

        let enabled = self.dialog_box.is_none();
        self.render_toppanel(enabled, ctx, _frame);
        self.notification_bar.render(ctx);
        self.render_controls_box(enabled, ctx);
        self.render_centrepanel(enabled, ctx, _frame);

        if self.dialog_box.is_some() {
            self.render_dialog_box(ctx);
        }
    }
}

/// Sending is offered only once there is something to send.
fn sending_allowed(balance: Option<&Balance>) -> bool {
    balance.is_some_and(|balance| balance.get_total() > 0)
}

pub fn generate_qrcode_from_address(address: &str) -> anyhow::Result<egui::ColorImage> {
    let result = qrcode_generator::to_png_to_vec(address, QrCodeEcc::Medium, 160)
        .map_err(|e| anyhow!("failed to encode address as QR code: {e:?}"))?;
    let dynamic_image = image::load_from_memory(&result)?;
    let size = [dynamic_image.width() as _, dynamic_image.height() as _];
    let image_buffer = dynamic_image.to_luma8();
    let pixels = image_buffer.as_flat_samples();
    Ok(egui::ColorImage::from_gray(size, pixels.as_slice()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn controls_hidden_until_ready() {
        let animations = ControlsAnimation::default();
        assert!(!animations.controls_visible());
        assert!(!animations.address_visible());
    }

    #[test]
    fn ready_reveals_after_bar_clears() {
        let mut animations = ControlsAnimation::default();
        animations.ready_to_go();
        assert!(animations.update(Instant::now()));
        assert!(!animations.controls_visible());

        assert!(!animations.update(Instant::now() + ANIM_OUT_DURATION + Duration::from_millis(1)));
        assert!(animations.controls_visible());
        assert!(animations.address_visible());
    }

    #[test]
    fn restore_slides_controls_out_only() {
        let mut animations = ControlsAnimation::default();
        animations.ready_to_go();
        animations.update(Instant::now() + ANIM_OUT_DURATION * 2);

        animations.restore_from_seed();
        assert!(!animations.controls_visible());
        assert!(animations.address_visible());
    }

    #[test]
    fn restore_cancels_pending_reveal() {
        let mut animations = ControlsAnimation::default();
        animations.ready_to_go();
        animations.restore_from_seed();
        assert!(!animations.update(Instant::now() + ANIM_OUT_DURATION * 2));
        assert!(!animations.controls_visible());
    }

    fn balance(confirmed: u64, untrusted_pending: u64) -> Balance {
        Balance {
            immature: 0,
            trusted_pending: 0,
            untrusted_pending,
            confirmed,
        }
    }

    #[test]
    fn sending_needs_a_known_non_zero_balance() {
        assert!(!sending_allowed(None));
        assert!(!sending_allowed(Some(&balance(0, 0))));
        assert!(sending_allowed(Some(&balance(1_000, 0))));
        assert!(sending_allowed(Some(&balance(0, 1_000))));
    }

    #[test]
    fn address_qr_code_is_square() {
        let image = generate_qrcode_from_address("tb1qw2c3lxufxqe2x9s4rdzh65tpf4d7fssjgh8nv6").unwrap();
        assert_eq!(image.size[0], image.size[1]);
        assert!(image.size[0] > 0);
    }
}
