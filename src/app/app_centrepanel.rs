use bdk::TransactionDetails;
use chrono::prelude::*;
use egui::{Color32, RichText, Ui};
use egui_extras::{Column, TableBuilder};

use super::{DialogBox, DialogBoxEnum, WalletApp};
use crate::bitcoin_wallet::{describe_transaction, format_btc, format_signed_btc, transaction_total};

const CONTROLS_HEIGHT: f32 = 80.0;
const TRANSITION_SECS: f32 = 1.2;

impl WalletApp {
    pub fn render_centrepanel(
        &mut self,
        enabled: bool,
        ctx: &egui::Context,
        _frame: &mut eframe::Frame,
    ) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.set_enabled(enabled);
            self.render_balance(ui);
            ui.add_space(10.0);
            self.render_address_control(ui);
            ui.add_space(20.0);
            self.render_transaction_list(ui);
        });
    }

    /// Buttons along the bottom. They slide in on the ready animation and
    /// out again when a restore starts. Sending needs a non-zero balance.
    pub fn render_controls_box(&mut self, enabled: bool, ctx: &egui::Context) {
        let slide = ctx.animate_bool_with_time(
            egui::Id::new("controls_box"),
            self.animations.controls_visible(),
            TRANSITION_SECS,
        );
        if slide <= 0.0 {
            return;
        }
        egui::TopBottomPanel::bottom("controls_box")
            .exact_height(CONTROLS_HEIGHT)
            .show(ctx, |ui| {
                ui.set_enabled(enabled && slide >= 1.0);
                ui.add_space((1.0 - slide) * CONTROLS_HEIGHT + 20.0);
                ui.horizontal(|ui| {
                    let can_send = self.can_send();
                    if ui
                        .add_enabled(can_send, egui::Button::new("Send money out"))
                        .clicked()
                    {
                        self.open_send_dialog();
                    }
                    if ui.button("Restore from seed").clicked() {
                        self.dialog_box = Some(DialogBox {
                            dialog_box_enum: DialogBoxEnum::RestoreFromSeed,
                            title: "Restore from seed",
                            message: Some("Enter the twelve words of the wallet to restore".into()),
                            line_edit: Some(String::new()),
                            amount_edit: None,
                            optional: true,
                        });
                    }
                    if ui.button("Show log").clicked() {
                        self.open_log_dialog();
                    }
                });
            });
    }

    fn render_balance(&self, ui: &mut Ui) {
        let balance = match &self.balance {
            Some(balance) => format!("{} BTC", format_btc(balance.get_total())),
            None => "Balance unknown until synchronised".to_string(),
        };
        ui.heading(balance);
    }

    fn render_address_control(&self, ui: &mut Ui) {
        let reveal = ui.ctx().animate_bool_with_time(
            egui::Id::new("address_control"),
            self.animations.address_visible(),
            TRANSITION_SECS,
        );
        let address = self.wallet_model.address().to_string();
        let text_color = ui.visuals().text_color().gamma_multiply(reveal);

        ui.horizontal(|ui| {
            if let Some(texture) = &self.address_texture {
                ui.add(egui::Image::from_texture(texture).tint(Color32::WHITE.gamma_multiply(reveal)));
            }
            let response = ui
                .add(
                    egui::Label::new(RichText::new(&address).monospace().color(text_color))
                        .sense(egui::Sense::click()),
                )
                .on_hover_text("Click to copy");
            if reveal > 0.0 && response.clicked() {
                ui.output_mut(|o| o.copied_text = address.clone());
            }
        });
    }

    fn render_transaction_list(&self, ui: &mut Ui) {
        ui.heading("Transactions");
        if self.transactions.is_empty() {
            ui.label("No transactions yet");
            return;
        }
        let network = self.wallet_model.network().bitcoin_network();
        TableBuilder::new(ui)
            .striped(true)
            .column(Column::exact(150.0))
            .column(Column::remainder())
            .column(Column::exact(130.0))
            .header(20.0, |mut header| {
                header.col(|ui| {
                    ui.strong("Date");
                });
                header.col(|ui| {
                    ui.strong("Description");
                });
                header.col(|ui| {
                    ui.strong("Amount");
                });
            })
            .body(|mut body| {
                for transaction in &self.transactions {
                    body.row(24.0, |mut row| {
                        row.col(|ui| {
                            ui.label(confirmation_time_string(transaction));
                        });
                        row.col(|ui| {
                            ui.label(describe_transaction(transaction, network))
                                .on_hover_text(transaction.txid.to_string());
                        });
                        row.col(|ui| {
                            ui.label(format_signed_btc(transaction_total(transaction)));
                        });
                    });
                }
            });
    }
}

fn confirmation_time_string(transaction: &TransactionDetails) -> String {
    transaction
        .confirmation_time
        .as_ref()
        .and_then(|time| Local.timestamp_opt(time.timestamp as i64, 0).single())
        .map(|time| time.format("%d/%m/%y %H:%M:%S").to_string())
        .unwrap_or_else(|| "Pending".to_string())
}

#[cfg(test)]
mod tests {
    use bdk::bitcoin::hashes::Hash;
    use bdk::bitcoin::Txid;
    use bdk::BlockTime;

    use super::*;

    fn details(confirmation_time: Option<BlockTime>) -> TransactionDetails {
        TransactionDetails {
            transaction: None,
            txid: Txid::all_zeros(),
            received: 0,
            sent: 0,
            fee: None,
            confirmation_time,
        }
    }

    #[test]
    fn unconfirmed_shows_pending() {
        assert_eq!(confirmation_time_string(&details(None)), "Pending");
    }

    #[test]
    fn confirmed_shows_local_time() {
        let text = confirmation_time_string(&details(Some(BlockTime {
            height: 1,
            timestamp: 1_700_000_000,
        })));
        assert_ne!(text, "Pending");
        assert_eq!(text.len(), "14/11/23 22:13:20".len());
    }
}
