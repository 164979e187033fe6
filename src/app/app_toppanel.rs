use super::WalletApp;

impl WalletApp {
    pub fn render_toppanel(
        &mut self,
        enabled: bool,
        ctx: &egui::Context,
        _frame: &mut eframe::Frame,
    ) {
        egui::TopBottomPanel::top("Headerbar")
            .exact_height(50.0)
            .show(ctx, |ui| {
                ui.set_enabled(enabled);
                ui.horizontal_centered(|ui| {
                    ui.heading("Rust Bitcoin Wallet");
                    ui.separator();
                    ui.label(self.wallet_model.wallet_name());
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.label(format!("Network: {}", self.wallet_model.network()));
                    });
                });
            });
    }
}
