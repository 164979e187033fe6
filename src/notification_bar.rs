use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// How long the bar takes to get out of the way once its last item is cancelled.
pub const ANIM_OUT_DURATION: Duration = Duration::from_millis(300);

/// A fraction shared between a producer and whatever displays it. Setting it
/// is immediately visible to every clone; there is nothing to poll.
///
/// Negative values mean "indeterminate".
#[derive(Clone, Debug)]
pub struct ProgressProperty(Rc<Cell<f64>>);

impl ProgressProperty {
    pub const INDETERMINATE: f64 = -1.0;

    pub fn new(value: f64) -> Self {
        Self(Rc::new(Cell::new(value)))
    }

    pub fn indeterminate() -> Self {
        Self::new(Self::INDETERMINATE)
    }

    pub fn get(&self) -> f64 {
        self.0.get()
    }

    pub fn set(&self, value: f64) {
        self.0.set(value);
    }

    pub fn is_indeterminate(&self) -> bool {
        self.get() < 0.0
    }

    #[cfg(test)]
    pub fn ptr_eq(&self, other: &ProgressProperty) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

struct ItemState {
    label: RefCell<String>,
    progress: ProgressProperty,
    cancelled: Cell<bool>,
}

/// Handle to an item shown on a [`StatusSurface`]. Clones refer to the same item.
#[derive(Clone)]
pub struct NotificationItem {
    id: u64,
    state: Rc<ItemState>,
}

impl NotificationItem {
    pub fn new(id: u64, label: &str, progress: ProgressProperty) -> Self {
        Self {
            id,
            state: Rc::new(ItemState {
                label: RefCell::new(label.to_string()),
                progress,
                cancelled: Cell::new(false),
            }),
        }
    }

    #[cfg(test)]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> String {
        self.state.label.borrow().clone()
    }

    pub fn set_label(&self, label: impl Into<String>) {
        *self.state.label.borrow_mut() = label.into();
    }

    pub fn progress(&self) -> &ProgressProperty {
        &self.state.progress
    }

    /// Removes the item from its surface. Either the owner or the user (via
    /// the dismiss button) may cancel; cancelling twice is harmless.
    pub fn cancel(&self) {
        self.state.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.get()
    }
}

impl std::fmt::Debug for NotificationItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationItem")
            .field("id", &self.id)
            .field("label", &self.label())
            .field("progress", &self.progress().get())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Somewhere progress items can be shown.
pub trait StatusSurface {
    fn push_item(&mut self, label: &str, progress: ProgressProperty) -> NotificationItem;
}

/// The strip along the bottom of the main window.
#[derive(Default)]
pub struct NotificationBar {
    items: Vec<NotificationItem>,
    next_id: u64,
}

impl NotificationBar {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently pushed item that is still live.
    pub fn active_item(&self) -> Option<&NotificationItem> {
        self.items.iter().rev().find(|item| !item.is_cancelled())
    }

    #[cfg(test)]
    pub fn live_items(&self) -> usize {
        self.items.iter().filter(|item| !item.is_cancelled()).count()
    }

    pub fn render(&mut self, ctx: &egui::Context) {
        self.items.retain(|item| !item.is_cancelled());
        let Some(item) = self.active_item().cloned() else {
            return;
        };

        egui::TopBottomPanel::bottom("notification_bar")
            .exact_height(36.0)
            .show(ctx, |ui| {
                ui.horizontal_centered(|ui| {
                    ui.label(item.label());
                    let progress = item.progress();
                    let bar = if progress.is_indeterminate() {
                        egui::ProgressBar::new(0.0).animate(true)
                    } else {
                        egui::ProgressBar::new(progress.get().clamp(0.0, 1.0) as f32)
                            .show_percentage()
                    };
                    ui.add(bar.desired_width(240.0));
                    if ui.button("✖").on_hover_text("Dismiss").clicked() {
                        item.cancel();
                    }
                });
            });
    }
}

impl StatusSurface for NotificationBar {
    fn push_item(&mut self, label: &str, progress: ProgressProperty) -> NotificationItem {
        self.next_id += 1;
        let item = NotificationItem::new(self.next_id, label, progress);
        self.items.push(item.clone());
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushed_item_is_active_until_cancelled() {
        let mut bar = NotificationBar::new();
        assert!(bar.active_item().is_none());

        let item = bar.push_item("Synchronising", ProgressProperty::indeterminate());
        assert_eq!(bar.active_item().map(|i| i.id()), Some(item.id()));
        assert_eq!(bar.live_items(), 1);

        item.cancel();
        assert!(bar.active_item().is_none());
        assert_eq!(bar.live_items(), 0);
    }

    #[test]
    fn cancelling_newest_item_uncovers_the_one_below() {
        let mut bar = NotificationBar::new();
        let older = bar.push_item("Initialising Tor", ProgressProperty::indeterminate());
        let newer = bar.push_item("Synchronising", ProgressProperty::new(0.5));

        newer.cancel();
        assert_eq!(bar.active_item().map(|i| i.id()), Some(older.id()));
        older.cancel();
        assert!(bar.active_item().is_none());
    }

    #[test]
    fn progress_is_shared_with_the_item() {
        let mut bar = NotificationBar::new();
        let progress = ProgressProperty::indeterminate();
        let item = bar.push_item("Synchronising", progress.clone());
        assert!(item.progress().is_indeterminate());

        progress.set(0.25);
        assert_eq!(item.progress().get(), 0.25);
        assert!(item.progress().ptr_eq(&progress));
    }

    #[test]
    fn label_updates_are_visible_through_clones() {
        let mut bar = NotificationBar::new();
        let item = bar.push_item("Initialising Tor", ProgressProperty::indeterminate());
        item.set_label("Initialising Tor: Connecting");
        assert_eq!(
            bar.active_item().map(|i| i.label()),
            Some("Initialising Tor: Connecting".to_string())
        );
    }
}
