//! Arbitrates the Tor bootstrap and chain sync progress sources onto the
//! single notification slot, and fires the ready animation once sync is done.
//!
//! Both sources live on background threads and report through a
//! [`ProgressSink`]. The UI thread drains the receiving end and feeds every
//! event to [`ProgressCoordinator::handle_event`], so all slot mutations
//! happen on one thread and never overlap.

use std::sync::mpsc::{Receiver, Sender};

use log::{debug, info};

use crate::notification_bar::{NotificationItem, ProgressProperty, StatusSurface};

pub const TOR_MESSAGE: &str = "Initialising Tor";
pub const SYNC_MESSAGE: &str = "Synchronising with the Bitcoin network";

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    TorProgress { message: String, percent: u32 },
    TorCompleted,
    /// Fraction of the chain sync done, in `[0.0, 1.0]`.
    SyncProgress(f64),
}

/// Sending half handed to progress sources. Each send wakes the UI so the
/// event is drained on the next frame.
#[derive(Clone, Debug)]
pub struct ProgressSink {
    sender: Sender<ProgressEvent>,
    repaint: Option<egui::Context>,
}

impl ProgressSink {
    pub fn new(sender: Sender<ProgressEvent>, repaint: Option<egui::Context>) -> Self {
        Self { sender, repaint }
    }

    /// Returns false once the coordinator side has gone away.
    pub fn tor_progress(&self, message: &str, percent: u32) -> bool {
        self.send(ProgressEvent::TorProgress {
            message: message.to_string(),
            percent,
        })
    }

    pub fn tor_completed(&self) -> bool {
        self.send(ProgressEvent::TorCompleted)
    }

    pub fn sync_progress(&self, fraction: f64) -> bool {
        self.send(ProgressEvent::SyncProgress(fraction))
    }

    fn send(&self, event: ProgressEvent) -> bool {
        let delivered = self.sender.send(event).is_ok();
        if let Some(ctx) = &self.repaint {
            ctx.request_repaint();
        }
        delivered
    }
}

/// An anonymizing network client whose bootstrap must finish before sync.
pub trait TorClient {
    /// Reports `(message, percent)` updates then exactly one completion.
    fn add_initialization_listener(&mut self, sink: ProgressSink);
}

/// Fire-and-forget visual transitions of the main window.
pub trait Animations {
    /// Controls slide in and the receive address fades in.
    fn ready_to_go(&mut self);
    /// Controls slide out ahead of a restore.
    fn restore_from_seed(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Init,
    TorBootstrap,
    Syncing,
    Ready,
}

pub struct ProgressCoordinator {
    state: CoordinatorState,
    item: Option<NotificationItem>,
    tor_progress: ProgressProperty,
    sync_progress: ProgressProperty,
}

impl Default for ProgressCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCoordinator {
    pub fn new() -> Self {
        Self {
            state: CoordinatorState::Init,
            item: None,
            tor_progress: ProgressProperty::indeterminate(),
            sync_progress: ProgressProperty::indeterminate(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    #[cfg(test)]
    pub fn sync_progress(&self) -> &ProgressProperty {
        &self.sync_progress
    }

    /// Leaves `Init`. Only the first call has any effect.
    pub fn start<S: StatusSurface>(&mut self, tor_configured: bool, surface: &mut S) {
        if self.state != CoordinatorState::Init {
            debug!("coordinator already started, state {:?}", self.state);
            return;
        }
        if tor_configured {
            info!("{TOR_MESSAGE}");
            self.state = CoordinatorState::TorBootstrap;
            self.tor_progress.set(ProgressProperty::INDETERMINATE);
            self.item = Some(surface.push_item(TOR_MESSAGE, self.tor_progress.clone()));
        } else {
            self.state = CoordinatorState::Syncing;
            self.show_sync_message(surface);
        }
    }

    pub fn handle_event<S: StatusSurface, A: Animations>(
        &mut self,
        event: ProgressEvent,
        surface: &mut S,
        animations: &mut A,
    ) {
        match event {
            ProgressEvent::TorProgress { message, percent } => {
                if self.state != CoordinatorState::TorBootstrap {
                    debug!("ignoring Tor progress in state {:?}", self.state);
                    return;
                }
                if let Some(item) = &self.item {
                    item.set_label(format!("{TOR_MESSAGE}: {message}"));
                }
                self.tor_progress.set(f64::from(percent) / 100.0);
            }
            ProgressEvent::TorCompleted => {
                if self.state != CoordinatorState::TorBootstrap {
                    debug!("ignoring Tor completion in state {:?}", self.state);
                    return;
                }
                info!("Tor initialised");
                self.release_item();
                self.state = CoordinatorState::Syncing;
                self.show_sync_message(surface);
                // Sync may have finished while Tor was still holding the slot.
                let fraction = self.sync_progress.get();
                if fraction >= 1.0 {
                    self.on_sync_progress(fraction, surface, animations);
                }
            }
            ProgressEvent::SyncProgress(fraction) => {
                self.sync_progress.set(fraction);
                if self.state == CoordinatorState::Syncing {
                    self.on_sync_progress(fraction, surface, animations);
                }
            }
        }
    }

    /// Feeds every queued event, without blocking.
    pub fn drain<S: StatusSurface, A: Animations>(
        &mut self,
        events: &Receiver<ProgressEvent>,
        surface: &mut S,
        animations: &mut A,
    ) {
        while let Ok(event) = events.try_recv() {
            self.handle_event(event, surface, animations);
        }
    }

    /// Restore flow started from the UI. Plays regardless of state.
    pub fn restore_from_seed<A: Animations>(&self, animations: &mut A) {
        info!("restore from seed requested in state {:?}", self.state);
        animations.restore_from_seed();
    }

    fn on_sync_progress<S: StatusSurface, A: Animations>(
        &mut self,
        fraction: f64,
        surface: &mut S,
        animations: &mut A,
    ) {
        if fraction >= 1.0 {
            self.release_item();
            self.state = CoordinatorState::Ready;
            info!("chain sync complete");
            animations.ready_to_go();
        } else if self.item.as_ref().map_or(true, NotificationItem::is_cancelled) {
            self.show_sync_message(surface);
        }
    }

    fn show_sync_message<S: StatusSurface>(&mut self, surface: &mut S) {
        self.release_item();
        self.item = Some(surface.push_item(SYNC_MESSAGE, self.sync_progress.clone()));
    }

    fn release_item(&mut self) {
        if let Some(item) = self.item.take() {
            item.cancel();
        }
    }
}

impl Drop for ProgressCoordinator {
    fn drop(&mut self) {
        self.release_item();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;

    use super::*;

    #[derive(Default)]
    struct RecordingSurface {
        pushed: Vec<NotificationItem>,
    }

    impl RecordingSurface {
        fn live(&self) -> Vec<&NotificationItem> {
            self.pushed.iter().filter(|i| !i.is_cancelled()).collect()
        }

        fn labels(&self) -> Vec<String> {
            self.pushed.iter().map(|i| i.label()).collect()
        }
    }

    impl StatusSurface for RecordingSurface {
        fn push_item(&mut self, label: &str, progress: ProgressProperty) -> NotificationItem {
            assert!(
                self.live().is_empty(),
                "pushed {label:?} while another item was live"
            );
            let item = NotificationItem::new(self.pushed.len() as u64, label, progress);
            self.pushed.push(item.clone());
            item
        }
    }

    #[derive(Default)]
    struct RecordingAnimations {
        ready: usize,
        leaving: usize,
    }

    impl Animations for RecordingAnimations {
        fn ready_to_go(&mut self) {
            self.ready += 1;
        }

        fn restore_from_seed(&mut self) {
            self.leaving += 1;
        }
    }

    fn setup(tor: bool) -> (ProgressCoordinator, RecordingSurface, RecordingAnimations) {
        let mut coordinator = ProgressCoordinator::new();
        let mut surface = RecordingSurface::default();
        coordinator.start(tor, &mut surface);
        (coordinator, surface, RecordingAnimations::default())
    }

    fn sync(
        c: &mut ProgressCoordinator,
        s: &mut RecordingSurface,
        a: &mut RecordingAnimations,
        fraction: f64,
    ) {
        c.handle_event(ProgressEvent::SyncProgress(fraction), s, a);
    }

    #[test]
    fn without_tor_goes_straight_to_syncing() {
        let (coordinator, surface, _) = setup(false);
        assert_eq!(coordinator.state(), CoordinatorState::Syncing);
        assert_eq!(surface.labels(), vec![SYNC_MESSAGE.to_string()]);
        assert!(surface.pushed[0].progress().ptr_eq(coordinator.sync_progress()));
    }

    #[test]
    fn with_tor_shows_indeterminate_tor_item() {
        let (coordinator, surface, _) = setup(true);
        assert_eq!(coordinator.state(), CoordinatorState::TorBootstrap);
        assert_eq!(surface.labels(), vec![TOR_MESSAGE.to_string()]);
        assert!(surface.pushed[0].progress().is_indeterminate());
    }

    #[test]
    fn tor_progress_updates_label_and_fraction() {
        let (mut c, mut s, mut a) = setup(true);
        let event = ProgressEvent::TorProgress {
            message: "Loading network status".to_string(),
            percent: 45,
        };
        c.handle_event(event.clone(), &mut s, &mut a);
        c.handle_event(event, &mut s, &mut a);

        assert_eq!(s.pushed.len(), 1);
        let item = &s.pushed[0];
        assert_eq!(item.label(), "Initialising Tor: Loading network status");
        assert!((item.progress().get() - 0.45).abs() < 1e-9);
    }

    #[test]
    fn tor_completion_hands_slot_to_sync() {
        let (mut c, mut s, mut a) = setup(true);
        c.handle_event(ProgressEvent::TorCompleted, &mut s, &mut a);

        assert_eq!(c.state(), CoordinatorState::Syncing);
        assert_eq!(
            s.labels(),
            vec![TOR_MESSAGE.to_string(), SYNC_MESSAGE.to_string()]
        );
        assert!(s.pushed[0].is_cancelled());
        assert_eq!(s.live().len(), 1);
        assert_eq!(s.live()[0].label(), SYNC_MESSAGE);
    }

    #[test]
    fn sync_complete_fires_ready_once() {
        let (mut c, mut s, mut a) = setup(false);
        sync(&mut c, &mut s, &mut a, 0.5);
        sync(&mut c, &mut s, &mut a, 1.0);
        assert_eq!(c.state(), CoordinatorState::Ready);
        assert_eq!(a.ready, 1);
        assert!(s.live().is_empty());

        sync(&mut c, &mut s, &mut a, 1.0);
        sync(&mut c, &mut s, &mut a, 1.0);
        assert_eq!(a.ready, 1);
    }

    #[test]
    fn almost_done_is_not_done() {
        let (mut c, mut s, mut a) = setup(false);
        sync(&mut c, &mut s, &mut a, 0.999999);
        assert_eq!(a.ready, 0);
        assert_eq!(c.state(), CoordinatorState::Syncing);

        sync(&mut c, &mut s, &mut a, 1.0);
        assert_eq!(a.ready, 1);
    }

    #[test]
    fn repeated_updates_do_not_push_again() {
        let (mut c, mut s, mut a) = setup(false);
        sync(&mut c, &mut s, &mut a, 0.3);
        sync(&mut c, &mut s, &mut a, 0.3);
        assert_eq!(s.pushed.len(), 1);
        assert_eq!(s.pushed[0].progress().get(), 0.3);
    }

    #[test]
    fn dismissed_sync_item_comes_back() {
        let (mut c, mut s, mut a) = setup(false);
        sync(&mut c, &mut s, &mut a, 0.2);
        s.pushed[0].cancel();

        sync(&mut c, &mut s, &mut a, 0.4);
        assert_eq!(s.pushed.len(), 2);
        assert_eq!(s.live().len(), 1);
        assert_eq!(s.live()[0].progress().get(), 0.4);
    }

    #[test]
    fn ready_is_terminal() {
        let (mut c, mut s, mut a) = setup(false);
        sync(&mut c, &mut s, &mut a, 1.0);
        let pushed = s.pushed.len();

        sync(&mut c, &mut s, &mut a, 0.1);
        assert_eq!(c.state(), CoordinatorState::Ready);
        assert_eq!(s.pushed.len(), pushed);
        assert!(s.live().is_empty());
    }

    #[test]
    fn sync_updates_during_tor_leave_the_tor_item_alone() {
        let (mut c, mut s, mut a) = setup(true);
        sync(&mut c, &mut s, &mut a, 0.6);
        sync(&mut c, &mut s, &mut a, 1.0);
        assert_eq!(c.state(), CoordinatorState::TorBootstrap);
        assert_eq!(a.ready, 0);
        assert_eq!(s.live()[0].label(), TOR_MESSAGE);

        c.handle_event(ProgressEvent::TorCompleted, &mut s, &mut a);
        assert_eq!(c.state(), CoordinatorState::Ready);
        assert_eq!(a.ready, 1);
        assert!(s.live().is_empty());
    }

    #[test]
    fn tor_events_outside_bootstrap_are_ignored() {
        let (mut c, mut s, mut a) = setup(false);
        c.handle_event(
            ProgressEvent::TorProgress {
                message: "late".to_string(),
                percent: 90,
            },
            &mut s,
            &mut a,
        );
        c.handle_event(ProgressEvent::TorCompleted, &mut s, &mut a);
        assert_eq!(c.state(), CoordinatorState::Syncing);
        assert_eq!(s.labels(), vec![SYNC_MESSAGE.to_string()]);
    }

    #[test]
    fn restore_plays_leaving_in_any_state() {
        let (mut c, mut s, mut a) = setup(false);
        c.restore_from_seed(&mut a);
        sync(&mut c, &mut s, &mut a, 1.0);
        c.restore_from_seed(&mut a);
        assert_eq!(a.leaving, 2);
        assert_eq!(a.ready, 1);
    }

    #[test]
    fn dropping_the_coordinator_frees_the_slot() {
        let (c, s, _) = setup(false);
        assert_eq!(s.live().len(), 1);
        drop(c);
        assert!(s.live().is_empty());
    }

    #[test]
    fn second_start_is_ignored() {
        let (mut c, mut s, _) = setup(false);
        c.start(true, &mut s);
        assert_eq!(c.state(), CoordinatorState::Syncing);
        assert_eq!(s.pushed.len(), 1);
    }

    struct ScriptedTor {
        steps: Vec<(&'static str, u32)>,
        handle: Option<thread::JoinHandle<()>>,
    }

    impl TorClient for ScriptedTor {
        fn add_initialization_listener(&mut self, sink: ProgressSink) {
            let steps = self.steps.clone();
            self.handle = Some(thread::spawn(move || {
                for (message, percent) in steps {
                    sink.tor_progress(message, percent);
                }
                sink.tor_completed();
            }));
        }
    }

    #[test]
    fn events_from_background_sources_are_drained_in_order() {
        let (sender, receiver) = mpsc::channel();
        let mut tor = ScriptedTor {
            steps: vec![("Connecting", 10), ("Building circuits", 80)],
            handle: None,
        };
        tor.add_initialization_listener(ProgressSink::new(sender.clone(), None));
        if let Some(handle) = tor.handle.take() {
            handle.join().unwrap();
        }
        let sync_sink = ProgressSink::new(sender, None);
        assert!(sync_sink.sync_progress(0.5));
        assert!(sync_sink.sync_progress(1.0));

        let (mut c, mut s, mut a) = setup(true);
        c.drain(&receiver, &mut s, &mut a);

        assert_eq!(c.state(), CoordinatorState::Ready);
        assert_eq!(a.ready, 1);
        assert_eq!(
            s.labels(),
            vec![
                "Initialising Tor: Building circuits".to_string(),
                SYNC_MESSAGE.to_string()
            ]
        );
        assert!(s.live().is_empty());
    }

    #[test]
    fn sink_reports_closed_receiver() {
        let (sender, receiver) = mpsc::channel();
        let sink = ProgressSink::new(sender, None);
        drop(receiver);
        assert!(!sink.sync_progress(0.1));
    }
}
