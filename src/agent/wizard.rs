//! First-time setup wizard.
//!
//! The wizard starts a hotspot, serves the captive portal on a child of the
//! root token and waits until the portal reports a join outcome. Shutdown
//! runs through [`PortalRunning`] -> [`PortalCancelled`] -> [`HotspotStopped`]:
//! the hotspot can only be stopped once the portal, which still needs the
//! hotspot interface for its own cleanup, is gone.

use crate::{
    errors::{AgentError, ErrorKind},
    executor::CommandExecutor,
    portal::{CaptivePortal, PortalConfig},
    radio::{BootstrapRadio, Hotspot},
};
use anyhow::Result;
use log::{info, warn};
use serde::Serialize;
use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardState {
    HotspotStarting,
    PortalListening,
    CredentialsReceived,
    Connecting,
    Connected,
    Failed,
    HotspotStopped,
}

impl WizardState {
    fn can_advance_to(self, next: WizardState) -> bool {
        use WizardState::*;

        matches!(
            (self, next),
            (HotspotStarting, PortalListening)
                | (PortalListening, CredentialsReceived)
                | (CredentialsReceived, Connecting)
                | (Connecting, Connected | Failed)
        ) || (next == HotspotStopped && self != HotspotStopped)
    }
}

/// Shared view of the wizard's progress.
#[derive(Clone, Debug)]
pub struct WizardTracker {
    state: Arc<Mutex<WizardState>>,
}

impl Default for WizardTracker {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(WizardState::HotspotStarting)),
        }
    }
}

impl WizardTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WizardState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `next` if that is a legal transition from the current state.
    ///
    /// # Returns
    /// * `true` - The transition happened
    /// * `false` - The transition is not allowed; the state is unchanged
    pub fn advance(&self, next: WizardState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if !state.can_advance_to(next) {
            return false;
        }

        info!("agent: setup {:?} -> {next:?}", *state);
        *state = next;
        true
    }

    fn finish(&self, _stopped: &HotspotStopped) {
        self.advance(WizardState::HotspotStopped);
    }
}

/// Result of the one join attempt the portal makes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Connected,
    Failed(String),
}

/// Sending half of the buffered "done" channel.
///
/// Only the first [`DoneSignal::fire`] is delivered; later calls return
/// `false` without blocking.
#[derive(Clone, Debug)]
pub struct DoneSignal {
    tx: mpsc::Sender<JoinOutcome>,
    fired: Arc<AtomicBool>,
}

pub struct DoneReceiver {
    rx: mpsc::Receiver<JoinOutcome>,
}

pub fn done_channel() -> (DoneSignal, DoneReceiver) {
    let (tx, rx) = mpsc::channel(1);

    (
        DoneSignal {
            tx,
            fired: Arc::new(AtomicBool::new(false)),
        },
        DoneReceiver { rx },
    )
}

impl DoneSignal {
    pub fn fire(&self, outcome: JoinOutcome) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.tx.try_send(outcome).is_ok()
    }
}

impl DoneReceiver {
    /// Waits for the outcome; `None` once every sender is gone without firing.
    pub async fn wait(&mut self) -> Option<JoinOutcome> {
        self.rx.recv().await
    }
}

/// Portal task still serving.
pub struct PortalRunning {
    token: CancellationToken,
    task: JoinHandle<Result<()>>,
}

/// Portal stopped; the hotspot is still up.
pub struct PortalCancelled(());

/// Hotspot stopped; the radio is free for client mode.
pub struct HotspotStopped(());

impl PortalRunning {
    pub fn new(token: CancellationToken, task: JoinHandle<Result<()>>) -> Self {
        Self { token, task }
    }

    /// Cancels the portal and waits until its cleanup has finished.
    pub async fn cancel_portal(self) -> PortalCancelled {
        self.token.cancel();

        match self.task.await {
            Ok(Ok(())) => info!("agent: captive portal stopped"),
            Ok(Err(e)) => warn!("agent: captive portal stopped with error: {e:#}"),
            Err(e) => warn!("agent: captive portal task failed: {e}"),
        }

        PortalCancelled(())
    }
}

impl PortalCancelled {
    pub async fn stop_hotspot<H>(self, radio: &H) -> HotspotStopped
    where
        H: Hotspot,
    {
        if let Err(e) = radio.stop_hotspot().await {
            // a successful join usually removed the hotspot already
            info!("agent: hotspot stop: {e:#}");
        }

        HotspotStopped(())
    }
}

/// Runs the wizard until the portal reports an outcome, `setup_timeout`
/// elapses or `root` is cancelled. The hotspot is stopped in every case.
pub async fn run<R, E>(
    radio: Arc<R>,
    executor: E,
    portal: PortalConfig,
    setup_timeout: Option<Duration>,
    root: &CancellationToken,
) -> Result<JoinOutcome, AgentError>
where
    R: BootstrapRadio,
    E: CommandExecutor + Clone + 'static,
{
    let tracker = WizardTracker::new();

    if let Err(e) = radio.start_hotspot().await {
        warn!("agent: failed to start hotspot, serving portal anyway: {e:#}");
    }

    let (done, mut receiver) = done_channel();
    let token = root.child_token();
    let portal = CaptivePortal::new(portal, radio.clone(), executor, tracker.clone(), done);
    let task = tokio::spawn(portal.run(token.clone()));
    let running = PortalRunning::new(token, task);

    let outcome = tokio::select! {
        outcome = receiver.wait() => Ok(outcome.unwrap_or_else(|| {
            JoinOutcome::Failed("captive portal stopped before a network was joined".to_string())
        })),
        _ = root.cancelled() => Err(AgentError::new(
            "agent.setup",
            ErrorKind::Other,
            "shutdown requested during setup",
        )),
        _ = expire(setup_timeout) => Err(AgentError::network(
            "agent.setup",
            format!(
                "no network joined within {}s",
                setup_timeout.unwrap_or_default().as_secs()
            ),
        )),
    };

    let stopped = running.cancel_portal().await.stop_hotspot(radio.as_ref()).await;
    tracker.finish(&stopped);

    outcome
}

async fn expire(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => sleep(timeout).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod state {
        use super::*;

        #[test]
        fn follows_happy_path() {
            let tracker = WizardTracker::new();

            for next in [
                WizardState::PortalListening,
                WizardState::CredentialsReceived,
                WizardState::Connecting,
                WizardState::Connected,
                WizardState::HotspotStopped,
            ] {
                assert!(tracker.advance(next), "should advance to {next:?}");
            }
        }

        #[test]
        fn rejects_skipped_steps() {
            let tracker = WizardTracker::new();

            assert!(!tracker.advance(WizardState::CredentialsReceived));
            assert!(tracker.advance(WizardState::PortalListening));
            assert!(!tracker.advance(WizardState::Connected));
            assert_eq!(tracker.state(), WizardState::PortalListening);
        }

        #[test]
        fn second_submission_is_rejected() {
            let tracker = WizardTracker::new();
            tracker.advance(WizardState::PortalListening);

            assert!(tracker.advance(WizardState::CredentialsReceived));
            assert!(!tracker.advance(WizardState::CredentialsReceived));
        }

        #[test]
        fn hotspot_stopped_is_terminal() {
            let tracker = WizardTracker::new();

            assert!(tracker.advance(WizardState::HotspotStopped));
            assert!(!tracker.advance(WizardState::HotspotStopped));
            assert!(!tracker.advance(WizardState::PortalListening));
        }
    }

    mod done {
        use super::*;

        #[tokio::test]
        async fn fires_exactly_once() {
            let (done, mut receiver) = done_channel();
            let clone = done.clone();

            assert!(done.fire(JoinOutcome::Connected));
            assert!(!clone.fire(JoinOutcome::Failed("late".to_string())));
            assert!(!done.fire(JoinOutcome::Connected));

            assert_eq!(receiver.wait().await, Some(JoinOutcome::Connected));
        }

        #[tokio::test]
        async fn closes_when_senders_drop() {
            let (done, mut receiver) = done_channel();
            drop(done);

            assert_eq!(receiver.wait().await, None);
        }
    }
}
