//! Dispatched-but-unawaited commands.
//!
//! Races are manufactured by not waiting for a dispatch before issuing the
//! next one. Everything stays on the scenario's own control flow: in-flight
//! dispatches only make progress while the scenario is suspended in
//! [`InFlight::pause`] or [`InFlight::settle`].

use core::time::Duration;

use eyre::Result as EyreResult;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::action::{Action, ActionDriver};
use crate::session::Session;

#[derive(Default)]
pub struct InFlight<'a> {
    pending: FuturesUnordered<BoxFuture<'a, EyreResult<()>>>,
    first_error: Option<eyre::Report>,
    dispatched: usize,
}

impl core::fmt::Debug for InFlight<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InFlight")
            .field("pending", &self.pending.len())
            .field("dispatched", &self.dispatched)
            .field("failed", &self.first_error.is_some())
            .finish()
    }
}

impl<'a> InFlight<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `action` on `session` without waiting for it.
    pub fn dispatch(&mut self, session: &'a Session, action: Action) {
        self.dispatched += 1;
        self.pending.push(Box::pin(ActionDriver::apply(session, action)));
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub const fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Waits `duration` while driving every in-flight dispatch.
    pub async fn pause(&mut self, duration: Duration) {
        let timer = sleep(duration);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                () = &mut timer => return,
                Some(result) = self.pending.next(), if !self.pending.is_empty() => {
                    self.record(result);
                }
            }
        }
    }

    /// Awaits every outstanding dispatch. Returns the first dispatch error,
    /// if any, once all have finished.
    pub async fn settle(&mut self) -> EyreResult<()> {
        debug!(pending = self.pending.len(), "Settling in-flight dispatches");

        while let Some(result) = self.pending.next().await {
            self.record(result);
        }

        match self.first_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn record(&mut self, result: EyreResult<()>) {
        if let Err(err) = result {
            warn!(%err, "In-flight dispatch failed");
            if self.first_error.is_none() {
                self.first_error = Some(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimulatedServer, SimulationConfig};
    use crate::surface::SurfaceFactory;

    #[tokio::test(start_paused = true)]
    async fn dispatches_progress_only_while_suspended() {
        let server = SimulatedServer::new(SimulationConfig {
            command_latency: Duration::from_millis(20),
            ..SimulationConfig::default()
        });
        let surface = server.open("inflight").await.expect("open");
        let session = Session::from_surface(0, "inflight", surface);

        let mut inflight = InFlight::new();
        inflight.dispatch(&session, Action::Push);
        inflight.dispatch(&session, Action::Push);

        assert_eq!(inflight.pending(), 2, "nothing runs until suspended");
        assert!(
            session.items().await.expect("items").is_empty(),
            "not applied yet"
        );

        inflight.pause(Duration::from_millis(50)).await;

        assert_eq!(inflight.pending(), 0, "both finished during pause");
        assert_eq!(session.items().await.expect("items").len(), 2, "both applied");

        inflight.settle().await.expect("settle");
        assert_eq!(inflight.dispatched(), 2, "dispatch count kept");
    }

    #[tokio::test(start_paused = true)]
    async fn short_pause_leaves_slow_dispatches_pending() {
        let server = SimulatedServer::new(SimulationConfig {
            command_latency: Duration::from_millis(100),
            ..SimulationConfig::default()
        });
        let surface = server.open("inflight").await.expect("open");
        let session = Session::from_surface(0, "inflight", surface);

        let mut inflight = InFlight::new();
        inflight.dispatch(&session, Action::Push);
        inflight.pause(Duration::from_millis(10)).await;

        assert_eq!(inflight.pending(), 1, "still in flight");

        inflight.settle().await.expect("settle");
        assert_eq!(
            session.items().await.expect("items").len(),
            1,
            "applied on settle"
        );
    }

    #[tokio::test]
    async fn settle_on_empty_set_is_ok() {
        let mut inflight = InFlight::new();
        inflight.settle().await.expect("nothing to settle");
    }
}
