use core::slice::from_ref;

use eyre::Result as EyreResult;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::info;

use crate::action::{Action, ActionDriver};
use crate::error::HarnessError;
use crate::fault::{CloseCode, FaultEvent, FaultInjector};
use crate::oracle::{await_convergence, ensure_identity_preserved, expect_item_count};
use crate::scenario::{Scenario, ScenarioContext};

/// One client goes offline, both clients edit, the offline client is
/// brought back with `reconnect`, and the document must converge.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedFaultScenario {
    pub reconnect: CloseCode,
}

impl ScriptedFaultScenario {
    pub const fn new(reconnect: CloseCode) -> Self {
        Self { reconnect }
    }
}

impl Scenario for ScriptedFaultScenario {
    fn display_name(&self) -> String {
        format!("one client offline with offline changes - {}", self.reconnect)
    }

    async fn run_assert(&self, ctx: &mut ScenarioContext<'_>) -> EyreResult<()> {
        ctx.require_sessions(2)?;

        let config = ctx.config;
        let poll_interval = config.oracle.poll_interval();
        let count_timeout = config.oracle.item_count_timeout();
        let profile = match self.reconnect {
            CloseCode::ConnectivityFault => config.faults.connectivity,
            CloseCode::ApplicationFault => config.faults.application,
        };

        let sessions = &ctx.sessions;
        let (subject, peer) = (&sessions[0], &sessions[1]);

        ctx.reset().await?;

        ActionDriver::apply(subject, Action::Push).await?;
        ctx.expect_count(1).await?;

        let identity_before = if self.reconnect.preserves_identity() {
            Some(subject.connection_id().await?)
        } else {
            None
        };

        FaultInjector::inject(subject, FaultEvent::TransportClose).await?;
        sleep(config.faults.outage_delay()).await;

        ActionDriver::apply(subject, Action::Push).await?;
        ActionDriver::apply(peer, Action::Push).await?;
        expect_item_count(from_ref(subject), 2, count_timeout, poll_interval).await?;
        expect_item_count(from_ref(peer), 2, count_timeout, poll_interval).await?;

        // One shared item plus one local edit each. Three on either side
        // would mean the peer's edit leaked through the dropped transport.
        let outage_counts = vec![
            (subject.index(), subject.items().await?.len()),
            (peer.index(), peer.items().await?.len()),
        ];
        if outage_counts.iter().any(|(_, count)| *count != 2) {
            return Err(HarnessError::ItemCountMismatch {
                expected: 2,
                observed: outage_counts,
            }
            .into());
        }

        FaultInjector::inject(subject, FaultEvent::ServerReject(self.reconnect)).await?;

        info!(settle_ms = profile.settle_ms, "Waiting for reconnect to settle");
        sleep(profile.settle()).await;

        let _converged = await_convergence(sessions, profile.timeout(), poll_interval)
            .await?
            .ensure_converged(profile.timeout())?;

        // Nothing edited during the outage may be lost.
        ctx.expect_count(3).await?;

        if let Some(before) = identity_before {
            let after = subject.connection_id().await?;
            ensure_identity_preserved(&before, &after)?;
        }

        ctx.reset().await
    }
}
