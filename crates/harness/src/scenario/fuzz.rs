use eyre::Result as EyreResult;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::info;

use crate::action::Action;
use crate::fault::FaultInjector;
use crate::inflight::InFlight;
use crate::oracle::await_convergence;
use crate::scenario::{Scenario, ScenarioContext};

/// Random concurrent edits on two clients, first online, then with one of
/// them offline. The document must converge after the offline client is
/// brought back.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
pub struct FuzzScenario;

impl Scenario for FuzzScenario {
    fn display_name(&self) -> String {
        "fuzzy".to_owned()
    }

    async fn run_assert(&self, ctx: &mut ScenarioContext<'_>) -> EyreResult<()> {
        ctx.require_sessions(2)?;
        ctx.reset().await?;

        let config = ctx.config;
        let fuzz = config.fuzz;
        let poll_interval = config.oracle.poll_interval();
        let delay_range = fuzz.min_delay_ms..=fuzz.max_delay_ms;

        let sessions = &ctx.sessions;
        let picker = &mut ctx.picker;
        let (first, second) = (&sessions[0], &sessions[1]);

        info!(seed = picker.seed(), rounds = fuzz.online_rounds, "Online burst");

        let mut inflight = InFlight::new();
        for _ in 0..fuzz.online_rounds {
            inflight.dispatch(first, Action::Push);
            inflight.dispatch(second, Action::Push);
            inflight.pause(picker.delay(&delay_range)).await;
        }
        inflight.settle().await?;

        let _converged = await_convergence(sessions, config.oracle.timeout(), poll_interval)
            .await?
            .ensure_converged(config.oracle.timeout())?;

        FaultInjector::drop_transport(first).await?;
        sleep(config.faults.outage_delay()).await;

        info!(rounds = fuzz.offline_rounds, "Offline burst");

        for _ in 0..fuzz.offline_rounds {
            inflight.dispatch(first, picker.pick_random());
            inflight.dispatch(second, picker.pick_random());
            inflight.pause(picker.delay(&delay_range)).await;
        }
        inflight.settle().await?;

        sleep(fuzz.offline_settle()).await;

        FaultInjector::reject_as_connectivity_fault(first).await?;
        sleep(config.faults.connectivity.settle()).await;

        let _converged = await_convergence(sessions, fuzz.timeout(), poll_interval)
            .await?
            .ensure_converged(fuzz.timeout())?;

        ctx.reset().await
    }
}
