use core::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::action::ActionPicker;
use crate::config::HarnessConfig;
use crate::report::{RunReport, ScenarioReport, ScenarioStatus};
use crate::scenario::{catalogue, document_id, Scenario, ScenarioContext, ScenarioKind};
use crate::session::{close_all, Session};
use crate::surface::SurfaceFactory;

/// Runs scenarios against one backend, each in its own set of sessions.
pub struct ScenarioRunner<'a> {
    factory: &'a dyn SurfaceFactory,
    config: HarnessConfig,
    seed: u64,
    include_quarantined: bool,
    filter: Option<String>,
}

impl core::fmt::Debug for ScenarioRunner<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScenarioRunner")
            .field("config", &self.config)
            .field("seed", &self.seed)
            .field("include_quarantined", &self.include_quarantined)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl<'a> ScenarioRunner<'a> {
    /// Uses the configured seed, or draws one that is logged and reported.
    pub fn new(factory: &'a dyn SurfaceFactory, config: HarnessConfig) -> Self {
        let seed = config
            .seed
            .unwrap_or_else(|| ActionPicker::from_entropy().seed());

        Self {
            factory,
            config,
            seed,
            include_quarantined: false,
            filter: None,
        }
    }

    #[must_use]
    pub const fn include_quarantined(mut self, include: bool) -> Self {
        self.include_quarantined = include;
        self
    }

    /// Only runs scenarios whose name contains `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    pub const fn seed(&self) -> u64 {
        self.seed
    }

    pub async fn run(&self) -> RunReport {
        self.run_scenarios(&catalogue()).await
    }

    pub async fn run_scenarios(&self, scenarios: &[ScenarioKind]) -> RunReport {
        info!(seed = self.seed, "Starting scenario run");

        let mut report = RunReport::new(self.seed);

        for scenario in scenarios {
            let name = scenario.display_name();

            if let Some(filter) = &self.filter {
                if !name.contains(filter.as_str()) {
                    continue;
                }
            }

            let scenario_report = if self.config.is_quarantined(&name) && !self.include_quarantined
            {
                warn!(scenario = %name, "Skipping quarantined scenario");
                ScenarioReport {
                    document_id: document_id(&self.config.room_prefix, &name),
                    name,
                    status: ScenarioStatus::Quarantined,
                    elapsed: Duration::ZERO,
                    seed: None,
                }
            } else {
                self.run_scenario(scenario, name).await
            };

            report.push(scenario_report);
        }

        report
    }

    async fn open_sessions(&self, document_id: &str) -> eyre::Result<Vec<Session>> {
        let mut sessions = Vec::with_capacity(self.config.sessions);
        for index in 0..self.config.sessions {
            match Session::create(self.factory, index, document_id).await {
                Ok(session) => sessions.push(session),
                Err(err) => {
                    close_all(sessions).await;
                    return Err(err);
                }
            }
        }
        Ok(sessions)
    }

    async fn run_scenario(&self, scenario: &ScenarioKind, name: String) -> ScenarioReport {
        let document_id = document_id(&self.config.room_prefix, &name);
        let started = Instant::now();

        info!(scenario = %name, %document_id, seed = self.seed, "Running scenario");

        let result = match self.open_sessions(&document_id).await {
            Ok(sessions) => {
                let mut ctx = ScenarioContext::new(
                    &name,
                    &self.config,
                    sessions,
                    ActionPicker::new(self.seed),
                );
                let result = scenario.run_assert(&mut ctx).await;
                close_all(ctx.sessions).await;
                result
            }
            Err(err) => Err(err.wrap_err("failed to open sessions")),
        };

        let status = match result {
            Ok(()) => {
                info!(scenario = %name, "Scenario passed");
                ScenarioStatus::Passed
            }
            Err(err) => {
                error!(scenario = %name, seed = self.seed, "Scenario failed: {err:#}");
                ScenarioStatus::Failed(format!("{err:#}"))
            }
        };

        ScenarioReport {
            name,
            document_id,
            status,
            elapsed: started.elapsed(),
            seed: Some(self.seed),
        }
    }
}
