use eyre::{OptionExt, Result as EyreResult};
use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionDriver, ActionPicker};
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::fault::CloseCode;
use crate::oracle::expect_item_count;
use crate::session::Session;

mod fuzz;
mod scripted;

pub use fuzz::FuzzScenario;
pub use scripted::ScriptedFaultScenario;

/// State shared by the steps of one scenario run. Sessions are private to
/// the run.
#[derive(Debug)]
pub struct ScenarioContext<'a> {
    pub name: &'a str,
    pub config: &'a HarnessConfig,
    pub sessions: Vec<Session>,
    pub picker: ActionPicker,
}

impl<'a> ScenarioContext<'a> {
    pub fn new(
        name: &'a str,
        config: &'a HarnessConfig,
        sessions: Vec<Session>,
        picker: ActionPicker,
    ) -> Self {
        Self {
            name,
            config,
            sessions,
            picker,
        }
    }

    pub fn require_sessions(&self, required: usize) -> Result<(), HarnessError> {
        if self.sessions.len() < required {
            return Err(HarnessError::NotEnoughSessions {
                required,
                available: self.sessions.len(),
            });
        }
        Ok(())
    }

    /// Polls until every session holds `expected` items.
    pub async fn expect_count(&self, expected: usize) -> EyreResult<()> {
        expect_item_count(
            &self.sessions,
            expected,
            self.config.oracle.item_count_timeout(),
            self.config.oracle.poll_interval(),
        )
        .await
    }

    /// Clears the document through the first session and waits until every
    /// session reports it empty.
    pub async fn reset(&self) -> EyreResult<()> {
        let first = self
            .sessions
            .first()
            .ok_or_eyre("cannot reset a document without sessions")?;
        ActionDriver::apply(first, Action::Clear).await?;
        self.expect_count(0).await
    }
}

#[expect(
    async_fn_in_trait,
    reason = "Scenarios run on the runner's task and need no Send bound"
)]
pub trait Scenario {
    fn display_name(&self) -> String;
    async fn run_assert(&self, ctx: &mut ScenarioContext<'_>) -> EyreResult<()>;
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScenarioKind {
    ScriptedFault(ScriptedFaultScenario),
    Fuzz(FuzzScenario),
}

impl Scenario for ScenarioKind {
    fn display_name(&self) -> String {
        match self {
            Self::ScriptedFault(scenario) => scenario.display_name(),
            Self::Fuzz(scenario) => scenario.display_name(),
        }
    }

    async fn run_assert(&self, ctx: &mut ScenarioContext<'_>) -> EyreResult<()> {
        match self {
            Self::ScriptedFault(scenario) => scenario.run_assert(ctx).await,
            Self::Fuzz(scenario) => scenario.run_assert(ctx).await,
        }
    }
}

/// The built-in scenario set.
pub fn catalogue() -> Vec<ScenarioKind> {
    vec![
        ScenarioKind::ScriptedFault(ScriptedFaultScenario::new(CloseCode::ConnectivityFault)),
        ScenarioKind::ScriptedFault(ScriptedFaultScenario::new(CloseCode::ApplicationFault)),
        ScenarioKind::Fuzz(FuzzScenario),
    ]
}

/// Room name for a scenario. Derived from the name alone so reruns of the
/// same scenario land in the same room and different scenarios never share.
pub fn document_id(prefix: &str, scenario: &str) -> String {
    format!("{prefix}-{}", scenario.replace(' ', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_names_are_unique() {
        let names: Vec<_> = catalogue().iter().map(Scenario::display_name).collect();

        assert_eq!(
            names,
            [
                "one client offline with offline changes - connection issue (code 1005)",
                "one client offline with offline changes - app server issue (code 4002)",
                "fuzzy",
            ],
            "catalogue order and names"
        );
    }

    #[test]
    fn document_id_replaces_spaces() {
        assert_eq!(
            document_id("e2e-offline", "one client offline"),
            "e2e-offline-one-client-offline",
            "spaces become dashes"
        );
    }

    #[tokio::test]
    async fn reset_without_sessions_is_an_error() {
        let config = HarnessConfig::default();
        let ctx = ScenarioContext::new("solo", &config, Vec::new(), ActionPicker::new(1));

        let err = ctx.reset().await.unwrap_err();
        assert!(
            err.to_string().contains("without sessions"),
            "unexpected error {err}"
        );
    }

    #[test]
    fn missing_sessions_are_reported() {
        let config = HarnessConfig::default();
        let ctx = ScenarioContext::new("solo", &config, Vec::new(), ActionPicker::new(1));

        assert!(
            matches!(
                ctx.require_sessions(2),
                Err(HarnessError::NotEnoughSessions {
                    required: 2,
                    available: 0
                })
            ),
            "two sessions are required"
        );
    }
}
