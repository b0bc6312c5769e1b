use core::time::Duration;

use camino::Utf8Path;
use eyre::{Result as EyreResult, WrapErr};
use serde::{Deserialize, Serialize};
use tokio::fs::read;

use crate::surface::{Command, StateKey};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarnessConfig {
    pub target: TargetConfig,
    /// Sessions opened per scenario.
    pub sessions: usize,
    pub room_prefix: String,
    pub oracle: OracleConfig,
    pub faults: FaultsConfig,
    pub fuzz: FuzzConfig,
    /// Names of known-unstable scenarios, reported but not run by default.
    pub quarantine: Vec<String>,
    pub seed: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            sessions: 2,
            room_prefix: "e2e-offline".to_owned(),
            oracle: OracleConfig::default(),
            faults: FaultsConfig::default(),
            fuzz: FuzzConfig::default(),
            quarantine: vec!["fuzzy".to_owned()],
            seed: None,
        }
    }
}

impl HarnessConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub async fn load(path: &Utf8Path) -> EyreResult<Self> {
        let bytes = read(path)
            .await
            .wrap_err_with(|| format!("failed to read config file '{path}'"))?;

        serde_json::from_slice(&bytes)
            .wrap_err_with(|| format!("failed to parse config file '{path}'"))
    }

    pub fn is_quarantined(&self, scenario: &str) -> bool {
        self.quarantine.iter().any(|name| name == scenario)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetConfig {
    /// Page under test. The room is passed as the `room` query parameter.
    pub base_url: String,
    pub webdriver_url: String,
    pub browser_name: String,
    pub headless: bool,
    pub selectors: Selectors,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3007/offline/".to_owned(),
            webdriver_url: "http://localhost:4444".to_owned(),
            browser_name: "chrome".to_owned(),
            headless: true,
            selectors: Selectors::default(),
        }
    }
}

/// CSS selectors of the page's command buttons and state elements.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Selectors {
    pub push: String,
    pub delete: String,
    pub r#move: String,
    pub undo: String,
    pub redo: String,
    pub clear: String,
    pub drop_transport: String,
    pub reject_as_connectivity_fault: String,
    pub reject_as_application_fault: String,
    pub items: String,
    pub connection_id: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            push: "#push".to_owned(),
            delete: "#delete".to_owned(),
            r#move: "#move".to_owned(),
            undo: "#undo".to_owned(),
            redo: "#redo".to_owned(),
            clear: "#clear".to_owned(),
            drop_transport: "#closeWebsocket".to_owned(),
            reject_as_connectivity_fault: "#sendCloseEventConnectionError".to_owned(),
            reject_as_application_fault: "#sendCloseEventAppError".to_owned(),
            items: "#items".to_owned(),
            connection_id: "#connectionId".to_owned(),
        }
    }
}

impl Selectors {
    pub fn command(&self, command: Command) -> &str {
        match command {
            Command::Push => &self.push,
            Command::Delete => &self.delete,
            Command::Move => &self.r#move,
            Command::Undo => &self.undo,
            Command::Redo => &self.redo,
            Command::Clear => &self.clear,
            Command::DropTransport => &self.drop_transport,
            Command::RejectAsConnectivityFault => &self.reject_as_connectivity_fault,
            Command::RejectAsApplicationFault => &self.reject_as_application_fault,
        }
    }

    pub fn state(&self, key: StateKey) -> &str {
        match key {
            StateKey::Items => &self.items,
            StateKey::ConnectionId => &self.connection_id,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OracleConfig {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
    /// Budget for item-count expectations.
    pub item_count_timeout_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            timeout_ms: 10_000,
            item_count_timeout_ms: 5_000,
        }
    }
}

impl OracleConfig {
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub const fn item_count_timeout(&self) -> Duration {
        Duration::from_millis(self.item_count_timeout_ms)
    }
}

/// How long to let a fault settle and how long the oracle may then poll.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultProfile {
    pub settle_ms: u64,
    pub timeout_ms: u64,
}

impl FaultProfile {
    pub const fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FaultsConfig {
    /// Pause after dropping a transport before editing offline.
    pub outage_delay_ms: u64,
    pub connectivity: FaultProfile,
    /// Server side rejects reconnect slower, so this profile settles longer.
    pub application: FaultProfile,
}

impl Default for FaultsConfig {
    fn default() -> Self {
        Self {
            outage_delay_ms: 50,
            connectivity: FaultProfile {
                settle_ms: 3_000,
                timeout_ms: 10_000,
            },
            application: FaultProfile {
                settle_ms: 5_000,
                timeout_ms: 10_000,
            },
        }
    }
}

impl FaultsConfig {
    pub const fn outage_delay(&self) -> Duration {
        Duration::from_millis(self.outage_delay_ms)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FuzzConfig {
    pub online_rounds: usize,
    pub offline_rounds: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Wait after the offline burst before reconnecting.
    pub offline_settle_ms: u64,
    pub timeout_ms: u64,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            online_rounds: 10,
            offline_rounds: 50,
            min_delay_ms: 30,
            max_delay_ms: 70,
            offline_settle_ms: 2_000,
            timeout_ms: 30_000,
        }
    }
}

impl FuzzConfig {
    pub const fn offline_settle(&self) -> Duration {
        Duration::from_millis(self.offline_settle_ms)
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: HarnessConfig = serde_json::from_str(
            r#"{
                "sessions": 3,
                "target": { "baseUrl": "http://127.0.0.1:3000/offline/" },
                "faults": { "application": { "settleMs": 8000, "timeoutMs": 20000 } }
            }"#,
        )
        .expect("valid config");

        assert_eq!(config.sessions, 3, "overridden");
        assert_eq!(config.target.base_url, "http://127.0.0.1:3000/offline/", "overridden");
        assert_eq!(config.target.selectors.push, "#push", "default selector kept");
        assert_eq!(config.faults.application.settle_ms, 8_000, "overridden");
        assert_eq!(config.faults.connectivity.settle_ms, 3_000, "default profile kept");
        assert_eq!(config.oracle.poll_interval_ms, 100, "default oracle kept");
        assert!(config.is_quarantined("fuzzy"), "default quarantine kept");
    }

    #[test]
    fn selectors_cover_every_command() {
        let selectors = Selectors::default();
        for command in Command::ALL {
            assert!(
                selectors.command(command).starts_with('#'),
                "{command} has a selector"
            );
        }
        assert_eq!(selectors.state(StateKey::Items), "#items", "items selector");
        assert_eq!(
            selectors.command(Command::DropTransport),
            "#closeWebsocket",
            "drop transport selector"
        );
    }
}
