//! Convergence detection across sessions.
//!
//! States are compared by value and in order. Two sessions holding the same
//! items in a different order have not converged.

use core::time::Duration;
use std::collections::HashMap;

use eyre::Result as EyreResult;
use serde::Serialize;
use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::error::HarnessError;
use crate::session::Session;

/// Outcome of one [`await_convergence`] call.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvergenceResult {
    pub converged: bool,
    /// Last snapshot, ordered by session index.
    pub observed_states: Vec<(usize, Vec<Value>)>,
    pub elapsed: Duration,
}

impl ConvergenceResult {
    /// Indices of sessions whose state differs from the most common one.
    ///
    /// Ties between equally common states are broken by the serialized state so
    /// the answer does not depend on poll order.
    pub fn differing_sessions(&self) -> Vec<usize> {
        let keys: Vec<(usize, String)> = self
            .observed_states
            .iter()
            .map(|(index, items)| (*index, Value::Array(items.clone()).to_string()))
            .collect();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for (_, key) in &keys {
            *counts.entry(key.as_str()).or_default() += 1;
        }

        let majority = counts
            .iter()
            .max_by(|(k1, c1), (k2, c2)| c1.cmp(c2).then_with(|| k1.cmp(k2)))
            .map(|(key, _)| *key);

        keys.iter()
            .filter(|(_, key)| Some(key.as_str()) != majority)
            .map(|(index, _)| *index)
            .collect()
    }

    pub fn ensure_converged(self, timeout: Duration) -> Result<Self, HarnessError> {
        if self.converged {
            return Ok(self);
        }

        let differing = self.differing_sessions();
        Err(HarnessError::Diverged {
            timeout_ms: timeout.as_millis(),
            observed: self.observed_states,
            differing,
        })
    }
}

/// Floor for the poll interval. A zero interval would never yield to the
/// clock under paused time.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

fn next_poll(poll_interval: Duration, deadline: Instant) -> Duration {
    let remaining = deadline.saturating_duration_since(Instant::now());
    poll_interval.min(remaining).max(MIN_POLL_INTERVAL)
}

fn all_equal(states: &[(usize, Vec<Value>)]) -> bool {
    match states.split_first() {
        Some(((_, first), rest)) => rest.iter().all(|(_, items)| items == first),
        None => true,
    }
}

async fn snapshot(sessions: &[Session]) -> EyreResult<Vec<(usize, Vec<Value>)>> {
    let mut states = Vec::with_capacity(sessions.len());
    for session in sessions {
        states.push((session.index(), session.items().await?));
    }
    Ok(states)
}

/// Polls every session until all item sequences are equal or `timeout`
/// elapses. Returns at first detection.
///
/// Query failures propagate; a non-converged outcome is not an error here.
pub async fn await_convergence(
    sessions: &[Session],
    timeout: Duration,
    poll_interval: Duration,
) -> EyreResult<ConvergenceResult> {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut polls = 0_u32;

    loop {
        let observed_states = snapshot(sessions).await?;
        polls += 1;

        if all_equal(&observed_states) {
            info!(
                polls,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Sessions converged"
            );
            return Ok(ConvergenceResult {
                converged: true,
                observed_states,
                elapsed: started.elapsed(),
            });
        }

        if Instant::now() >= deadline {
            info!(polls, timeout_ms = timeout.as_millis() as u64, "Sessions did not converge");
            return Ok(ConvergenceResult {
                converged: false,
                observed_states,
                elapsed: started.elapsed(),
            });
        }

        debug!(polls, "Sessions not converged yet");

        sleep(next_poll(poll_interval, deadline)).await;
    }
}

/// Polls until every session holds exactly `expected` items.
pub async fn expect_item_count(
    sessions: &[Session],
    expected: usize,
    timeout: Duration,
    poll_interval: Duration,
) -> EyreResult<()> {
    let deadline = Instant::now() + timeout;

    loop {
        let mut observed = Vec::with_capacity(sessions.len());
        for session in sessions {
            observed.push((session.index(), session.items().await?.len()));
        }

        if observed.iter().all(|(_, count)| *count == expected) {
            return Ok(());
        }

        if Instant::now() >= deadline {
            return Err(HarnessError::ItemCountMismatch { expected, observed }.into());
        }

        sleep(next_poll(poll_interval, deadline)).await;
    }
}

pub fn ensure_identity_preserved(before: &Value, after: &Value) -> Result<(), HarnessError> {
    if before == after {
        return Ok(());
    }

    Err(HarnessError::IdentityDrift {
        before: before.clone(),
        after: after.clone(),
    })
}
