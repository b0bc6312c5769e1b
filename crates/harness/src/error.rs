use serde_json::Value;
use thiserror::Error;

/// Failures the harness itself recognises.
///
/// Transport and collaborator errors that the harness does not classify are
/// carried as plain [`eyre::Report`]s and propagate unmodified.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HarnessError {
    #[error("sessions did not converge within {timeout_ms} ms: {}", format_states(.observed))]
    Diverged {
        timeout_ms: u128,
        observed: Vec<(usize, Vec<Value>)>,
        differing: Vec<usize>,
    },

    #[error("connection id changed across application fault: before {before}, after {after}")]
    IdentityDrift { before: Value, after: Value },

    #[error("expected {expected} items on every session, observed {}", format_counts(.observed))]
    ItemCountMismatch {
        expected: usize,
        observed: Vec<(usize, usize)>,
    },

    #[error("scenario needs at least {required} sessions, {available} configured")]
    NotEnoughSessions { required: usize, available: usize },

    #[error("webdriver error '{error}': {message}")]
    WebDriver { error: String, message: String },

    #[error("unexpected '{key}' state: {value}")]
    UnexpectedState { key: &'static str, value: Value },

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("unknown state key '{0}'")]
    UnknownStateKey(String),
}

fn format_states(observed: &[(usize, Vec<Value>)]) -> String {
    observed
        .iter()
        .map(|(index, items)| format!("session {index} => {}", Value::Array(items.clone())))
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_counts(observed: &[(usize, usize)]) -> String {
    observed
        .iter()
        .map(|(index, count)| format!("session {index} => {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}
