//! Command and query surface of the page under test.
//!
//! The harness never talks to an automation tool directly. Every backend
//! implements [`DocumentSurface`], and sessions are opened through a
//! [`SurfaceFactory`] bound to one backend.

use core::fmt;
use core::str::FromStr;

use async_trait::async_trait;
use eyre::Result as EyreResult;
use serde_json::Value;

use crate::error::HarnessError;

/// Zero-argument triggers exposed by the page under test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    Push,
    Delete,
    Move,
    Undo,
    Redo,
    Clear,
    DropTransport,
    RejectAsConnectivityFault,
    RejectAsApplicationFault,
}

impl Command {
    pub const ALL: [Self; 9] = [
        Self::Push,
        Self::Delete,
        Self::Move,
        Self::Undo,
        Self::Redo,
        Self::Clear,
        Self::DropTransport,
        Self::RejectAsConnectivityFault,
        Self::RejectAsApplicationFault,
    ];

    /// Stable identifier of the command on the page.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Delete => "delete",
            Self::Move => "move",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::Clear => "clear",
            Self::DropTransport => "dropTransport",
            Self::RejectAsConnectivityFault => "rejectAsConnectivityFault",
            Self::RejectAsApplicationFault => "rejectAsApplicationFault",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| HarnessError::UnknownCommand(s.to_owned()))
    }
}

/// Named pieces of exposed document state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateKey {
    Items,
    ConnectionId,
}

impl StateKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Items => "items",
            Self::ConnectionId => "connectionId",
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateKey {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "items" => Ok(Self::Items),
            "connectionId" => Ok(Self::ConnectionId),
            other => Err(HarnessError::UnknownStateKey(other.to_owned())),
        }
    }
}

/// One client's view of the page under test.
///
/// Command methods return once the trigger has been dispatched. They do not
/// wait for the mutation to be acknowledged or propagated to peers.
#[async_trait]
pub trait DocumentSurface: Send + Sync {
    async fn push(&self) -> EyreResult<()>;
    async fn delete(&self) -> EyreResult<()>;
    async fn move_item(&self) -> EyreResult<()>;
    async fn undo(&self) -> EyreResult<()>;
    async fn redo(&self) -> EyreResult<()>;
    async fn clear(&self) -> EyreResult<()>;

    /// Closes the live transport without a close code.
    async fn drop_transport(&self) -> EyreResult<()>;
    async fn reject_as_connectivity_fault(&self) -> EyreResult<()>;
    async fn reject_as_application_fault(&self) -> EyreResult<()>;

    async fn items(&self) -> EyreResult<Vec<Value>>;
    async fn connection_id(&self) -> EyreResult<Value>;

    /// Releases the client. Must be callable on a broken transport.
    async fn close(&self) -> EyreResult<()>;
}

/// Opens isolated clients bound to a document.
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    async fn open(&self, document_id: &str) -> EyreResult<Box<dyn DocumentSurface>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_round_trip() {
        for command in Command::ALL {
            let parsed: Command = command.as_str().parse().expect("known command");
            assert_eq!(parsed, command, "parsing {command} should yield itself");
        }
    }

    #[test]
    fn unknown_command_is_rejected() {
        let err = "closeWebsocket".parse::<Command>().unwrap_err();
        assert!(
            matches!(err, HarnessError::UnknownCommand(ref name) if name == "closeWebsocket"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn state_keys_use_page_identifiers() {
        assert_eq!(StateKey::Items.to_string(), "items", "items key");
        assert_eq!(
            "connectionId".parse::<StateKey>().expect("known key"),
            StateKey::ConnectionId,
            "connection id key"
        );
        assert!("itemsCount".parse::<StateKey>().is_err(), "unknown key");
    }
}
