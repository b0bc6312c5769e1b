use core::fmt;

use eyre::Result as EyreResult;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::session::Session;
use crate::surface::Command;

/// Close codes owned by the sync protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CloseCode {
    /// Network level fault. Reconnects with a new connection id.
    ConnectivityFault,
    /// Server side application rejection. Reconnects keeping the connection id.
    ApplicationFault,
}

impl CloseCode {
    pub const CONNECTIVITY_FAULT_CODE: u16 = 1005;
    pub const APPLICATION_FAULT_CODE: u16 = 4002;

    pub const fn code(self) -> u16 {
        match self {
            Self::ConnectivityFault => Self::CONNECTIVITY_FAULT_CODE,
            Self::ApplicationFault => Self::APPLICATION_FAULT_CODE,
        }
    }

    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            Self::CONNECTIVITY_FAULT_CODE => Some(Self::ConnectivityFault),
            Self::APPLICATION_FAULT_CODE => Some(Self::ApplicationFault),
            _ => None,
        }
    }

    /// Whether the reconnect contract requires the same connection id.
    pub const fn preserves_identity(self) -> bool {
        matches!(self, Self::ApplicationFault)
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectivityFault => write!(f, "connection issue (code {})", self.code()),
            Self::ApplicationFault => write!(f, "app server issue (code {})", self.code()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FaultEvent {
    /// Abrupt network drop. The harness does not pick the close code.
    TransportClose,
    ServerReject(CloseCode),
}

impl FaultEvent {
    pub const fn command(self) -> Command {
        match self {
            Self::TransportClose => Command::DropTransport,
            Self::ServerReject(CloseCode::ConnectivityFault) => Command::RejectAsConnectivityFault,
            Self::ServerReject(CloseCode::ApplicationFault) => Command::RejectAsApplicationFault,
        }
    }
}

/// Forces a session's transport closed.
///
/// All operations return once the close has been requested. Reconnection is
/// the sync engine's business; its outcome is observed through the oracle and
/// the `connectionId` query.
#[derive(Clone, Copy, Debug, Default)]
pub struct FaultInjector;

impl FaultInjector {
    pub async fn inject(session: &Session, event: FaultEvent) -> EyreResult<()> {
        info!(session = session.index(), ?event, "Injecting fault");

        session.send_command(event.command()).await
    }

    pub async fn drop_transport(session: &Session) -> EyreResult<()> {
        Self::inject(session, FaultEvent::TransportClose).await
    }

    pub async fn reject_as_connectivity_fault(session: &Session) -> EyreResult<()> {
        Self::inject(session, FaultEvent::ServerReject(CloseCode::ConnectivityFault)).await
    }

    pub async fn reject_as_application_fault(session: &Session) -> EyreResult<()> {
        Self::inject(session, FaultEvent::ServerReject(CloseCode::ApplicationFault)).await
    }
}
