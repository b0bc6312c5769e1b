use eyre::Result as EyreResult;
use serde_json::Value;
use tracing::{debug, warn};

use crate::surface::{Command, DocumentSurface, StateKey, SurfaceFactory};

/// One independent client connection to the shared document.
///
/// Identity is the position in the scenario's session list.
pub struct Session {
    index: usize,
    document_id: String,
    surface: Box<dyn DocumentSurface>,
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("index", &self.index)
            .field("document_id", &self.document_id)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub async fn create(
        factory: &dyn SurfaceFactory,
        index: usize,
        document_id: &str,
    ) -> EyreResult<Self> {
        debug!(session = index, document_id, "Opening session");

        let surface = factory.open(document_id).await?;

        Ok(Self::from_surface(index, document_id, surface))
    }

    pub fn from_surface(
        index: usize,
        document_id: &str,
        surface: Box<dyn DocumentSurface>,
    ) -> Self {
        Self {
            index,
            document_id: document_id.to_owned(),
            surface,
        }
    }

    pub const fn index(&self) -> usize {
        self.index
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Dispatches a command. Returns once the trigger is dispatched, not once
    /// the mutation has propagated.
    pub async fn send_command(&self, command: Command) -> EyreResult<()> {
        debug!(session = self.index, %command, "Dispatching command");

        match command {
            Command::Push => self.surface.push().await,
            Command::Delete => self.surface.delete().await,
            Command::Move => self.surface.move_item().await,
            Command::Undo => self.surface.undo().await,
            Command::Redo => self.surface.redo().await,
            Command::Clear => self.surface.clear().await,
            Command::DropTransport => self.surface.drop_transport().await,
            Command::RejectAsConnectivityFault => {
                self.surface.reject_as_connectivity_fault().await
            }
            Command::RejectAsApplicationFault => self.surface.reject_as_application_fault().await,
        }
    }

    pub async fn query_state(&self, key: StateKey) -> EyreResult<Value> {
        match key {
            StateKey::Items => Ok(Value::Array(self.surface.items().await?)),
            StateKey::ConnectionId => self.surface.connection_id().await,
        }
    }

    pub async fn items(&self) -> EyreResult<Vec<Value>> {
        self.surface.items().await
    }

    pub async fn connection_id(&self) -> EyreResult<Value> {
        self.surface.connection_id().await
    }

    /// Releases the client. Never fails; teardown errors are logged and
    /// swallowed so they cannot mask the scenario outcome.
    pub async fn close(self) {
        if let Err(err) = self.surface.close().await {
            warn!(session = self.index, %err, "Failed to close session");
        }
    }
}

/// Closes every session, best effort.
pub async fn close_all(sessions: Vec<Session>) {
    for session in sessions {
        session.close().await;
    }
}

#[cfg(test)]
mod tests {
    use eyre::bail;
    use serde_json::json;

    use super::*;
    use crate::sim::{SimulatedServer, SimulationConfig};

    struct BrokenSurface;

    #[async_trait::async_trait]
    impl DocumentSurface for BrokenSurface {
        async fn push(&self) -> EyreResult<()> {
            bail!("page crashed")
        }
        async fn delete(&self) -> EyreResult<()> {
            bail!("page crashed")
        }
        async fn move_item(&self) -> EyreResult<()> {
            bail!("page crashed")
        }
        async fn undo(&self) -> EyreResult<()> {
            bail!("page crashed")
        }
        async fn redo(&self) -> EyreResult<()> {
            bail!("page crashed")
        }
        async fn clear(&self) -> EyreResult<()> {
            bail!("page crashed")
        }
        async fn drop_transport(&self) -> EyreResult<()> {
            bail!("page crashed")
        }
        async fn reject_as_connectivity_fault(&self) -> EyreResult<()> {
            bail!("page crashed")
        }
        async fn reject_as_application_fault(&self) -> EyreResult<()> {
            bail!("page crashed")
        }
        async fn items(&self) -> EyreResult<Vec<Value>> {
            bail!("page crashed")
        }
        async fn connection_id(&self) -> EyreResult<Value> {
            bail!("page crashed")
        }
        async fn close(&self) -> EyreResult<()> {
            bail!("page crashed")
        }
    }

    #[tokio::test]
    async fn close_swallows_surface_errors() {
        let session = Session::from_surface(0, "room", Box::new(BrokenSurface));
        session.close().await;
    }

    #[tokio::test]
    async fn command_errors_propagate_unmodified() {
        let session = Session::from_surface(0, "room", Box::new(BrokenSurface));
        let err = session.send_command(Command::Push).await.unwrap_err();
        assert_eq!(err.to_string(), "page crashed", "error should not be wrapped");
    }

    #[tokio::test]
    async fn query_state_exposes_items_as_array() {
        let server = SimulatedServer::new(SimulationConfig::default());
        let session = Session::create(&server, 0, "room").await.expect("open");

        session.send_command(Command::Push).await.expect("push");

        let items = session.query_state(StateKey::Items).await.expect("items");
        assert_eq!(
            items.as_array().map(Vec::len),
            Some(1),
            "items should be a one element array"
        );
        assert_eq!(
            session
                .query_state(StateKey::ConnectionId)
                .await
                .expect("connection id"),
            json!(1),
            "first connection in a room gets id 1"
        );
    }
}
