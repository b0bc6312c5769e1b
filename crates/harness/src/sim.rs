//! In-memory stand-in for the page under test and its sync engine.
//!
//! Each room keeps an authoritative item list. Online clients edit it
//! directly; offline clients buffer their edits on top of the last state they
//! saw and replay them when they reconnect. Reconnects complete lazily against
//! tokio's clock, so scenarios run deterministically under paused time.

use core::time::Duration;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result as EyreResult;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::{sleep, Instant};

use crate::fault::CloseCode;
use crate::surface::{DocumentSurface, SurfaceFactory};

mod document;
mod room;

use room::Room;

#[derive(Clone, Copy, Debug)]
pub struct SimulationConfig {
    pub connectivity_reconnect_delay: Duration,
    pub application_reconnect_delay: Duration,
    /// Applied before every command takes effect.
    pub command_latency: Duration,
    /// When false, edits made offline are dropped on reconnect.
    pub replay_offline_changes: bool,
    /// When false, an application fault assigns a new connection id.
    pub preserve_identity_on_application_fault: bool,
    /// When false, a reconnected client never adopts the room state again.
    pub resync_on_reconnect: bool,
    /// When false, dropping the transport leaves the client online and its
    /// edits keep reaching the room.
    pub isolate_offline_edits: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            connectivity_reconnect_delay: Duration::from_millis(1_000),
            application_reconnect_delay: Duration::from_millis(2_500),
            command_latency: Duration::ZERO,
            replay_offline_changes: true,
            preserve_identity_on_application_fault: true,
            resync_on_reconnect: true,
            isolate_offline_edits: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct SimulatedServer {
    config: SimulationConfig,
    rooms: Mutex<HashMap<String, Arc<Mutex<Room>>>>,
}

impl SimulatedServer {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            rooms: Mutex::default(),
        }
    }

    fn room(&self, document_id: &str) -> Arc<Mutex<Room>> {
        Arc::clone(
            self.rooms
                .lock()
                .entry(document_id.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(Room::new(document_id, self.config)))),
        )
    }

    /// Authoritative items of a room, after any due reconnects.
    pub fn room_items(&self, document_id: &str) -> Vec<Value> {
        let room = self.room(document_id);
        let mut room = room.lock();
        room.advance(Instant::now());
        room.items().to_vec()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }
}

#[async_trait]
impl SurfaceFactory for SimulatedServer {
    async fn open(&self, document_id: &str) -> EyreResult<Box<dyn DocumentSurface>> {
        let room = self.room(document_id);
        let slot = room.lock().join();

        Ok(Box::new(SimulatedClient {
            room,
            slot,
            latency: self.config.command_latency,
        }))
    }
}

#[derive(Debug)]
pub struct SimulatedClient {
    room: Arc<Mutex<Room>>,
    slot: usize,
    latency: Duration,
}

impl SimulatedClient {
    async fn command<F>(&self, f: F) -> EyreResult<()>
    where
        F: FnOnce(&mut Room, usize, Instant) -> EyreResult<()> + Send,
    {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        let now = Instant::now();
        let mut room = self.room.lock();
        room.advance(now);
        f(&mut room, self.slot, now)
    }

    fn query<T>(&self, f: impl FnOnce(&Room, usize) -> EyreResult<T>) -> EyreResult<T> {
        let mut room = self.room.lock();
        room.advance(Instant::now());
        f(&room, self.slot)
    }
}

#[async_trait]
impl DocumentSurface for SimulatedClient {
    async fn push(&self) -> EyreResult<()> {
        self.command(|room, slot, _| room.push(slot)).await
    }

    async fn delete(&self) -> EyreResult<()> {
        self.command(|room, slot, _| room.delete(slot)).await
    }

    async fn move_item(&self) -> EyreResult<()> {
        self.command(|room, slot, _| room.move_item(slot)).await
    }

    async fn undo(&self) -> EyreResult<()> {
        self.command(|room, slot, _| room.undo(slot)).await
    }

    async fn redo(&self) -> EyreResult<()> {
        self.command(|room, slot, _| room.redo(slot)).await
    }

    async fn clear(&self) -> EyreResult<()> {
        self.command(|room, slot, _| room.clear(slot)).await
    }

    async fn drop_transport(&self) -> EyreResult<()> {
        self.command(|room, slot, _| room.drop_transport(slot)).await
    }

    async fn reject_as_connectivity_fault(&self) -> EyreResult<()> {
        self.command(|room, slot, now| room.reject(slot, CloseCode::ConnectivityFault, now))
            .await
    }

    async fn reject_as_application_fault(&self) -> EyreResult<()> {
        self.command(|room, slot, now| room.reject(slot, CloseCode::ApplicationFault, now))
            .await
    }

    async fn items(&self) -> EyreResult<Vec<Value>> {
        self.query(|room, slot| room.view(slot))
    }

    async fn connection_id(&self) -> EyreResult<Value> {
        self.query(|room, slot| room.connection_id(slot))
    }

    async fn close(&self) -> EyreResult<()> {
        self.room.lock().close(self.slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rooms_are_isolated_by_document_id() {
        let server = SimulatedServer::new(SimulationConfig::default());
        let a = server.open("room-a").await.expect("open");
        let b = server.open("room-b").await.expect("open");

        a.push().await.expect("push");

        assert_eq!(a.items().await.expect("items").len(), 1, "own room updated");
        assert!(b.items().await.expect("items").is_empty(), "other room untouched");
        assert_eq!(server.room_count(), 2, "two rooms");
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_completes_after_delay() {
        let server = SimulatedServer::new(SimulationConfig::default());
        let first = server.open("room").await.expect("open");
        let second = server.open("room").await.expect("open");

        first.drop_transport().await.expect("drop");
        first.push().await.expect("push");
        first.reject_as_connectivity_fault().await.expect("reject");

        assert!(second.items().await.expect("items").is_empty(), "still buffered");

        sleep(Duration::from_millis(1_000)).await;

        assert_eq!(
            second.items().await.expect("items"),
            vec![json!("c1-1")],
            "replayed after reconnect"
        );
        assert_eq!(server.room_items("room"), vec![json!("c1-1")], "room state");
    }

    #[tokio::test(start_paused = true)]
    async fn latency_delays_command_effect() {
        let server = SimulatedServer::new(SimulationConfig {
            command_latency: Duration::from_millis(200),
            ..SimulationConfig::default()
        });
        let client = server.open("room").await.expect("open");

        let started = Instant::now();
        client.push().await.expect("push");

        assert_eq!(started.elapsed(), Duration::from_millis(200), "latency applied");
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let server = SimulatedServer::default();
        let client = server.open("room").await.expect("open");

        client.close().await.expect("close");
        client.close().await.expect("close again");
        assert!(client.push().await.is_err(), "closed client rejects commands");
    }
}
