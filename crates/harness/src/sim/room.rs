use eyre::{bail, Result as EyreResult};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::debug;

use super::document::{History, HistoryEntry, Mutation};
use super::SimulationConfig;
use crate::fault::CloseCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Link {
    Online,
    /// `reconnect` is `None` while nothing has told the client its transport
    /// is gone.
    Offline {
        reconnect: Option<(Instant, CloseCode)>,
    },
    Closed,
}

#[derive(Debug)]
struct Client {
    ordinal: usize,
    connection_id: u64,
    link: Link,
    /// Last state received from the room.
    snapshot: Vec<Value>,
    /// Edits made while offline, in dispatch order.
    pending: Vec<Mutation>,
    history: History,
    next_seq: u64,
}

impl Client {
    fn view(&self, room_items: &[Value]) -> Vec<Value> {
        if self.link == Link::Online {
            return room_items.to_vec();
        }

        let mut items = self.snapshot.clone();
        for mutation in &self.pending {
            mutation.apply(&mut items);
        }
        items
    }
}

/// One shared document and the clients bound to it.
#[derive(Debug)]
pub(super) struct Room {
    name: String,
    config: SimulationConfig,
    items: Vec<Value>,
    clients: Vec<Client>,
    next_connection_id: u64,
}

impl Room {
    pub(super) fn new(name: &str, config: SimulationConfig) -> Self {
        Self {
            name: name.to_owned(),
            config,
            items: Vec::new(),
            clients: Vec::new(),
            next_connection_id: 1,
        }
    }

    pub(super) fn items(&self) -> &[Value] {
        &self.items
    }

    fn allocate_connection_id(&mut self) -> u64 {
        let id = self.next_connection_id;
        self.next_connection_id += 1;
        id
    }

    /// Registers a new online client and returns its slot.
    pub(super) fn join(&mut self) -> usize {
        let connection_id = self.allocate_connection_id();
        let slot = self.clients.len();

        self.clients.push(Client {
            ordinal: slot + 1,
            connection_id,
            link: Link::Online,
            snapshot: Vec::new(),
            pending: Vec::new(),
            history: History::default(),
            next_seq: 1,
        });

        debug!(room = %self.name, slot, connection_id, "Client joined");

        slot
    }

    /// Completes every reconnect that is due, earliest first.
    pub(super) fn advance(&mut self, now: Instant) {
        loop {
            let due = self
                .clients
                .iter()
                .enumerate()
                .filter_map(|(slot, client)| match client.link {
                    Link::Offline {
                        reconnect: Some((at, code)),
                    } if at <= now => Some((at, slot, code)),
                    _ => None,
                })
                .min_by_key(|(at, slot, _)| (*at, *slot));

            let Some((_, slot, code)) = due else {
                return;
            };

            self.reconnect(slot, code);
        }
    }

    fn reconnect(&mut self, slot: usize, code: CloseCode) {
        let keep_identity =
            code.preserves_identity() && self.config.preserve_identity_on_application_fault;
        let connection_id = if keep_identity {
            self.clients[slot].connection_id
        } else {
            self.allocate_connection_id()
        };

        let client = &mut self.clients[slot];
        let pending = core::mem::take(&mut client.pending);
        let local_view = {
            let mut items = client.snapshot.clone();
            for mutation in &pending {
                mutation.apply(&mut items);
            }
            items
        };

        if self.config.replay_offline_changes {
            for mutation in &pending {
                mutation.apply(&mut self.items);
            }
        }

        let client = &mut self.clients[slot];
        client.connection_id = connection_id;

        if self.config.resync_on_reconnect {
            client.link = Link::Online;
            client.snapshot.clear();
        } else {
            client.link = Link::Offline { reconnect: None };
            client.snapshot = local_view;
        }

        debug!(
            room = %self.name,
            slot,
            %code,
            connection_id,
            replayed = pending.len(),
            "Client reconnected"
        );
    }

    fn client_mut(&mut self, slot: usize) -> EyreResult<&mut Client> {
        let Some(client) = self.clients.get_mut(slot) else {
            bail!("unknown client slot {slot}");
        };
        if client.link == Link::Closed {
            bail!("client {} is closed", client.ordinal);
        }
        Ok(client)
    }

    pub(super) fn view(&self, slot: usize) -> EyreResult<Vec<Value>> {
        let Some(client) = self.clients.get(slot) else {
            bail!("unknown client slot {slot}");
        };
        if client.link == Link::Closed {
            bail!("client {} is closed", client.ordinal);
        }
        Ok(client.view(&self.items))
    }

    pub(super) fn connection_id(&self, slot: usize) -> EyreResult<Value> {
        let Some(client) = self.clients.get(slot) else {
            bail!("unknown client slot {slot}");
        };
        Ok(json!(client.connection_id))
    }

    /// Applies an edit as seen by the client: straight to the room when
    /// online, buffered otherwise.
    fn submit(&mut self, slot: usize, mutation: Mutation) -> EyreResult<()> {
        let client = self.client_mut(slot)?;
        if client.link == Link::Online {
            mutation.apply(&mut self.items);
        } else {
            client.pending.push(mutation);
        }
        Ok(())
    }

    pub(super) fn push(&mut self, slot: usize) -> EyreResult<()> {
        let view = self.view(slot)?;
        let client = self.client_mut(slot)?;

        let value = json!(format!("c{}-{}", client.ordinal, client.next_seq));
        client.next_seq += 1;

        let forward = Mutation::Insert {
            index: view.len(),
            value: value.clone(),
        };
        client.history.record(HistoryEntry {
            forward: forward.clone(),
            inverse: Mutation::Remove { value },
        });

        self.submit(slot, forward)
    }

    pub(super) fn delete(&mut self, slot: usize) -> EyreResult<()> {
        let mut view = self.view(slot)?;
        let Some(value) = view.pop() else {
            return Ok(());
        };

        let forward = Mutation::Remove {
            value: value.clone(),
        };
        self.client_mut(slot)?.history.record(HistoryEntry {
            forward: forward.clone(),
            inverse: Mutation::Insert {
                index: view.len(),
                value,
            },
        });

        self.submit(slot, forward)
    }

    pub(super) fn move_item(&mut self, slot: usize) -> EyreResult<()> {
        let view = self.view(slot)?;
        if view.len() < 2 {
            return Ok(());
        }

        let value = view[0].clone();
        let forward = Mutation::Move {
            value: value.clone(),
            to: view.len() - 1,
        };
        self.client_mut(slot)?.history.record(HistoryEntry {
            forward: forward.clone(),
            inverse: Mutation::Move { value, to: 0 },
        });

        self.submit(slot, forward)
    }

    pub(super) fn undo(&mut self, slot: usize) -> EyreResult<()> {
        match self.client_mut(slot)?.history.undo() {
            Some(mutation) => self.submit(slot, mutation),
            None => Ok(()),
        }
    }

    pub(super) fn redo(&mut self, slot: usize) -> EyreResult<()> {
        match self.client_mut(slot)?.history.redo() {
            Some(mutation) => self.submit(slot, mutation),
            None => Ok(()),
        }
    }

    pub(super) fn clear(&mut self, slot: usize) -> EyreResult<()> {
        self.client_mut(slot)?.history.reset();
        self.submit(slot, Mutation::Clear)
    }

    pub(super) fn drop_transport(&mut self, slot: usize) -> EyreResult<()> {
        let isolate = self.config.isolate_offline_edits;
        let items = self.items.clone();
        let client = self.client_mut(slot)?;
        if isolate && client.link == Link::Online {
            client.snapshot = items;
            client.link = Link::Offline { reconnect: None };
        }
        Ok(())
    }

    pub(super) fn reject(&mut self, slot: usize, code: CloseCode, now: Instant) -> EyreResult<()> {
        let delay = match code {
            CloseCode::ConnectivityFault => self.config.connectivity_reconnect_delay,
            CloseCode::ApplicationFault => self.config.application_reconnect_delay,
        };
        let items = self.items.clone();
        let client = self.client_mut(slot)?;

        if client.link == Link::Online {
            client.snapshot = items;
        }
        client.link = Link::Offline {
            reconnect: Some((now + delay, code)),
        };

        Ok(())
    }

    pub(super) fn close(&mut self, slot: usize) {
        if let Some(client) = self.clients.get_mut(slot) {
            client.link = Link::Closed;
            client.pending.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use super::*;

    fn room(config: SimulationConfig) -> (Room, usize, usize) {
        let mut room = Room::new("test", config);
        let first = room.join();
        let second = room.join();
        (room, first, second)
    }

    #[test]
    fn online_edits_are_shared() {
        let (mut room, first, second) = room(SimulationConfig::default());

        room.push(first).expect("push");
        room.push(second).expect("push");

        assert_eq!(room.view(first).expect("view"), room.view(second).expect("view"), "shared");
        assert_eq!(room.items(), &[json!("c1-1"), json!("c2-1")], "both pushes landed");
    }

    #[test]
    fn offline_edits_stay_local_until_reconnect() {
        let (mut room, first, second) = room(SimulationConfig::default());
        let now = Instant::now();

        room.push(first).expect("push");
        room.drop_transport(first).expect("drop");
        room.push(first).expect("push");
        room.push(second).expect("push");

        assert_eq!(
            room.view(first).expect("view"),
            [json!("c1-1"), json!("c1-2")],
            "offline client sees only its own edit"
        );
        assert_eq!(
            room.view(second).expect("view"),
            [json!("c1-1"), json!("c2-1")],
            "peer does not see the offline edit"
        );

        room.reject(first, CloseCode::ConnectivityFault, now).expect("reject");
        room.advance(now + Duration::from_secs(5));

        assert_eq!(
            room.view(first).expect("view"),
            room.view(second).expect("view"),
            "converged after reconnect"
        );
        assert_eq!(room.items().len(), 3, "offline edit replayed");
    }

    #[test]
    fn reconnect_waits_for_its_delay() {
        let (mut room, first, _) = room(SimulationConfig::default());
        let now = Instant::now();

        room.reject(first, CloseCode::ApplicationFault, now).expect("reject");
        room.advance(now + Duration::from_millis(10));

        assert!(
            matches!(room.clients[first].link, Link::Offline { .. }),
            "still offline"
        );
    }

    #[test]
    fn identity_contract_follows_close_code() {
        let (mut room, first, _) = room(SimulationConfig::default());
        let now = Instant::now();
        let later = now + Duration::from_secs(10);

        let before = room.connection_id(first).expect("id");
        room.reject(first, CloseCode::ApplicationFault, now).expect("reject");
        room.advance(later);
        assert_eq!(room.connection_id(first).expect("id"), before, "4002 keeps id");

        room.reject(first, CloseCode::ConnectivityFault, later).expect("reject");
        room.advance(later + Duration::from_secs(10));
        assert_ne!(room.connection_id(first).expect("id"), before, "1005 assigns new id");
    }

    #[test]
    fn undo_redo_replay_own_edits() {
        let (mut room, first, _) = room(SimulationConfig::default());

        room.push(first).expect("push");
        room.push(first).expect("push");
        room.undo(first).expect("undo");
        assert_eq!(room.items(), &[json!("c1-1")], "last push undone");

        room.redo(first).expect("redo");
        assert_eq!(room.items(), &[json!("c1-1"), json!("c1-2")], "push redone");

        room.clear(first).expect("clear");
        room.undo(first).expect("undo");
        assert!(room.items().is_empty(), "clear resets history");
    }

    #[test]
    fn leaky_transport_keeps_client_online() {
        let (mut room, first, second) = room(SimulationConfig {
            isolate_offline_edits: false,
            ..SimulationConfig::default()
        });

        room.drop_transport(first).expect("drop");
        room.push(first).expect("push");
        room.push(second).expect("push");

        assert_eq!(
            room.view(first).expect("view"),
            [json!("c1-1"), json!("c2-1")],
            "peer edit reaches the dropped client"
        );
    }

    #[test]
    fn closed_client_rejects_commands() {
        let (mut room, first, _) = room(SimulationConfig::default());

        room.close(first);

        assert!(room.push(first).is_err(), "closed client cannot push");
        assert!(room.view(first).is_err(), "closed client has no view");
    }
}
