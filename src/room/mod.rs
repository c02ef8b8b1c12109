//! A named group of clients on one room server.
//!
//! Follows the `Room`/`RoomManager` actor split found in
//! `asifZaman0362-zgm-srv/src/room/{mod,actor}.rs`: this module is the
//! `Room` actor itself; [`crate::server::RoomServer`] plays the
//! `RoomManager` role of owning a keyed set of these.

pub mod messages;

use std::time::Duration;

use actix::{Actor, ActorContext, Addr, AsyncContext, Context, Handler, SpawnHandle};

use crate::bus::messages::{ClientSummary, RoomSummary};
use crate::server::RoomServer;
use crate::session::actor::Session;
use crate::session::message as session_msg;
use crate::utils::new_fast_hashmap;

use messages::*;

/// Immutable per-room configuration.
#[derive(Debug, Clone)]
pub struct RoomOptions {
    pub ping_interval: Option<Duration>,
    pub missed_pings_limit: u32,
    pub keep_alive: bool,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            ping_interval: None,
            missed_pings_limit: 1,
            keep_alive: false,
        }
    }
}

struct ClientHandle {
    addr: Addr<Session>,
    properties: Option<serde_json::Value>,
    missed_pings: u32,
}

pub struct Room {
    id: String,
    public_url: String,
    properties: Option<serde_json::Value>,
    options: RoomOptions,
    clients: ahash::HashMap<String, ClientHandle>,
    room_server: Addr<RoomServer>,
    ping_handle: Option<SpawnHandle>,
}

impl Room {
    pub fn new(
        id: String,
        public_url: String,
        properties: Option<serde_json::Value>,
        options: RoomOptions,
        room_server: Addr<RoomServer>,
    ) -> Self {
        Self {
            id,
            public_url,
            properties,
            options,
            clients: new_fast_hashmap(8),
            room_server,
            ping_handle: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn summary_of(&self, id: &str, handle: &ClientHandle) -> ClientSummary {
        ClientSummary {
            id: id.to_string(),
            properties: handle.properties.clone(),
        }
    }

    fn start_heartbeat(&mut self, ctx: &mut Context<Self>) {
        let Some(interval) = self.options.ping_interval else {
            return;
        };
        let limit = self.options.missed_pings_limit;
        let handle = ctx.run_interval(interval, move |act, ctx| {
            act.run_heartbeat_tick(ctx, limit);
        });
        self.ping_handle = Some(handle);
    }

    /// Each tick, a member at or above the miss limit is evicted; everyone
    /// else is pinged and their counter incremented. A pong (see [`Pong`])
    /// resets it to zero.
    fn run_heartbeat_tick(&mut self, ctx: &mut Context<Self>, limit: u32) {
        let expired: Vec<String> = self
            .clients
            .iter()
            .filter(|(_, handle)| handle.missed_pings >= limit)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            self.remove_and_notify(ctx, &id);
        }

        for handle in self.clients.values_mut() {
            handle.missed_pings += 1;
            handle.addr.do_send(session_msg::SendPing);
        }
    }

    /// Removes a member, notifies the owning server, closes its socket,
    /// and runs auto-GC if the room is now empty. Shared by the heartbeat
    /// eviction path and the explicit `leave` handler below.
    fn remove_and_notify(&mut self, ctx: &mut Context<Self>, id: &str) {
        if let Some(handle) = self.clients.remove(id) {
            self.room_server.do_send(RoomLifecycleEvent::Left {
                room_id: self.id.clone(),
                client: ClientSummary {
                    id: id.to_string(),
                    properties: handle.properties,
                },
            });
            handle.addr.do_send(session_msg::ForceClose);
            self.maybe_self_close(ctx);
        }
    }

    fn maybe_self_close(&mut self, ctx: &mut Context<Self>) {
        if self.clients.is_empty() && !self.options.keep_alive {
            ctx.stop();
        }
    }
}

impl Actor for Room {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_heartbeat(ctx);
    }

    /// Regardless of why the room stopped — empty auto-GC, explicit
    /// `terminate()`, or the owning server shutting down — this is the
    /// single place that notifies the server so it can drop the room from
    /// its map and publish `roomRemoved`.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.room_server.do_send(RoomClosed(self.id.clone()));
    }
}

impl Handler<TryJoin> for Room {
    type Result = Result<(), AlreadyInRoom>;

    /// Check-and-insert in one mailbox turn: this is what makes duplicate-id
    /// admission safe against two sockets racing to claim the same id. A
    /// caller that instead looked the id up via a separate message and sent
    /// the insert as a second, independent message would have an `.await`
    /// gap between the two in which both could observe the id as free.
    fn handle(&mut self, msg: TryJoin, _ctx: &mut Self::Context) -> Self::Result {
        let ClientJoin { id, properties, addr } = msg.0;
        if self.clients.contains_key(&id) {
            return Err(AlreadyInRoom);
        }
        self.clients.insert(
            id.clone(),
            ClientHandle {
                addr,
                properties: properties.clone(),
                missed_pings: 0,
            },
        );
        self.room_server.do_send(RoomLifecycleEvent::Joined {
            room_id: self.id.clone(),
            client: ClientSummary { id, properties },
        });
        Ok(())
    }
}

impl Handler<Leave> for Room {
    type Result = ();

    fn handle(&mut self, msg: Leave, ctx: &mut Self::Context) -> Self::Result {
        // absent: no-op.
        self.remove_and_notify(ctx, &msg.0);
    }
}

impl Handler<SendAll> for Room {
    type Result = ();

    fn handle(&mut self, msg: SendAll, _ctx: &mut Self::Context) -> Self::Result {
        for handle in self.clients.values() {
            handle.addr.do_send(session_msg::Deliver(msg.0.clone()));
        }
    }
}

impl Handler<SendTo> for Room {
    type Result = ();

    fn handle(&mut self, msg: SendTo, _ctx: &mut Self::Context) -> Self::Result {
        if let Some(handle) = self.clients.get(&msg.id) {
            handle.addr.do_send(session_msg::Deliver(msg.frame));
        }
    }
}

impl Handler<SendToOthers> for Room {
    type Result = ();

    fn handle(&mut self, msg: SendToOthers, _ctx: &mut Self::Context) -> Self::Result {
        for (id, handle) in self.clients.iter() {
            if *id != msg.id {
                handle.addr.do_send(session_msg::Deliver(msg.frame.clone()));
            }
        }
    }
}

impl Handler<Terminate> for Room {
    type Result = ();

    fn handle(&mut self, _msg: Terminate, ctx: &mut Self::Context) -> Self::Result {
        // No further joined/left events — only the eventual RoomClosed from `stopped`.
        for handle in self.clients.values() {
            handle.addr.do_send(session_msg::ForceClose);
        }
        self.clients.clear();
        ctx.stop();
    }
}

impl Handler<ClearPingInterval> for Room {
    type Result = ();

    fn handle(&mut self, _msg: ClearPingInterval, ctx: &mut Self::Context) -> Self::Result {
        if let Some(handle) = self.ping_handle.take() {
            ctx.cancel_future(handle);
        }
    }
}

impl Handler<Pong> for Room {
    type Result = ();

    fn handle(&mut self, msg: Pong, _ctx: &mut Self::Context) -> Self::Result {
        if let Some(handle) = self.clients.get_mut(&msg.0) {
            handle.missed_pings = 0;
        }
    }
}

impl Handler<SetProperties> for Room {
    type Result = ();

    fn handle(&mut self, msg: SetProperties, _ctx: &mut Self::Context) -> Self::Result {
        self.properties = Some(msg.0);
    }
}

impl Handler<GetSummary> for Room {
    type Result = RoomSummary;

    fn handle(&mut self, msg: GetSummary, _ctx: &mut Self::Context) -> Self::Result {
        let clients = if msg.include_clients {
            self.clients
                .iter()
                .map(|(id, handle)| (id.clone(), self.summary_of(id, handle)))
                .collect()
        } else {
            Default::default()
        };
        RoomSummary {
            id: self.id.clone(),
            public_url: self.public_url.clone(),
            clients,
            properties: self.properties.clone(),
        }
    }
}
