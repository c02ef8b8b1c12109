//! Per-process room-server runtime.
//!
//! Plays the `RoomManager`/`Server` role that
//! `asifZaman0362-zgm-srv/src/server/mod.rs` sketched but never finished:
//! a singleton actor owning a keyed set of [`Room`]s, deciding admission,
//! and bridging room/client lifecycle onto the bus.

pub mod http;
pub mod messages;

use std::sync::Arc;
use std::time::Duration;

use actix::{Actor, ActorContext, Addr, AsyncContext, Context, Handler, StreamHandler};
use futures::StreamExt;
use tokio::sync::broadcast;

use crate::bus::messages::{
    PingPayload, RoomsReply, RsEvent, RsEventKind, BROADCAST_SUBJECT, PING_SUBJECT,
    RS_EVENT_SUBJECT, RS_STOP_SUBJECT,
};
use crate::bus::{Bus, BusMessage, BusPublisher, BusSubscription};
use crate::room::messages::{ClientJoin, GetSummary, RoomClosed, RoomLifecycleEvent, TryJoin};
use crate::room::{Room, RoomOptions};
use crate::token;
use crate::utils::new_fast_hashmap;

use messages::{AuthOutcome, Authenticate, Broadcast, Shutdown};

/// Bridges the `broadcast` subject's subscription stream into this actor's
/// mailbox.
struct IncomingBroadcast(BusMessage);
impl actix::Message for IncomingBroadcast {
    type Result = ();
}

/// Bridges the `rooms.<publicUrl>` request subscription into this actor's
/// mailbox.
struct IncomingRoomsRequest(BusMessage);
impl actix::Message for IncomingRoomsRequest {
    type Result = ();
}

pub struct RoomServer {
    public_url: String,
    secret: String,
    sync_rooms: bool,
    sync_clients: bool,
    room_defaults: RoomOptions,
    rooms: ahash::HashMap<String, Addr<Room>>,
    client_count: u64,
    bus: Arc<dyn Bus>,
    publisher: BusPublisher,
    local_broadcast: broadcast::Sender<String>,
    sent_first_ping: bool,
}

impl RoomServer {
    /// `broadcast_sub`/`rooms_request_sub` must already be subscribed
    /// before construction — `Actor::started` has no async entry point, so
    /// the bus handshake happens in the caller (mirrors how `http::start`
    /// wires every actor in this crate).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        public_url: String,
        secret: String,
        sync_rooms: bool,
        sync_clients: bool,
        room_defaults: RoomOptions,
        bus: Arc<dyn Bus>,
        broadcast_sub: BusSubscription,
        rooms_request_sub: BusSubscription,
    ) -> Addr<Self> {
        let publisher = BusPublisher::spawn(bus.clone());
        let (local_broadcast, _) = broadcast::channel(256);
        let server = Self {
            public_url,
            secret,
            sync_rooms,
            sync_clients: sync_rooms && sync_clients,
            room_defaults,
            rooms: new_fast_hashmap(64),
            client_count: 0,
            bus,
            publisher,
            local_broadcast,
            sent_first_ping: false,
        };
        Actor::create(move |ctx| {
            ctx.add_stream(broadcast_sub.into_stream().map(IncomingBroadcast));
            ctx.add_stream(rooms_request_sub.into_stream().map(IncomingRoomsRequest));
            server
        })
    }

    /// A listener surface for embedding code (tests, HTTP handlers) that
    /// wants to observe `broadcast` traffic relayed from the bus.
    pub fn subscribe_broadcasts(&self) -> broadcast::Receiver<String> {
        self.local_broadcast.subscribe()
    }

    fn publish_ping(&mut self) {
        let reset = !self.sent_first_ping;
        self.sent_first_ping = true;
        self.publisher.publish_json(
            PING_SUBJECT,
            &PingPayload {
                public_url: self.public_url.clone(),
                client_count: self.client_count,
                reset,
            },
        );
    }

    fn publish_event(&mut self, room_id: String, kind: RsEventKind) {
        self.publisher.publish_json(
            RS_EVENT_SUBJECT,
            &RsEvent {
                public_url: self.public_url.clone(),
                room_id,
                kind,
            },
        );
    }
}

impl Actor for RoomServer {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.run_interval(Duration::from_secs(1), |act, _ctx| act.publish_ping());
    }
}

impl StreamHandler<IncomingBroadcast> for RoomServer {
    fn handle(&mut self, item: IncomingBroadcast, _ctx: &mut Self::Context) {
        let text = String::from_utf8_lossy(&item.0.payload).into_owned();
        let _ = self.local_broadcast.send(text);
    }
}

impl StreamHandler<IncomingRoomsRequest> for RoomServer {
    fn handle(&mut self, item: IncomingRoomsRequest, ctx: &mut Self::Context) {
        let Some(reply_to) = item.0.reply else {
            return;
        };
        let include_clients = self.sync_clients;
        let rooms: Vec<(String, Addr<Room>)> = self
            .rooms
            .iter()
            .map(|(id, addr)| (id.clone(), addr.clone()))
            .collect();
        let bus = self.bus.clone();

        ctx.spawn(actix::fut::wrap_future(async move {
            let mut reply: RoomsReply = RoomsReply::new();
            for (id, addr) in rooms {
                if let Ok(summary) = addr.send(GetSummary { include_clients }).await {
                    reply.insert(id, summary);
                }
            }
            if let Ok(payload) = serde_json::to_vec(&reply) {
                let _ = bus.publish(&reply_to, payload.into()).await;
            }
        }));
    }
}

impl Handler<Authenticate> for RoomServer {
    type Result = actix::ResponseActFuture<Self, AuthOutcome>;

    /// Verifies the token, resolves (or creates) the named room, then hands
    /// the duplicate-id check and the membership insert to the room itself
    /// as a single [`TryJoin`] round trip — see that message's doc comment
    /// for why the check and the insert can't be split across two messages
    /// here. Only the first frame on a socket is ever treated as a token;
    /// `Session` enforces that by only sending this message once.
    fn handle(&mut self, msg: Authenticate, ctx: &mut Self::Context) -> Self::Result {
        let claims = match token::verify(&self.secret, &msg.token) {
            Ok(claims) => claims,
            Err(err) => return Box::pin(actix::fut::ready(AuthOutcome::Rejected(err.to_string()))),
        };

        if claims.public_url != self.public_url {
            return Box::pin(actix::fut::ready(AuthOutcome::Rejected(
                "The authentication token is intended for another room server.".to_string(),
            )));
        }

        let room_existed = self.rooms.contains_key(&claims.room_id);
        if claims.join_only.unwrap_or(false) && !room_existed {
            return Box::pin(actix::fut::ready(AuthOutcome::Rejected(
                "This room does not exist and the token only permits joining an existing room."
                    .to_string(),
            )));
        }

        let public_url = self.public_url.clone();
        let room_defaults = self.room_defaults.clone();
        let server_addr = ctx.address();
        let room_id = claims.room_id.clone();
        let room = self
            .rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                Room::new(
                    room_id.clone(),
                    public_url,
                    claims.room_properties.clone(),
                    room_defaults,
                    server_addr,
                )
                .start()
            })
            .clone();

        if !room_existed && self.sync_rooms {
            self.publish_event(
                room_id,
                RsEventKind::NewRoom {
                    properties: claims.room_properties.clone(),
                },
            );
        }

        let join_room = room.clone();
        let client_id = claims.client_id.clone();
        let client_join = ClientJoin {
            id: claims.client_id.clone(),
            properties: claims.client_properties,
            addr: msg.addr,
        };

        Box::pin(
            actix::fut::wrap_future(async move { join_room.send(TryJoin(client_join)).await }).map(
                move |outcome, _act: &mut Self, _ctx| match outcome {
                    Ok(Ok(())) => AuthOutcome::Accepted { room, client_id },
                    Ok(Err(_)) => {
                        AuthOutcome::Rejected("You are already connected to this room.".to_string())
                    }
                    Err(_) => AuthOutcome::Rejected("Internal error.".to_string()),
                },
            ),
        )
    }
}

impl Handler<RoomLifecycleEvent> for RoomServer {
    type Result = ();

    fn handle(&mut self, msg: RoomLifecycleEvent, _ctx: &mut Self::Context) -> Self::Result {
        match msg {
            RoomLifecycleEvent::Joined { room_id, client } => {
                self.client_count += 1;
                if self.sync_clients {
                    self.publish_event(room_id, RsEventKind::RoomJoined { client });
                }
            }
            RoomLifecycleEvent::Left { room_id, client } => {
                self.client_count = self.client_count.saturating_sub(1);
                if self.sync_clients {
                    self.publish_event(room_id, RsEventKind::RoomLeft { client });
                }
            }
        }
    }
}

impl Handler<RoomClosed> for RoomServer {
    type Result = ();

    fn handle(&mut self, msg: RoomClosed, _ctx: &mut Self::Context) -> Self::Result {
        self.rooms.remove(&msg.0);
        if self.sync_rooms {
            self.publish_event(msg.0, RsEventKind::RoomRemoved);
        }
    }
}

impl Handler<Broadcast> for RoomServer {
    type Result = ();

    fn handle(&mut self, msg: Broadcast, _ctx: &mut Self::Context) -> Self::Result {
        self.publisher.publish(BROADCAST_SUBJECT, msg.0.into_bytes().into());
    }
}

impl Handler<Shutdown> for RoomServer {
    type Result = ();

    /// Tear down every room, publish `rs.stop`, then stop. The ping ticker
    /// dies with the actor; there's nothing else to explicitly cancel.
    fn handle(&mut self, _msg: Shutdown, ctx: &mut Self::Context) -> Self::Result {
        for addr in self.rooms.values() {
            addr.do_send(crate::room::messages::Terminate);
        }
        self.publisher
            .publish(RS_STOP_SUBJECT, self.public_url.clone().into_bytes().into());
        ctx.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::InMemoryBus;
    use crate::bus::messages::rooms_subject;
    use std::sync::Arc as StdArc;

    async fn start_server(public_url: &str, bus: StdArc<InMemoryBus>) -> Addr<RoomServer> {
        let broadcast_sub = bus.subscribe(BROADCAST_SUBJECT).await.unwrap();
        let rooms_sub = bus.subscribe(&rooms_subject(public_url)).await.unwrap();
        RoomServer::new(
            public_url.to_string(),
            "test-secret".to_string(),
            true,
            true,
            RoomOptions::default(),
            bus as StdArc<dyn Bus>,
            broadcast_sub,
            rooms_sub,
        )
    }

    // Full admission-flow coverage (token → room → join → rs.event) lives in
    // `server::http` tests, where a real `Session` can be stood up over an
    // actual WebSocket upgrade and `Handler<Authenticate>` is exercised
    // end-to-end. Token verification itself (wrong secret, wrong subject,
    // expiry) is covered directly in `token`'s own unit tests.

    #[actix::test]
    async fn replies_on_rooms_subject_with_an_empty_map_when_no_rooms_exist() {
        let bus = StdArc::new(InMemoryBus::new());
        let _server = start_server("rs-a", bus.clone()).await;

        let reply = bus
            .request(
                &rooms_subject("rs-a"),
                bytes::Bytes::new(),
                std::time::Duration::from_secs(1),
            )
            .await
            .unwrap();
        let rooms: RoomsReply = serde_json::from_slice(&reply).unwrap();
        assert!(rooms.is_empty());
    }
}
