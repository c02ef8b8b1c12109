//! Eventually-consistent aggregator over the whole room-server fleet.
//! No teacher module plays this role directly; the liveness-sweep/TTL-eviction
//! shape is grounded on `zhubby-moltis`'s
//! gateway `DedupeCache`, generalized from a single flat cache into a
//! two-level mirror (server → room → client).

pub mod http;
pub mod messages;
pub mod record;

use std::sync::Arc;
use std::time::Duration;

use actix::{Actor, ActorContext, Addr, AsyncContext, Context, Handler, StreamHandler};
use futures::StreamExt;
use tokio::sync::broadcast;

use crate::bus::messages::{
    rooms_subject, PingPayload, RoomSummary, RsEvent, RsEventKind, PING_SUBJECT, RS_EVENT_SUBJECT,
    RS_STOP_SUBJECT,
};
use crate::bus::{Bus, BusMessage, BusPublisher, BusSubscription};
use crate::token;
use crate::utils::new_fast_hashmap;

use messages::{
    Broadcast, DiscoveryEvent, GenerateToken, GetClientCount, GetLeastLoadedServer,
    LeastLoadedServer, ListServers, ServerSummary, Stop,
};
use record::RoomServerRecord;

const ROOMS_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

struct IncomingPing(BusMessage);
impl actix::Message for IncomingPing {
    type Result = ();
}
struct IncomingRsEvent(BusMessage);
impl actix::Message for IncomingRsEvent {
    type Result = ();
}
struct IncomingRsStop(BusMessage);
impl actix::Message for IncomingRsStop {
    type Result = ();
}

/// Internal: populate a just-created record from its `rooms.<publicUrl>`
/// reply, once the async request resolves.
struct PopulateRooms {
    public_url: String,
    rooms: crate::bus::messages::RoomsReply,
}
impl actix::Message for PopulateRooms {
    type Result = ();
}

pub struct Discovery {
    records: ahash::HashMap<String, RoomServerRecord>,
    server_timeout: Duration,
    secret: String,
    bus: Arc<dyn Bus>,
    publisher: BusPublisher,
    events: broadcast::Sender<DiscoveryEvent>,
}

impl Discovery {
    pub fn new(
        secret: String,
        server_timeout: Duration,
        bus: Arc<dyn Bus>,
        ping_sub: BusSubscription,
        rs_event_sub: BusSubscription,
        rs_stop_sub: BusSubscription,
    ) -> Addr<Self> {
        let publisher = BusPublisher::spawn(bus.clone());
        let (events, _) = broadcast::channel(256);
        let discovery = Self {
            records: new_fast_hashmap(64),
            server_timeout,
            secret,
            bus,
            publisher,
            events,
        };
        Actor::create(move |ctx| {
            ctx.add_stream(ping_sub.into_stream().map(IncomingPing));
            ctx.add_stream(rs_event_sub.into_stream().map(IncomingRsEvent));
            ctx.add_stream(rs_stop_sub.into_stream().map(IncomingRsStop));
            discovery
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: DiscoveryEvent) {
        let _ = self.events.send(event);
    }

    /// Shared teardown for `rs.stop` and liveness-timeout eviction: drop
    /// every mirrored client and room under the server, then the server
    /// itself.
    fn evict_server(&mut self, public_url: &str) {
        let Some(record) = self.records.remove(public_url) else {
            return;
        };
        for (room_id, room) in record.rooms {
            for client_id in room.clients.into_keys() {
                self.emit(DiscoveryEvent::RoomLeft {
                    public_url: public_url.to_string(),
                    room_id: room_id.clone(),
                    client_id,
                });
            }
            self.emit(DiscoveryEvent::RoomRemoved {
                public_url: public_url.to_string(),
                room_id,
            });
        }
        self.emit(DiscoveryEvent::ServerRemoved {
            public_url: public_url.to_string(),
        });
    }

    fn request_rooms(&self, ctx: &mut Context<Self>, public_url: String) {
        let bus = self.bus.clone();
        let subject = rooms_subject(&public_url);
        ctx.spawn(actix::fut::wrap_future(async move {
            let reply = bus
                .request(&subject, bytes::Bytes::new(), ROOMS_REQUEST_TIMEOUT)
                .await
                .ok()
                .and_then(|payload| serde_json::from_slice(&payload).ok())
                .unwrap_or_default();
            (public_url, reply)
        })
        .map(|(public_url, rooms), act: &mut Self, ctx| {
            ctx.address().do_send(PopulateRooms { public_url, rooms });
        }));
    }
}

impl Actor for Discovery {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let interval = self.server_timeout / 2;
        ctx.run_interval(interval, |act, _ctx| {
            let stale: Vec<String> = act
                .records
                .values()
                .filter(|record| record.is_stale(act.server_timeout))
                .map(|record| record.public_url.clone())
                .collect();
            for public_url in stale {
                act.evict_server(&public_url);
            }
        });
    }
}

impl StreamHandler<IncomingPing> for Discovery {
    fn handle(&mut self, item: IncomingPing, ctx: &mut Self::Context) {
        let Ok(payload) = serde_json::from_slice::<PingPayload>(&item.0.payload) else {
            return;
        };
        if payload.reset {
            self.records.remove(&payload.public_url);
        }
        if let Some(record) = self.records.get_mut(&payload.public_url) {
            record.client_count = payload.client_count;
            record.last_ping = std::time::Instant::now();
            return;
        }
        self.records.insert(
            payload.public_url.clone(),
            RoomServerRecord::new(payload.public_url.clone(), payload.client_count),
        );
        self.emit(DiscoveryEvent::NewServer {
            public_url: payload.public_url.clone(),
        });
        self.request_rooms(ctx, payload.public_url);
    }
}

impl Handler<PopulateRooms> for Discovery {
    type Result = ();

    fn handle(&mut self, msg: PopulateRooms, _ctx: &mut Self::Context) -> Self::Result {
        if let Some(record) = self.records.get_mut(&msg.public_url) {
            record.rooms = msg.rooms.into_iter().collect();
        }
    }
}

impl StreamHandler<IncomingRsEvent> for Discovery {
    fn handle(&mut self, item: IncomingRsEvent, _ctx: &mut Self::Context) {
        let Ok(event) = serde_json::from_slice::<RsEvent>(&item.0.payload) else {
            return;
        };
        let RsEvent { public_url, room_id, kind } = event;
        let Some(record) = self.records.get_mut(&public_url) else {
            return; // unknown server: ping is authoritative, don't speculatively create.
        };

        match kind {
            RsEventKind::NewRoom { properties } => {
                record.rooms.entry(room_id.clone()).or_insert_with(|| RoomSummary {
                    id: room_id.clone(),
                    public_url: public_url.clone(),
                    clients: Default::default(),
                    properties,
                });
                self.emit(DiscoveryEvent::NewRoom { public_url, room_id });
            }
            RsEventKind::RoomRemoved => {
                if let Some(room) = record.rooms.remove(&room_id) {
                    for client_id in room.clients.into_keys() {
                        self.emit(DiscoveryEvent::RoomLeft {
                            public_url: public_url.clone(),
                            room_id: room_id.clone(),
                            client_id,
                        });
                    }
                    self.emit(DiscoveryEvent::RoomRemoved { public_url, room_id });
                }
            }
            RsEventKind::RoomJoined { client } => {
                if let Some(room) = record.rooms.get_mut(&room_id) {
                    let client_id = client.id.clone();
                    room.clients.insert(client_id.clone(), client);
                    self.emit(DiscoveryEvent::RoomJoined { public_url, room_id, client_id });
                }
            }
            RsEventKind::RoomLeft { client } => {
                if let Some(room) = record.rooms.get_mut(&room_id) {
                    if room.clients.remove(&client.id).is_some() {
                        self.emit(DiscoveryEvent::RoomLeft {
                            public_url,
                            room_id,
                            client_id: client.id,
                        });
                    }
                }
            }
        }
    }
}

impl StreamHandler<IncomingRsStop> for Discovery {
    fn handle(&mut self, item: IncomingRsStop, _ctx: &mut Self::Context) {
        let public_url = String::from_utf8_lossy(&item.0.payload).into_owned();
        self.evict_server(&public_url);
    }
}

impl Handler<GenerateToken> for Discovery {
    type Result = Result<String, token::TokenError>;

    fn handle(&mut self, msg: GenerateToken, _ctx: &mut Self::Context) -> Self::Result {
        token::generate(&self.secret, msg.0)
    }
}

impl Handler<GetClientCount> for Discovery {
    type Result = Option<u64>;

    fn handle(&mut self, msg: GetClientCount, _ctx: &mut Self::Context) -> Self::Result {
        self.records.get(&msg.0).map(|record| record.client_count)
    }
}

impl Handler<GetLeastLoadedServer> for Discovery {
    type Result = Option<LeastLoadedServer>;

    fn handle(&mut self, _msg: GetLeastLoadedServer, _ctx: &mut Self::Context) -> Self::Result {
        self.records
            .values()
            .min_by_key(|record| record.client_count)
            .map(|record| LeastLoadedServer {
                public_url: record.public_url.clone(),
                client_count: record.client_count,
            })
    }
}

impl Handler<ListServers> for Discovery {
    type Result = Vec<ServerSummary>;

    fn handle(&mut self, _msg: ListServers, _ctx: &mut Self::Context) -> Self::Result {
        self.records
            .values()
            .map(|record| ServerSummary {
                public_url: record.public_url.clone(),
                client_count: record.client_count,
                room_count: record.rooms.len(),
            })
            .collect()
    }
}

impl Handler<Broadcast> for Discovery {
    type Result = ();

    fn handle(&mut self, msg: Broadcast, _ctx: &mut Self::Context) -> Self::Result {
        self.publisher
            .publish(crate::bus::messages::BROADCAST_SUBJECT, msg.0.into_bytes().into());
    }
}

impl Handler<Stop> for Discovery {
    type Result = ();

    fn handle(&mut self, _msg: Stop, ctx: &mut Self::Context) -> Self::Result {
        ctx.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::InMemoryBus;
    use std::sync::Arc as StdArc;

    async fn start_discovery(bus: StdArc<InMemoryBus>) -> Addr<Discovery> {
        let ping_sub = bus.subscribe(PING_SUBJECT).await.unwrap();
        let rs_event_sub = bus.subscribe(RS_EVENT_SUBJECT).await.unwrap();
        let rs_stop_sub = bus.subscribe(RS_STOP_SUBJECT).await.unwrap();
        Discovery::new(
            "test-secret".to_string(),
            Duration::from_millis(200),
            bus as StdArc<dyn Bus>,
            ping_sub,
            rs_event_sub,
            rs_stop_sub,
        )
    }

    #[actix::test]
    async fn converges_on_a_fresh_server_ping() {
        let bus = StdArc::new(InMemoryBus::new());
        let discovery = start_discovery(bus.clone()).await;
        let initial = discovery.send(GetLeastLoadedServer).await.unwrap();
        assert_eq!(initial, None);

        bus.publish(
            PING_SUBJECT,
            serde_json::to_vec(&PingPayload {
                public_url: "rs-a".to_string(),
                client_count: 3,
                reset: false,
            })
            .unwrap()
            .into(),
        )
        .await
        .unwrap();

        // give the in-process bus + rooms.<url> request/timeout round trip a tick
        tokio::time::sleep(Duration::from_millis(50)).await;

        let count = discovery.send(GetClientCount("rs-a".to_string())).await.unwrap();
        assert_eq!(count, Some(3));
    }

    #[actix::test]
    async fn evicts_on_rs_stop() {
        let bus = StdArc::new(InMemoryBus::new());
        let discovery = start_discovery(bus.clone()).await;
        bus.publish(
            PING_SUBJECT,
            serde_json::to_vec(&PingPayload {
                public_url: "rs-a".to_string(),
                client_count: 1,
                reset: false,
            })
            .unwrap()
            .into(),
        )
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        bus.publish(RS_STOP_SUBJECT, b"rs-a".to_vec().into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let count = discovery.send(GetClientCount("rs-a".to_string())).await.unwrap();
        assert_eq!(count, None);
    }
}
