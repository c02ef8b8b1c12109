use actix::{Addr, Message};

use crate::bus::messages::{ClientSummary, RoomSummary};
use crate::session::actor::Session;

/// A client being admitted into a room — constructed by the owning
/// [`crate::server::RoomServer`] once a token has been verified.
pub struct ClientJoin {
    pub id: String,
    pub properties: Option<serde_json::Value>,
    pub addr: Addr<Session>,
}

/// Returned by [`TryJoin`] when the room already has a member under that id.
#[derive(Debug)]
pub struct AlreadyInRoom;

/// Atomically check-and-insert a client by id, handled in a single `Room`
/// mailbox turn so two sockets racing to claim the same id can never both
/// win: whichever `TryJoin` the actor processes first inserts and succeeds,
/// the second observes the now-present id and is rejected. Splitting this
/// into a separate lookup message and a fire-and-forget insert would reopen
/// that race across the `.await` between them.
#[derive(Message)]
#[rtype(result = "Result<(), AlreadyInRoom>")]
pub struct TryJoin(pub ClientJoin);

#[derive(Message)]
#[rtype(result = "()")]
pub struct Leave(pub String);

/// Broadcast an opaque application frame to every member, the sender included.
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct SendAll(pub String);

/// Deliver a frame to exactly one member by id.
#[derive(Message)]
#[rtype(result = "()")]
pub struct SendTo {
    pub id: String,
    pub frame: String,
}

/// Deliver a frame to every member except one.
#[derive(Message)]
#[rtype(result = "()")]
pub struct SendToOthers {
    pub id: String,
    pub frame: String,
}

/// Disconnect every member and stop the room.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Terminate;

/// Stop the heartbeat timer. Idempotent.
#[derive(Message)]
#[rtype(result = "()")]
pub struct ClearPingInterval;

/// A pong received on the client's socket — resets its missed-pings counter.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Pong(pub String);

#[derive(Message)]
#[rtype(result = "RoomSummary")]
pub struct GetSummary {
    pub include_clients: bool,
}

/// Replace the room's opaque properties. Last writer wins.
#[derive(Message)]
#[rtype(result = "()")]
pub struct SetProperties(pub serde_json::Value);

/// Emitted by [`Room`] to its owning [`crate::server::RoomServer`] on every
/// membership change — these drive the `rs.event` publishes and the
/// `clientCount` bookkeeping.
#[derive(Message)]
#[rtype(result = "()")]
pub enum RoomLifecycleEvent {
    Joined { room_id: String, client: ClientSummary },
    Left { room_id: String, client: ClientSummary },
}

/// Emitted once, from [`Room::stopped`], regardless of why the room
/// stopped (auto-GC, explicit `terminate()`, or owning server shutdown) —
/// the single place the owning server reacts to finish removing the room
/// and publish `roomRemoved`.
#[derive(Message)]
#[rtype(result = "()")]
pub struct RoomClosed(pub String);
