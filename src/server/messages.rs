use actix::{Addr, Message};

use crate::room::Room;
use crate::session::actor::Session;

/// The first WebSocket frame from a freshly-accepted socket, handed to the
/// owning [`crate::server::RoomServer`] for the whole admission decision.
/// `Session` blocks on the result before accepting any further frames.
#[derive(Message)]
#[rtype(result = "AuthOutcome")]
pub struct Authenticate {
    pub token: String,
    pub addr: Addr<Session>,
}

/// Outcome of an [`Authenticate`] admission decision. `Rejected` carries the
/// exact client-facing message text sent back down the socket.
pub enum AuthOutcome {
    Accepted { room: Addr<Room>, client_id: String },
    Rejected(String),
}

/// Publish an opaque application payload on the `broadcast` bus subject.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Broadcast(pub String);

/// Stop accepting new sockets, terminate every room, and publish `rs.stop`.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Shutdown;
