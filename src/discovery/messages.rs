use actix::Message;

use crate::token::{GenerateTokenOpts, TokenError};

/// Mint a join token on behalf of the embedding application.
#[derive(Message)]
#[rtype(result = "Result<String, TokenError>")]
pub struct GenerateToken(pub GenerateTokenOpts);

/// Current client count of one room server, by `publicUrl`.
#[derive(Message)]
#[rtype(result = "Option<u64>")]
pub struct GetClientCount(pub String);

/// A linear min-scan by `clientCount`, ties broken by iteration order.
#[derive(Message)]
#[rtype(result = "Option<LeastLoadedServer>")]
pub struct GetLeastLoadedServer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeastLoadedServer {
    pub public_url: String,
    pub client_count: u64,
}

/// Minimal introspection surface for `GET /servers`: every other `Discovery`
/// operation is keyed by a `publicUrl` the caller is assumed to already
/// know, and the HTTP API needs a way to list them.
#[derive(Message)]
#[rtype(result = "Vec<ServerSummary>")]
pub struct ListServers;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSummary {
    pub public_url: String,
    pub client_count: u64,
    pub room_count: usize,
}

/// Re-publish an opaque payload on the `broadcast` bus subject.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Broadcast(pub String);

/// Idempotent; unsubscribes and stops the liveness loop.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Stop;

/// Typed event surface mirroring this instance's fleet-wide view. Delivered
/// synchronously relative to the mirror state change that produced it.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    NewServer { public_url: String },
    ServerRemoved { public_url: String },
    NewRoom { public_url: String, room_id: String },
    RoomRemoved { public_url: String, room_id: String },
    RoomJoined { public_url: String, room_id: String, client_id: String },
    RoomLeft { public_url: String, room_id: String, client_id: String },
}
