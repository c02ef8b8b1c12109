//! Wire shapes exchanged on the bus subjects below.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PING_SUBJECT: &str = "ping";
pub const RS_STOP_SUBJECT: &str = "rs.stop";
pub const RS_EVENT_SUBJECT: &str = "rs.event";
pub const BROADCAST_SUBJECT: &str = "broadcast";

/// `rooms.<publicUrl>` is per-server, constructed at subscribe/request time.
pub fn rooms_subject(public_url: &str) -> String {
    format!("rooms.{public_url}")
}

/// `{publicUrl, clientCount, reset?}` — RS → D, every 1s.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingPayload {
    pub public_url: String,
    pub client_count: u64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reset: bool,
}

/// `{id, properties?}` — the only client shape exposed beyond a room server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
}

/// `{id, publicUrl, clients: {<id>: ClientSummary}, properties?}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub public_url: String,
    pub clients: HashMap<String, ClientSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
}

/// Reply body for a `rooms.<publicUrl>` request: `roomId -> RoomSummary`.
pub type RoomsReply = HashMap<String, RoomSummary>;

/// `{publicUrl, roomId, subject, ...}` — RS → D, on every lifecycle change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsEvent {
    #[serde(rename = "publicUrl")]
    pub public_url: String,
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(flatten)]
    pub kind: RsEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "subject")]
pub enum RsEventKind {
    #[serde(rename = "newRoom")]
    NewRoom {
        #[serde(skip_serializing_if = "Option::is_none")]
        properties: Option<serde_json::Value>,
    },
    #[serde(rename = "roomRemoved")]
    RoomRemoved,
    #[serde(rename = "roomJoined")]
    RoomJoined { client: ClientSummary },
    #[serde(rename = "roomLeft")]
    RoomLeft { client: ClientSummary },
}
