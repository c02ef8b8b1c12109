use actix::Message;

/// Sent by a [`crate::room::Room`] to deliver an opaque application frame
/// verbatim to this client's socket.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Deliver(pub String);

/// Sent by a [`crate::room::Room`] heartbeat tick to ask this client's
/// socket to emit a WebSocket ping frame.
#[derive(Message)]
#[rtype(result = "()")]
pub struct SendPing;

/// Sent by a [`crate::room::Room`] to forcibly close this client's socket —
/// used for heartbeat eviction, explicit `terminate()`, and duplicate-id
/// rejection.
#[derive(Message)]
#[rtype(result = "()")]
pub struct ForceClose;

/// The envelope sent to a client on any authentication rejection.
#[derive(serde::Serialize)]
pub struct AuthFailure<'a> {
    pub error: &'static str,
    pub message: &'a str,
}

impl<'a> AuthFailure<'a> {
    pub fn new(message: &'a str) -> Self {
        Self {
            error: "Authentication Failed",
            message,
        }
    }
}
