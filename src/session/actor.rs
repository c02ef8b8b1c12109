//! The `Session` actor: one per accepted WebSocket. Keeps the
//! `ActorFutureExt::wait`-driven async-reply pattern from
//! `asifZaman0362-zgm-srv/src/session/actor.rs::join_room` — here used to
//! gate authentication instead of room lookup, which gives us "no other
//! frame is processed before authentication completes" for free: `.wait(ctx)`
//! pauses this actor's mailbox for the duration of the round trip to
//! `RoomServer`.

use actix::{Actor, ActorContext, ActorFutureExt, Addr, AsyncContext, Handler, StreamHandler, WrapFuture};
use actix_web_actors::ws::{self, ProtocolError, WebsocketContext};

use crate::room::messages::{Pong as RoomPong, SendAll};
use crate::room::Room;
use crate::server::messages::{AuthOutcome, Authenticate};
use crate::server::RoomServer;

use super::message::{AuthFailure, Deliver, ForceClose, SendPing};

enum SessionState {
    AwaitingToken,
    Authenticating,
    Joined { room: Addr<Room>, client_id: String },
}

pub struct Session {
    state: SessionState,
    room_server: Addr<RoomServer>,
}

impl Session {
    pub fn new(room_server: Addr<RoomServer>) -> Self {
        Self {
            state: SessionState::AwaitingToken,
            room_server,
        }
    }

    /// Rejects and closes: client gets `{error, message}`, then the socket
    /// closes. No bus event is published for an auth failure.
    fn reject(&mut self, ctx: &mut WebsocketContext<Self>, reason: &str) {
        if let Ok(envelope) = serde_json::to_string(&AuthFailure::new(reason)) {
            ctx.text(envelope);
        }
        ctx.close(None);
        ctx.stop();
    }

    fn handle_text(&mut self, text: String, ctx: &mut WebsocketContext<Self>) {
        match &self.state {
            SessionState::AwaitingToken => {
                self.state = SessionState::Authenticating;
                self.room_server
                    .send(Authenticate {
                        token: text,
                        addr: ctx.address(),
                    })
                    .into_actor(self)
                    .then(|outcome, act, ctx| {
                        match outcome {
                            Ok(AuthOutcome::Accepted { room, client_id }) => {
                                act.state = SessionState::Joined { room, client_id };
                            }
                            Ok(AuthOutcome::Rejected(reason)) => {
                                act.reject(ctx, &reason);
                            }
                            Err(err) => {
                                tracing::error!(error = %err, "room server mailbox error during auth");
                                act.reject(ctx, "Internal error.");
                            }
                        }
                        actix::fut::ready(())
                    })
                    .wait(ctx);
            }
            // Unreachable in practice: `.wait(ctx)` above pauses this
            // actor's mailbox for the whole authentication round trip, so
            // no further frame is dispatched until it resolves. Kept as an
            // explicit branch rather than a silent drop — a frame arriving
            // here would mean the pause was bypassed somehow.
            SessionState::Authenticating => {
                self.reject(ctx, "A message was received before authentication completed.");
            }
            SessionState::Joined { room, .. } => {
                room.do_send(SendAll(text));
            }
        }
    }
}

impl Actor for Session {
    type Context = WebsocketContext<Self>;

    /// A Client doesn't hold its Room by strong ownership that would
    /// outlive the socket — cleanup runs exactly once, here, driven by the
    /// real close-notification path rather than a synthesized event.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let SessionState::Joined { room, client_id } = &self.state {
            room.do_send(crate::room::messages::Leave(client_id.clone()));
        }
    }
}

impl StreamHandler<Result<ws::Message, ProtocolError>> for Session {
    fn handle(&mut self, item: Result<ws::Message, ProtocolError>, ctx: &mut Self::Context) {
        match item {
            Ok(ws::Message::Text(text)) => self.handle_text(text.to_string(), ctx),
            Ok(ws::Message::Ping(bytes)) => ctx.pong(&bytes),
            Ok(ws::Message::Pong(_)) => {
                if let SessionState::Joined { room, client_id } = &self.state {
                    room.do_send(RoomPong(client_id.clone()));
                }
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}

impl Handler<Deliver> for Session {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) -> Self::Result {
        ctx.text(msg.0);
    }
}

impl Handler<SendPing> for Session {
    type Result = ();

    fn handle(&mut self, _msg: SendPing, ctx: &mut Self::Context) -> Self::Result {
        ctx.ping(b"");
    }
}

impl Handler<ForceClose> for Session {
    type Result = ();

    fn handle(&mut self, _msg: ForceClose, ctx: &mut Self::Context) -> Self::Result {
        ctx.close(None);
        ctx.stop();
    }
}
