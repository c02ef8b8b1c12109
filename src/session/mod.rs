//! A single connected WebSocket client. Keeps the
//! `session/{mod,actor,message}.rs` split; the reconnection/transient-id
//! machinery found in `asifZaman0362-zgm-srv/src/session/` doesn't apply
//! here — clients never migrate between room servers, so `Session` owns no
//! session-manager registration step.

pub mod actor;
pub mod message;
