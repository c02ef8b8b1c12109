//! Mirror of one remote room server, as seen by one [`super::Discovery`]
//! instance. Grounded on the TTL-tracked entry pattern in `zhubby-moltis`'s
//! gateway `DedupeCache` — an
//! `Instant`-stamped map entry that's live until its age exceeds a fixed
//! timeout, evicted by a periodic sweep rather than its own timer.

use std::time::Instant;

use crate::bus::messages::RoomSummary;

pub struct RoomServerRecord {
    pub public_url: String,
    pub client_count: u64,
    pub rooms: ahash::HashMap<String, RoomSummary>,
    pub last_ping: Instant,
}

impl RoomServerRecord {
    pub fn new(public_url: String, client_count: u64) -> Self {
        Self {
            public_url,
            client_count,
            rooms: crate::utils::new_fast_hashmap(8),
            last_ping: Instant::now(),
        }
    }

    pub fn is_stale(&self, timeout: std::time::Duration) -> bool {
        self.last_ping.elapsed() > timeout
    }
}
