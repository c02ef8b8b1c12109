//! `discovery` process entrypoint: load config, connect the bus, serve the
//! token/introspection HTTP API until signalled to stop.

use std::sync::Arc;

use room_fleet::bus::Bus;
use room_fleet::config::DiscoveryConfig;
use room_fleet::discovery::http;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = DiscoveryConfig::load().map_err(|err| std::io::Error::other(err.to_string()))?;

    #[cfg(feature = "nats")]
    let bus: Arc<dyn Bus> = Arc::new(
        room_fleet::bus::nats::NatsBus::connect(&config.bus_url)
            .await
            .map_err(|err| std::io::Error::other(err.to_string()))?,
    );
    #[cfg(not(feature = "nats"))]
    let bus: Arc<dyn Bus> = Arc::new(room_fleet::bus::memory::InMemoryBus::new());

    http::start(config, bus).await
}
