//! Minimal HTTP surface over a [`Discovery`] instance: `POST /tokens` for
//! the embedding application's "who gets a token" policy to call into,
//! `GET /servers` for introspection. Token issuance policy lives in the
//! embedding application; this is wiring, not a policy decision of its own.

use std::io;
use std::sync::Arc;

use actix::Addr;
use actix_web::{web, App, HttpResponse, HttpServer};
use serde::{Deserialize, Serialize};

use crate::bus::messages::{PING_SUBJECT, RS_EVENT_SUBJECT, RS_STOP_SUBJECT};
use crate::bus::Bus;
use crate::config::DiscoveryConfig;
use crate::token::GenerateTokenOpts;

use super::messages::{GenerateToken, GetLeastLoadedServer, ListServers};
use super::Discovery;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest {
    public_url: Option<String>,
    room_id: String,
    room_properties: Option<serde_json::Value>,
    client_id: String,
    client_properties: Option<serde_json::Value>,
    join_only: Option<bool>,
}

#[derive(Serialize)]
struct TokenResponse {
    token: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

async fn issue_token(
    discovery: web::Data<Addr<Discovery>>,
    body: web::Json<TokenRequest>,
) -> actix_web::Result<HttpResponse> {
    let public_url = match &body.public_url {
        Some(url) => url.clone(),
        None => match discovery.send(GetLeastLoadedServer).await {
            Ok(Some(server)) => server.public_url,
            Ok(None) => {
                return Ok(HttpResponse::ServiceUnavailable().json(ErrorResponse {
                    error: "no room servers are currently registered".to_string(),
                }))
            }
            Err(err) => {
                return Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                    error: err.to_string(),
                }))
            }
        },
    };

    let opts = GenerateTokenOpts {
        public_url,
        room_id: body.room_id.clone(),
        room_properties: body.room_properties.clone(),
        client_id: body.client_id.clone(),
        client_properties: body.client_properties.clone(),
        join_only: body.join_only,
        ttl: None,
    };

    match discovery.send(GenerateToken(opts)).await {
        Ok(Ok(token)) => Ok(HttpResponse::Ok().json(TokenResponse { token })),
        Ok(Err(err)) => Ok(HttpResponse::InternalServerError().json(ErrorResponse {
            error: err.to_string(),
        })),
        Err(err) => Ok(HttpResponse::InternalServerError().json(ErrorResponse {
            error: err.to_string(),
        })),
    }
}

async fn list_servers(discovery: web::Data<Addr<Discovery>>) -> actix_web::Result<HttpResponse> {
    match discovery.send(ListServers).await {
        Ok(servers) => Ok(HttpResponse::Ok().json(servers)),
        Err(err) => Ok(HttpResponse::InternalServerError().json(ErrorResponse {
            error: err.to_string(),
        })),
    }
}

fn io_err(err: impl std::fmt::Display) -> io::Error {
    io::Error::other(err.to_string())
}

pub async fn start(config: DiscoveryConfig, bus: Arc<dyn Bus>) -> io::Result<()> {
    let secret = config.secret().map_err(io_err)?;
    let ping_sub = bus.subscribe(PING_SUBJECT).await.map_err(io_err)?;
    let rs_event_sub = bus.subscribe(RS_EVENT_SUBJECT).await.map_err(io_err)?;
    let rs_stop_sub = bus.subscribe(RS_STOP_SUBJECT).await.map_err(io_err)?;

    let discovery = Discovery::new(
        secret,
        config.server_timeout(),
        bus,
        ping_sub,
        rs_event_sub,
        rs_stop_sub,
    );

    tracing::info!(bind_addr = %config.bind_addr, "starting discovery node");

    let shutdown_target = discovery.clone();

    let bind_addr = config.bind_addr.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(discovery.clone()))
            .route("/tokens", web::post().to(issue_token))
            .route("/servers", web::get().to(list_servers))
    })
    .bind(bind_addr)?
    .run();

    // `Stop` is idempotent: unsubscribes and stops the liveness loop. Triggered
    // here on process shutdown rather than exposed as an HTTP operation.
    let server_handle = server.handle();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown_target.do_send(super::messages::Stop);
        server_handle.stop(true).await;
    });

    server.await
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install a SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::InMemoryBus;
    use actix_web::{http::StatusCode, test};
    use std::time::Duration;

    async fn test_discovery() -> Addr<Discovery> {
        let bus: Arc<dyn Bus> = Arc::new(InMemoryBus::new());
        let ping_sub = bus.subscribe(PING_SUBJECT).await.unwrap();
        let rs_event_sub = bus.subscribe(RS_EVENT_SUBJECT).await.unwrap();
        let rs_stop_sub = bus.subscribe(RS_STOP_SUBJECT).await.unwrap();
        Discovery::new(
            "test-secret".to_string(),
            Duration::from_secs(5),
            bus,
            ping_sub,
            rs_event_sub,
            rs_stop_sub,
        )
    }

    #[actix_web::test]
    async fn issues_a_token_for_an_explicit_server() {
        let discovery = test_discovery().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(discovery))
                .route("/tokens", web::post().to(issue_token)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/tokens")
            .set_json(serde_json::json!({
                "publicUrl": "rs-a",
                "roomId": "R1",
                "clientId": "C1",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: TokenResponse = test::read_body_json(resp).await;
        let claims = crate::token::verify("test-secret", &body.token).unwrap();
        assert_eq!(claims.public_url, "rs-a");
    }

    #[actix_web::test]
    async fn rejects_a_token_request_with_no_server_available() {
        let discovery = test_discovery().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(discovery))
                .route("/tokens", web::post().to(issue_token)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/tokens")
            .set_json(serde_json::json!({"roomId": "R1", "clientId": "C1"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
