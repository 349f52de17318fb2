//! HTTP surface for relay-delivered gateway events.
//!
//! The relay signs each event body with HMAC-SHA256 over a shared secret
//! and posts it to `/event`. Verification happens in a middleware layer
//! before any parsing; handling is spawned per event so a slow submission
//! never delays acknowledgement of the next one.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::event::{decode_event, GatewayEvent};
use crate::lifecycle;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "x-relay-signature";

#[derive(Serialize)]
pub struct EventResponse {
    pub message: String,
}

type HmacSha256 = Hmac<Sha256>;

fn verify_relay_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(signature_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    mac.update(payload);

    // Constant-time comparison.
    mac.verify_slice(&signature_bytes).is_ok()
}

async fn verify_event_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !verify_relay_signature(&state.config.relay_secret, &bytes, signature) {
        error!("invalid relay signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let request = Request::from_parts(parts, axum::body::Body::from(bytes));
    Ok(next.run(request).await)
}

async fn event_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<EventResponse>, StatusCode> {
    let (_parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let event = decode_event(&bytes).map_err(|e| {
        warn!(error = %e, "undecodable event body");
        StatusCode::BAD_REQUEST
    })?;

    let event_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("event", id = %event_id);

    match event {
        GatewayEvent::MessageCreate(message) => {
            info!(event_id, channel = %message.channel_id, "received message event");
            let state = state.clone();
            tokio::spawn(
                async move {
                    lifecycle::handle_message_create(
                        &state.config,
                        &state.discord,
                        &state.reputation,
                        &message,
                    )
                    .await;
                }
                .instrument(span),
            );
        }
        GatewayEvent::InteractionCreate(interaction) => {
            info!(event_id, kind = interaction.kind, "received interaction event");
            let state = state.clone();
            tokio::spawn(
                async move {
                    lifecycle::handle_interaction(&state.config, &state.discord, &interaction)
                        .await;
                }
                .instrument(span),
            );
        }
        GatewayEvent::ThreadMembersUpdate(update) => {
            info!(event_id, thread = %update.id, "received thread membership event");
            let state = state.clone();
            tokio::spawn(
                async move {
                    lifecycle::handle_thread_members_update(&state.config, &state.discord, &update)
                        .await;
                }
                .instrument(span),
            );
        }
        GatewayEvent::Ignored { kind } => {
            info!(event_id, kind, "ignoring dispatch kind");
        }
    }

    Ok(Json(EventResponse {
        message: "Event received".to_string(),
    }))
}

pub fn event_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/event", post(event_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_event_signature,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::discord::DiscordClient;
    use crate::reputation::ReputationClient;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn test_state() -> Arc<AppState> {
        let config = Config {
            token: "t".into(),
            application_id: "99".into(),
            guild_id: "1".into(),
            intake_channel_id: "100".into(),
            audit_channel_id: "200".into(),
            needs_content_channel_id: "300".into(),
            meets_minimum_channel_id: "400".into(),
            approvals_channel_id: "500".into(),
            needs_content_role_id: "600".into(),
            meets_minimum_role_id: "700".into(),
            starting_message_id: 1000,
            relay_secret: "relay-secret".into(),
            port: 0,
            reputation_base_url: "http://127.0.0.1:1".into(),
            profile_base_url: "https://sb.ltn.fi/userid/".into(),
        };
        Arc::new(AppState {
            discord: DiscordClient::new(config.token.clone()),
            reputation: ReputationClient::new(config.reputation_base_url.clone()),
            config,
        })
    }

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .merge(event_router(state.clone()))
            .with_state(state)
    }

    #[test]
    fn test_signature_round_trip() {
        let body = b"{\"t\":\"TYPING_START\",\"d\":{}}";
        let signature = sign("relay-secret", body);
        assert!(verify_relay_signature("relay-secret", body, &signature));
        assert!(!verify_relay_signature("wrong-secret", body, &signature));
        assert!(!verify_relay_signature("relay-secret", b"tampered", &signature));
    }

    #[test]
    fn test_signature_rejects_malformed_headers() {
        assert!(!verify_relay_signature("s", b"x", "no-prefix"));
        assert!(!verify_relay_signature("s", b"x", "sha256=nothex"));
        assert!(!verify_relay_signature("s", b"x", "sha256="));
    }

    #[tokio::test]
    async fn test_unsigned_request_is_unauthorized() {
        let response = app(test_state())
            .oneshot(
                HttpRequest::post("/event")
                    .body(Body::from("{\"t\":\"TYPING_START\",\"d\":{}}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_badly_signed_request_is_unauthorized() {
        let body = "{\"t\":\"TYPING_START\",\"d\":{}}";
        let response = app(test_state())
            .oneshot(
                HttpRequest::post("/event")
                    .header(SIGNATURE_HEADER, sign("wrong-secret", body.as_bytes()))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_signed_ignorable_event_is_accepted() {
        let body = "{\"t\":\"TYPING_START\",\"d\":{}}";
        let response = app(test_state())
            .oneshot(
                HttpRequest::post("/event")
                    .header(SIGNATURE_HEADER, sign("relay-secret", body.as_bytes()))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_signed_garbage_is_bad_request() {
        let body = "definitely not json";
        let response = app(test_state())
            .oneshot(
                HttpRequest::post("/event")
                    .header(SIGNATURE_HEADER, sign("relay-secret", body.as_bytes()))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
