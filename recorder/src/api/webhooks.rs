use std::sync::Arc;
use std::time::Duration;

use common::prelude::FutureTimeout;
use hyper::header::AUTHORIZATION;
use hyper::{Body, Request, Response, StatusCode};
use serde::Deserialize;

use crate::auth::BOT_IDENTITY_PREFIX;
use crate::global::GlobalState;
use crate::room::ParticipantState;
use crate::service::{StartRecording, StopRecording};

use super::error::{ApiError, Result};
use super::global_state;

/// How often the auto-start poller re-checks a joined participant.
const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Bound on a single participant lookup.
const POLL_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound on the whole poll loop.
const POLL_DEADLINE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(default)]
    event: String,
    room: Option<EventRoom>,
    participant: Option<EventParticipant>,
}

#[derive(Debug, Deserialize)]
struct EventRoom {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct EventParticipant {
    #[serde(default)]
    identity: String,
}

pub async fn receive(req: Request<Body>) -> Result<Response<Body>> {
    let global = global_state(&req)?;

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).to_string())
        .ok_or(ApiError::MissingAuthorization)?;

    let body = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(ApiError::ParseHttpBody)?;

    global.auth.verify_webhook(&token, &body)?;

    let event: WebhookEvent = serde_json::from_slice(&body)?;
    tracing::info!(event = %event.event, "received webhook");

    match (event.event.as_str(), event.room, event.participant) {
        ("participant_joined", Some(room), Some(participant)) => {
            if participant.identity.starts_with(BOT_IDENTITY_PREFIX) {
                tracing::debug!(identity = participant.identity, "bot has joined room");
            } else {
                tokio::spawn(auto_start(global, room.name, participant.identity));
            }
        }
        ("participant_left", Some(room), Some(participant)) => {
            if participant.identity.starts_with(BOT_IDENTITY_PREFIX) {
                tracing::debug!(identity = participant.identity, "bot has left room");
            } else {
                tokio::spawn(stop_left_participant(global, room.name, participant.identity));
            }
        }
        ("room_finished", Some(room), _) => {
            tokio::spawn(async move {
                if let Err(err) = global.service.disconnect_from(&room.name).await {
                    tracing::debug!(room = room.name, error = %err, "cannot disconnect from room");
                }
            });
        }
        _ => {}
    }

    Response::builder()
        .status(StatusCode::OK)
        .body(Body::empty())
        .map_err(|_| ApiError::InternalServer("failed to build response"))
}

/// Polls until the joined participant is actively publishing, then starts a
/// recording with an inferred profile.
async fn auto_start(global: Arc<GlobalState>, room: String, identity: String) {
    let deadline = tokio::time::Instant::now() + POLL_DEADLINE;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = global.ctx.done() => return,
            _ = tokio::time::sleep_until(deadline) => {
                tracing::error!(room, participant = identity, "participant never became active");
                return;
            }
            _ = ticker.tick() => {}
        }

        let info = match global
            .service
            .participant(&room, &identity)
            .timeout(POLL_LOOKUP_TIMEOUT)
            .await
        {
            Ok(Ok(info)) => info,
            Ok(Err(err)) => {
                tracing::error!(room, participant = identity, error = %err, "cannot fetch participant");
                return;
            }
            Err(_) => {
                tracing::warn!(room, participant = identity, "participant lookup timed out");
                continue;
            }
        };

        tracing::debug!(room, participant = identity, state = ?info.state, "participant state");
        if info.state != ParticipantState::Active {
            continue;
        }

        let request = StartRecording {
            room: room.clone(),
            participant: identity.clone(),
            profile: None,
        };
        if let Err(err) = global.service.start_recording(request).await {
            tracing::error!(room, participant = identity, error = %err, "webhook cannot start recording");
        }
        return;
    }
}

async fn stop_left_participant(global: Arc<GlobalState>, room: String, identity: String) {
    let request = StopRecording {
        room: room.clone(),
        participant: identity.clone(),
    };
    if let Err(err) = global.service.stop_recording(request).await {
        tracing::debug!(room, participant = identity, error = %err, "cannot stop recording");
    }
}
