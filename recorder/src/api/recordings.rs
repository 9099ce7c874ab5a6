use hyper::{Body, Request, Response, StatusCode};
use serde::Deserialize;

use crate::service::{profile::MediaProfile, ServiceError, StartRecording, StopRecording};

use super::error::{ApiError, Result};
use super::global_state;

#[derive(Debug, Deserialize)]
struct StartRequest {
    #[serde(default)]
    room: String,
    #[serde(default)]
    participant: String,
    #[serde(default)]
    profile: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StopRequest {
    #[serde(default)]
    room: String,
    #[serde(default)]
    participant: String,
}

fn ok() -> Result<Response<Body>> {
    Response::builder()
        .status(StatusCode::OK)
        .body(Body::empty())
        .map_err(|_| ApiError::InternalServer("failed to build response"))
}

pub async fn start(req: Request<Body>) -> Result<Response<Body>> {
    let global = global_state(&req)?;

    let body = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(ApiError::ParseHttpBody)?;
    let data: StartRequest = serde_json::from_slice(&body)?;

    if data.room.is_empty() || data.participant.is_empty() {
        return Err(ApiError::EmptyFields);
    }

    // An explicit profile must parse; an absent one is inferred downstream.
    let profile = data
        .profile
        .as_deref()
        .map(|p| p.parse::<MediaProfile>())
        .transpose()
        .map_err(ServiceError::from)?;

    global
        .service
        .start_recording(StartRecording {
            room: data.room,
            participant: data.participant,
            profile,
        })
        .await?;

    ok()
}

pub async fn stop(req: Request<Body>) -> Result<Response<Body>> {
    let global = global_state(&req)?;

    let body = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(ApiError::ParseHttpBody)?;
    let data: StopRequest = serde_json::from_slice(&body)?;

    if data.room.is_empty() || data.participant.is_empty() {
        return Err(ApiError::EmptyFields);
    }

    global
        .service
        .stop_recording(StopRecording {
            room: data.room,
            participant: data.participant,
        })
        .await?;

    ok()
}
