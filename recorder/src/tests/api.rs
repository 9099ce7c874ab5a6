use std::sync::Arc;

use hyper::server::conn::Http;
use routerify::RequestServiceBuilder;
use serde_json::json;

use common::context::{Context, Handler};

use crate::api;
use crate::auth::AccessTokenBuilder;
use crate::config::AppConfig;
use crate::global::GlobalState;
use crate::room::{ParticipantInfo, ParticipantState, TrackInfo, TrackKind};
use crate::service::{RecordingService, ServiceOptions};

use super::fake::{FakeConnector, FakeRoomClient, RecordingMuxRunner};

struct ApiHarness {
    base: String,
    http: reqwest::Client,
    client: Arc<FakeRoomClient>,
    _connector: Arc<FakeConnector>,
    auth: AccessTokenBuilder,
    _handler: Handler,
    _dir: tempfile::TempDir,
}

fn test_config() -> AppConfig {
    AppConfig::from_lookup(|key| {
        match key {
            "APP_PORT" => Some("0"),
            "LIVEKIT_URL" => Some("ws://localhost:7880"),
            "LIVEKIT_API_KEY" => Some("key"),
            "LIVEKIT_API_SECRET" => Some("secret"),
            _ => None,
        }
        .map(str::to_string)
    })
    .expect("test config")
}

/// Serves the real router on an ephemeral port against fake collaborators.
async fn api_harness(client: FakeRoomClient) -> ApiHarness {
    let client = Arc::new(client);
    let connector = Arc::new(FakeConnector::default());
    let tempdir = tempfile::tempdir().expect("tempdir");
    let auth = AccessTokenBuilder::new("key".to_string(), "secret".to_string());

    let service = RecordingService::new(ServiceOptions {
        url: "ws://localhost:7880".to_string(),
        auth: auth.clone(),
        client: client.clone(),
        connector: Some(connector.clone()),
        webhooks: Vec::new(),
        recordings_dir: tempdir.path().to_path_buf(),
        muxer: Arc::new(RecordingMuxRunner::default()),
    })
    .expect("valid service options");

    let (ctx, handler) = Context::new();
    let global = Arc::new(GlobalState::new(test_config(), ctx, auth.clone(), service));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind api listener");
    let addr = listener.local_addr().expect("local addr");

    let request_service =
        RequestServiceBuilder::new(api::routes(&global)).expect("request service");
    tokio::spawn(async move {
        // Keeps the global state alive for the lifetime of the server task.
        let _global = global;
        loop {
            let Ok((socket, peer)) = listener.accept().await else {
                break;
            };
            tokio::spawn(Http::new().serve_connection(socket, request_service.build(peer)));
        }
    });

    ApiHarness {
        base: format!("http://{addr}"),
        http: reqwest::Client::new(),
        client,
        _connector: connector,
        auth,
        _handler: handler,
        _dir: tempdir,
    }
}

fn audio_participant() -> ParticipantInfo {
    ParticipantInfo {
        sid: "PA_alice".to_string(),
        identity: "alice".to_string(),
        state: ParticipantState::Active,
        tracks: vec![TrackInfo {
            sid: "TR_a".to_string(),
            kind: TrackKind::Audio,
        }],
    }
}

#[tokio::test]
async fn test_welcome_and_health() {
    let h = api_harness(FakeRoomClient::default()).await;

    let response = h.http.get(&h.base).send().await.expect("GET /");
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.expect("body"), "Welcome to CGC");

    let response = h
        .http
        .get(format!("{}/health-check", h.base))
        .send()
        .await
        .expect("GET /health-check");
    assert_eq!(response.status(), 204);
}

#[tokio::test]
async fn test_start_validation() {
    let h = api_harness(FakeRoomClient::default()).await;
    let url = format!("{}/recordings/start", h.base);

    // Empty fields.
    let response = h
        .http
        .post(&url)
        .json(&json!({ "room": "", "participant": "" }))
        .send()
        .await
        .expect("POST start");
    assert_eq!(response.status(), 400);

    // Unparseable body.
    let response = h
        .http
        .post(&url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body("not json")
        .send()
        .await
        .expect("POST start");
    assert_eq!(response.status(), 400);

    // Unknown profile name.
    let response = h
        .http
        .post(&url)
        .json(&json!({ "room": "meeting", "participant": "alice", "profile": "4k" }))
        .send()
        .await
        .expect("POST start");
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_start_and_stop_round_trip() {
    let h = api_harness(FakeRoomClient::default().with_participant("meeting", audio_participant()))
        .await;

    let response = h
        .http
        .post(format!("{}/recordings/start", h.base))
        .json(&json!({ "room": "meeting", "participant": "alice", "profile": "audio" }))
        .send()
        .await
        .expect("POST start");
    assert_eq!(response.status(), 200);

    let updates = h.client.updates.lock().unwrap().clone();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].subscribe);

    let response = h
        .http
        .post(format!("{}/recordings/stop", h.base))
        .json(&json!({ "room": "meeting", "participant": "alice" }))
        .send()
        .await
        .expect("POST stop");
    assert_eq!(response.status(), 200);

    let updates = h.client.updates.lock().unwrap().clone();
    assert!(!updates.last().expect("unsubscribe update").subscribe);
}

#[tokio::test]
async fn test_start_profile_mismatch_is_client_error() {
    let h = api_harness(FakeRoomClient::default().with_participant("meeting", audio_participant()))
        .await;

    let response = h
        .http
        .post(format!("{}/recordings/start", h.base))
        .json(&json!({ "room": "meeting", "participant": "alice", "profile": "av" }))
        .send()
        .await
        .expect("POST start");
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_stop_unknown_room_is_server_error() {
    let h = api_harness(FakeRoomClient::default()).await;

    let response = h
        .http
        .post(format!("{}/recordings/stop", h.base))
        .json(&json!({ "room": "meeting", "participant": "alice" }))
        .send()
        .await
        .expect("POST stop");
    assert_eq!(response.status(), 500);
}

#[tokio::test]
async fn test_webhook_authentication() {
    let h = api_harness(FakeRoomClient::default()).await;
    let url = format!("{}/recordings/webhooks", h.base);
    let body = json!({ "event": "room_finished", "room": { "name": "meeting" } }).to_string();

    // No authorization header.
    let response = h
        .http
        .post(&url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body.clone())
        .send()
        .await
        .expect("POST webhook");
    assert_eq!(response.status(), 401);

    // Token signed over a different body.
    let forged = h.auth.webhook_token(b"something else").expect("token");
    let response = h
        .http
        .post(&url)
        .header(reqwest::header::AUTHORIZATION, forged)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body.clone())
        .send()
        .await
        .expect("POST webhook");
    assert_eq!(response.status(), 401);

    // Properly signed delivery.
    let token = h.auth.webhook_token(body.as_bytes()).expect("token");
    let response = h
        .http
        .post(&url)
        .header(reqwest::header::AUTHORIZATION, token)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .expect("POST webhook");
    assert_eq!(response.status(), 200);
}
