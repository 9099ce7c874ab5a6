use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::AccessTokenBuilder;

use super::{ParticipantInfo, ParticipantState, RoomClient, TrackInfo, TrackKind};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Rewrites a `ws://` / `wss://` room URL into its `http://` / `https://`
/// REST counterpart.
pub fn http_url_from_ws(url: &str) -> Option<String> {
    if let Some(rest) = url.strip_prefix("ws://") {
        return Some(format!("http://{rest}"));
    }
    if let Some(rest) = url.strip_prefix("wss://") {
        return Some(format!("https://{rest}"));
    }
    None
}

/// REST client for the room server's Twirp API, authenticated with
/// short-lived admin tokens.
pub struct TwirpRoomClient {
    base_url: String,
    auth: AccessTokenBuilder,
    http: reqwest::Client,
}

impl TwirpRoomClient {
    pub fn new(room_url: &str, auth: AccessTokenBuilder) -> anyhow::Result<Self> {
        let base_url =
            http_url_from_ws(room_url).context("room url must contain ws:// or wss://")?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            base_url,
            auth,
            http,
        })
    }

    async fn call<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        room: &str,
        method: &str,
        body: &B,
    ) -> anyhow::Result<R> {
        let token = self.auth.admin_token(room)?;
        let response = self
            .http
            .post(format!("{}/twirp/livekit.RoomService/{method}", self.base_url))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            anyhow::bail!("{method} returned {status}: {message}");
        }

        response
            .json()
            .await
            .with_context(|| format!("cannot decode {method} response"))
    }
}

#[async_trait]
impl RoomClient for TwirpRoomClient {
    async fn participant(&self, room: &str, identity: &str) -> anyhow::Result<ParticipantInfo> {
        let wire: WireParticipantInfo = self
            .call(
                room,
                "GetParticipant",
                &WireParticipantIdentity {
                    room: room.to_string(),
                    identity: identity.to_string(),
                },
            )
            .await?;

        Ok(wire.into())
    }

    async fn update_subscriptions(
        &self,
        room: &str,
        identity: &str,
        track_sids: &[String],
        subscribe: bool,
    ) -> anyhow::Result<()> {
        let _: serde_json::Value = self
            .call(
                room,
                "UpdateSubscriptions",
                &WireUpdateSubscriptions {
                    room: room.to_string(),
                    identity: identity.to_string(),
                    track_sids: track_sids.to_vec(),
                    subscribe,
                },
            )
            .await?;

        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WireParticipantIdentity {
    room: String,
    identity: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireUpdateSubscriptions {
    room: String,
    identity: String,
    track_sids: Vec<String>,
    subscribe: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireParticipantInfo {
    #[serde(default)]
    pub sid: String,
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub tracks: Vec<WireTrackInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireTrackInfo {
    #[serde(default)]
    pub sid: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl From<WireParticipantInfo> for ParticipantInfo {
    fn from(wire: WireParticipantInfo) -> Self {
        Self {
            sid: wire.sid,
            identity: wire.identity,
            state: match wire.state.as_str() {
                "ACTIVE" => ParticipantState::Active,
                "JOINED" => ParticipantState::Joined,
                "DISCONNECTED" => ParticipantState::Disconnected,
                _ => ParticipantState::Joining,
            },
            tracks: wire
                .tracks
                .into_iter()
                .filter_map(|track| {
                    let kind = match track.kind.as_str() {
                        "VIDEO" => TrackKind::Video,
                        "AUDIO" => TrackKind::Audio,
                        _ => return None,
                    };
                    Some(TrackInfo {
                        sid: track.sid,
                        kind,
                    })
                })
                .collect(),
        }
    }
}
