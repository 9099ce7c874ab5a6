use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use ulid::Ulid;

use crate::auth::{AccessTokenBuilder, BOT_IDENTITY_PREFIX};
use crate::bot::{Bot, BotOptions, RecordingDataFn};
use crate::participant::ParticipantData;
use crate::processing::MuxRunner;
use crate::room::{ParticipantInfo, RoomClient, RoomConnector, TrackKind};
use crate::upload::Uploader;

use self::profile::{MediaProfile, UnknownMediaProfile};

pub mod profile;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("url must contain ws:// or wss://")]
    InvalidRoomUrl,
    #[error(transparent)]
    UnknownMediaProfile(#[from] UnknownMediaProfile),
    #[error("requested {profile} profile, but participant has no {missing} track")]
    ProfileMismatch {
        profile: MediaProfile,
        missing: TrackKind,
    },
    #[error("room is not recorded")]
    RoomNotRecorded,
    #[error("no room connector configured")]
    ConnectorUnavailable,
    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct StartRecording {
    pub room: String,
    pub participant: String,
    pub profile: Option<MediaProfile>,
}

#[derive(Debug, Clone)]
pub struct StopRecording {
    pub room: String,
    pub participant: String,
}

pub struct ServiceOptions {
    /// The `ws://` / `wss://` room server URL bots connect to.
    pub url: String,
    pub auth: AccessTokenBuilder,
    pub client: Arc<dyn RoomClient>,
    /// Joins rooms for the bots. Without one, starting a recording fails
    /// with [`ServiceError::ConnectorUnavailable`].
    pub connector: Option<Arc<dyn RoomConnector>>,
    pub webhooks: Vec<String>,
    pub recordings_dir: PathBuf,
    pub muxer: Arc<dyn MuxRunner>,
}

#[derive(Default)]
struct ServiceState {
    bots: HashMap<String, Arc<Bot>>,
    uploader: Option<Arc<dyn Uploader>>,
}

/// Public facade of the recording engine: one bot per recorded room, fanned
/// out completion webhooks, explicit room teardown.
pub struct RecordingService {
    url: String,
    auth: AccessTokenBuilder,
    client: Arc<dyn RoomClient>,
    connector: Option<Arc<dyn RoomConnector>>,
    webhooks: Vec<String>,
    http: reqwest::Client,
    recordings_dir: PathBuf,
    muxer: Arc<dyn MuxRunner>,
    state: Mutex<ServiceState>,
}

impl RecordingService {
    pub fn new(options: ServiceOptions) -> Result<Arc<Self>, ServiceError> {
        if !options.url.starts_with("ws://") && !options.url.starts_with("wss://") {
            return Err(ServiceError::InvalidRoomUrl);
        }

        let http = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|err| ServiceError::Collaborator(err.into()))?;

        Ok(Arc::new(Self {
            url: options.url,
            auth: options.auth,
            client: options.client,
            connector: options.connector,
            webhooks: options.webhooks,
            http,
            recordings_dir: options.recordings_dir,
            muxer: options.muxer,
            state: Mutex::new(ServiceState::default()),
        }))
    }

    /// Installed on future bots and propagated to resident ones.
    pub async fn set_uploader(&self, uploader: Option<Arc<dyn Uploader>>) {
        let mut state = self.state.lock().await;
        state.uploader = uploader.clone();
        for bot in state.bots.values() {
            bot.set_uploader(uploader.clone()).await;
        }
    }

    pub async fn participant(
        &self,
        room: &str,
        identity: &str,
    ) -> Result<ParticipantInfo, ServiceError> {
        Ok(self.client.participant(room, identity).await?)
    }

    /// Picks a profile from the participant's published tracks.
    pub async fn suggest_media_profile(
        &self,
        room: &str,
        identity: &str,
    ) -> Result<MediaProfile, ServiceError> {
        let info = self.client.participant(room, identity).await?;
        Ok(MediaProfile::suggest(&info.tracks)?)
    }

    pub async fn start_recording(&self, request: StartRecording) -> Result<(), ServiceError> {
        let info = self
            .client
            .participant(&request.room, &request.participant)
            .await?;

        let profile = match request.profile {
            Some(profile) => profile,
            None => MediaProfile::suggest(&info.tracks)?,
        };

        // The profile must be satisfiable before anything is set up: no bot,
        // no pending entry, no subscription changes otherwise.
        let tracks = profile.matching_tracks(&info.tracks);
        if let Some(missing) = profile.missing_kind(&tracks) {
            return Err(ServiceError::ProfileMismatch { profile, missing });
        }

        let mut state = self.state.lock().await;

        let bot = match state.bots.get(&request.room) {
            Some(bot) => bot.clone(),
            None => {
                let bot = self
                    .create_bot(&request.room, state.uploader.clone())
                    .await?;
                state.bots.insert(request.room.clone(), bot.clone());
                bot
            }
        };

        bot.push_participant_request(&request.participant, profile)
            .await;

        let sids: Vec<String> = tracks.iter().map(|t| t.sid.clone()).collect();
        self.client
            .update_subscriptions(&request.room, bot.id(), &sids, true)
            .await?;

        Ok(())
    }

    pub async fn stop_recording(&self, request: StopRecording) -> Result<(), ServiceError> {
        let state = self.state.lock().await;

        let bot = state
            .bots
            .get(&request.room)
            .cloned()
            .ok_or(ServiceError::RoomNotRecorded)?;

        if let Err(err) = bot.stop_recording(&request.participant).await {
            tracing::debug!(
                room = request.room,
                participant = request.participant,
                error = %err,
                "participant was not being recorded"
            );
        }

        // Unsubscribing is best-effort: the participant may already be gone.
        match self
            .client
            .participant(&request.room, &request.participant)
            .await
        {
            Ok(info) => {
                let sids: Vec<String> = info.tracks.iter().map(|t| t.sid.clone()).collect();
                if !sids.is_empty() {
                    if let Err(err) = self
                        .client
                        .update_subscriptions(&request.room, bot.id(), &sids, false)
                        .await
                    {
                        tracing::warn!(
                            room = request.room,
                            participant = request.participant,
                            error = %err,
                            "cannot unsubscribe bot"
                        );
                    }
                }
            }
            Err(err) => {
                tracing::debug!(
                    room = request.room,
                    participant = request.participant,
                    error = %err,
                    "cannot fetch participant for unsubscribe"
                );
            }
        }

        Ok(())
    }

    /// Disconnects and removes the room's bot, stopping any recordings it
    /// still holds.
    pub async fn disconnect_from(&self, room: &str) -> Result<(), ServiceError> {
        let bot = self
            .state
            .lock()
            .await
            .bots
            .remove(room)
            .ok_or(ServiceError::RoomNotRecorded)?;

        Ok(bot.disconnect().await?)
    }

    /// Tears down every resident bot. Used on process shutdown.
    pub async fn shutdown(&self) {
        let bots: Vec<_> = self.state.lock().await.bots.drain().collect();
        for (room, bot) in bots {
            if let Err(err) = bot.disconnect().await {
                tracing::warn!(room, error = %err, "cannot disconnect bot");
            }
        }
    }

    async fn create_bot(
        &self,
        room: &str,
        uploader: Option<Arc<dyn Uploader>>,
    ) -> Result<Arc<Bot>, ServiceError> {
        let connector = self
            .connector
            .clone()
            .ok_or(ServiceError::ConnectorUnavailable)?;

        let id = format!("{BOT_IDENTITY_PREFIX}{}", Ulid::new());
        let token = self
            .auth
            .recorder_token(room, &id)
            .map_err(|err| ServiceError::Collaborator(err.into()))?;

        let bot = Bot::create(
            connector.as_ref(),
            &self.url,
            &token,
            BotOptions {
                id,
                recordings_dir: self.recordings_dir.clone(),
                uploader,
                muxer: self.muxer.clone(),
                on_recording_data: self.recording_data_fn(),
            },
        )
        .await?;

        Ok(bot)
    }

    fn recording_data_fn(&self) -> RecordingDataFn {
        let webhooks = self.webhooks.clone();
        let http = self.http.clone();
        Arc::new(move |data| send_recording_data(&http, &webhooks, data))
    }
}

/// POSTs the completion record to every configured webhook concurrently.
/// Failures are logged, never retried.
fn send_recording_data(http: &reqwest::Client, webhooks: &[String], data: ParticipantData) {
    let body = match serde_json::to_vec(&data) {
        Ok(body) => body,
        Err(err) => {
            tracing::error!(error = %err, participant = data.identity, "cannot marshal recording data");
            return;
        }
    };

    for url in webhooks {
        let http = http.clone();
        let body = body.clone();
        let url = url.clone();
        tokio::spawn(async move {
            let result = http
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await;

            match result {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(url, status = %response.status(), "webhook rejected recording data");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(url, error = %err, "cannot reach webhook");
                }
            }
        });
    }
}
