use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, Mutex};

use crate::participant::{ParticipantData, ParticipantRecorder, PliFn};
use crate::processing::MuxRunner;
use crate::room::{RemoteTrack, RoomConnector, RoomEvent, RoomHandle, TrackKind};
use crate::service::profile::MediaProfile;
use crate::upload::Uploader;

/// Receives the completion record of a finished recording.
pub type RecordingDataFn = Arc<dyn Fn(ParticipantData) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("recorder not found")]
    RecorderNotFound,
}

pub struct BotOptions {
    pub id: String,
    pub recordings_dir: PathBuf,
    pub uploader: Option<Arc<dyn Uploader>>,
    pub muxer: Arc<dyn MuxRunner>,
    pub on_recording_data: RecordingDataFn,
}

struct PendingRequest {
    profile: MediaProfile,
    // Created lazily on the first subscribed track, moved to `active` once
    // the profile is satisfied.
    recorder: Option<ParticipantRecorder>,
}

#[derive(Default)]
struct BotState {
    pending: HashMap<String, PendingRequest>,
    active: HashMap<String, ParticipantRecorder>,
    uploader: Option<Arc<dyn Uploader>>,
}

/// A hidden, non-publishing room participant that records the tracks the
/// service subscribes it to.
///
/// The bot sits between the service (imperative start/stop) and the room
/// connection (asynchronous subscription events); the pending table is the
/// rendezvous between the two, guarded by one lock.
pub struct Bot {
    id: String,
    room: Arc<dyn RoomHandle>,
    recordings_dir: PathBuf,
    muxer: Arc<dyn MuxRunner>,
    on_recording_data: RecordingDataFn,
    state: Mutex<BotState>,
}

impl Bot {
    /// Joins the room (auto-subscribe disabled) and starts consuming its
    /// subscription events.
    pub async fn create(
        connector: &dyn RoomConnector,
        url: &str,
        token: &str,
        options: BotOptions,
    ) -> anyhow::Result<Arc<Self>> {
        let (room, events) = connector.connect(url, token).await?;

        let bot = Arc::new(Self {
            id: options.id,
            room,
            recordings_dir: options.recordings_dir,
            muxer: options.muxer,
            on_recording_data: options.on_recording_data,
            state: Mutex::new(BotState {
                uploader: options.uploader,
                ..Default::default()
            }),
        });

        tokio::spawn(Self::event_loop(Arc::downgrade(&bot), events));

        Ok(bot)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    async fn event_loop(bot: Weak<Self>, mut events: mpsc::UnboundedReceiver<RoomEvent>) {
        while let Some(event) = events.recv().await {
            let Some(bot) = bot.upgrade() else {
                break;
            };

            match event {
                RoomEvent::TrackSubscribed { track, participant } => {
                    bot.on_track_subscribed(track, &participant).await;
                }
                RoomEvent::TrackUnsubscribed {
                    track_sid,
                    participant,
                } => {
                    bot.on_track_unsubscribed(&track_sid, &participant).await;
                }
            }
        }
    }

    /// Marks a participant as wanted; the next matching subscription events
    /// will build up their recorder.
    pub async fn push_participant_request(&self, identity: &str, profile: MediaProfile) {
        let mut state = self.state.lock().await;
        state
            .pending
            .entry(identity.to_string())
            .and_modify(|request| request.profile = profile)
            .or_insert(PendingRequest {
                profile,
                recorder: None,
            });

        tracing::debug!(participant = identity, %profile, "pushed participant request");
    }

    pub async fn set_uploader(&self, uploader: Option<Arc<dyn Uploader>>) {
        self.state.lock().await.uploader = uploader;
    }

    async fn on_track_subscribed(&self, track: Arc<dyn RemoteTrack>, identity: &str) {
        let mut state = self.state.lock().await;

        if !state.pending.contains_key(identity) {
            tracing::debug!(
                participant = identity,
                track = %track.sid(),
                "no pending request for subscribed track"
            );
            return;
        }

        // Prompt a keyframe so the capture does not open on deltas.
        if let Err(err) = self.room.request_keyframe(track.ssrc()).await {
            tracing::warn!(track = %track.sid(), error = %err, "cannot request keyframe");
        }

        let uploader = state.uploader.clone();
        let Some(request) = state.pending.get_mut(identity) else {
            return;
        };

        let recorder = request.recorder.get_or_insert_with(|| {
            ParticipantRecorder::new(
                identity,
                self.recordings_dir.clone(),
                uploader,
                self.pli_fn(),
                self.muxer.clone(),
            )
        });

        let registered = match track.kind() {
            TrackKind::Video => recorder.register_video(track.clone()).await,
            TrackKind::Audio => recorder.register_audio(track.clone()).await,
        };
        if let Err(err) = registered {
            tracing::warn!(
                participant = identity,
                track = %track.sid(),
                error = %err,
                "cannot create track recorder, skipping track"
            );
            return;
        }

        let satisfied = match request.profile {
            MediaProfile::VideoOnly => recorder.has_video(),
            MediaProfile::AudioOnly => recorder.has_audio(),
            MediaProfile::MuxedAv => recorder.has_video() && recorder.has_audio(),
        };
        if !satisfied {
            return;
        }

        let Some(request) = state.pending.remove(identity) else {
            return;
        };
        let Some(mut recorder) = request.recorder else {
            return;
        };

        recorder.start();
        state.active.insert(identity.to_string(), recorder);
        tracing::info!(participant = identity, "recording");
    }

    async fn on_track_unsubscribed(&self, track_sid: &str, identity: &str) {
        match self.stop_recording(identity).await {
            Ok(()) => {
                tracing::debug!(participant = identity, track = track_sid, "stopped recording")
            }
            Err(BotError::RecorderNotFound) => {
                tracing::debug!(
                    participant = identity,
                    track = track_sid,
                    "unsubscribed track was not recorded"
                )
            }
        }
    }

    /// Stops and removes the participant's recorder, then reports the
    /// completion record asynchronously. Clears a still-pending request
    /// without producing output.
    pub async fn stop_recording(&self, identity: &str) -> Result<(), BotError> {
        let mut state = self.state.lock().await;

        let pending = state.pending.remove(identity);
        let active = state.active.remove(identity);
        let was_pending = pending.is_some();

        if let Some(mut request) = pending {
            if let Some(mut recorder) = request.recorder.take() {
                let _ = recorder.stop().await;
            }
        }

        match active {
            Some(mut recorder) => {
                if let Some(data) = recorder.stop().await {
                    let callback = self.on_recording_data.clone();
                    tokio::spawn(async move { callback(data) });
                }
                Ok(())
            }
            None if was_pending => Ok(()),
            None => Err(BotError::RecorderNotFound),
        }
    }

    /// Stops every recording and leaves the room.
    pub async fn disconnect(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;

        let pending: Vec<_> = state.pending.drain().collect();
        for (_, mut request) in pending {
            if let Some(mut recorder) = request.recorder.take() {
                let _ = recorder.stop().await;
            }
        }

        let active: Vec<_> = state.active.drain().collect();
        for (identity, mut recorder) in active {
            if let Some(data) = recorder.stop().await {
                let callback = self.on_recording_data.clone();
                tokio::spawn(async move { callback(data) });
            }
            tracing::debug!(participant = identity, "stopped recording");
        }

        self.room.disconnect().await
    }

    fn pli_fn(&self) -> PliFn {
        let room = self.room.clone();
        Arc::new(move |ssrc| {
            let room = room.clone();
            tokio::spawn(async move {
                if let Err(err) = room.write_pli(ssrc).await {
                    tracing::debug!(ssrc, error = %err, "cannot write pli");
                }
            });
        })
    }
}
