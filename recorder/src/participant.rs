use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use ulid::Ulid;

use crate::media::{self, MediaError, MediaExtension};
use crate::processing::{self, MuxRunner};
use crate::room::RemoteTrack;
use crate::sink::FileSink;
use crate::track::TrackRecorder;
use crate::upload::Uploader;

/// Asks the publisher of an SSRC for a fresh keyframe.
pub type PliFn = Arc<dyn Fn(u32) + Send + Sync>;

/// The completion record sent to webhook consumers.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantData {
    pub identity: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Recording,
    Done,
}

struct TrackSlot {
    track: Arc<dyn RemoteTrack>,
    recorder: TrackRecorder<FileSink>,
    file: PathBuf,
    extension: MediaExtension,
}

/// Records up to one video and one audio track for a participant, then runs
/// post-processing when stopped.
///
/// The state machine only moves forward: `created → recording → done`.
pub struct ParticipantRecorder {
    identity: String,
    dir: PathBuf,
    state: State,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    output: String,
    uploader: Option<Arc<dyn Uploader>>,
    pli: PliFn,
    muxer: Arc<dyn MuxRunner>,
    video: Option<TrackSlot>,
    audio: Option<TrackSlot>,
}

impl ParticipantRecorder {
    pub fn new(
        identity: &str,
        dir: PathBuf,
        uploader: Option<Arc<dyn Uploader>>,
        pli: PliFn,
        muxer: Arc<dyn MuxRunner>,
    ) -> Self {
        Self {
            identity: identity.to_string(),
            dir,
            state: State::Created,
            started_at: None,
            ended_at: None,
            output: String::new(),
            uploader,
            pli,
            muxer,
            video: None,
            audio: None,
        }
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn data(&self) -> ParticipantData {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        ParticipantData {
            identity: self.identity.clone(),
            start: self.started_at.unwrap_or(end),
            end,
            output: self.output.clone(),
        }
    }

    /// Attaches the participant's video track. A later registration of the
    /// same kind replaces the earlier one; the stale recorder is stopped and
    /// its file removed first.
    pub async fn register_video(&mut self, track: Arc<dyn RemoteTrack>) -> Result<(), MediaError> {
        let slot = self.create_slot(track)?;
        if let Some(stale) = self.video.replace(slot) {
            self.discard_slot(stale).await;
        }
        Ok(())
    }

    /// Attaches the participant's audio track; same replacement rules as
    /// [`Self::register_video`].
    pub async fn register_audio(&mut self, track: Arc<dyn RemoteTrack>) -> Result<(), MediaError> {
        let slot = self.create_slot(track)?;
        if let Some(stale) = self.audio.replace(slot) {
            self.discard_slot(stale).await;
        }
        Ok(())
    }

    fn create_slot(&self, track: Arc<dyn RemoteTrack>) -> Result<TrackSlot, MediaError> {
        let codec = track.codec();
        let mime_type = codec.capability.mime_type.clone();

        let file_id = Ulid::new().to_string();
        let file = self.dir.join(media::media_filename(&file_id, &mime_type)?);
        let extension = media::media_extension(&mime_type).ok_or(MediaError::NotSupported)?;

        let sink = FileSink::create(&file)?;

        let ssrc = track.ssrc();
        let pli = self.pli.clone();
        let recorder = TrackRecorder::new(&codec, sink, Some(Box::new(move || pli(ssrc))))?;

        Ok(TrackSlot {
            track,
            recorder,
            file,
            extension,
        })
    }

    async fn discard_slot(&self, mut slot: TrackSlot) {
        if let Err(err) = slot.recorder.stop().await {
            tracing::warn!(
                participant = %self.identity,
                error = %err,
                "cannot stop replaced track recorder"
            );
        }
        if let Err(err) = std::fs::remove_file(&slot.file) {
            tracing::debug!(file = %slot.file.display(), error = %err, "cannot remove stale file");
        }
    }

    /// Starts recording every registered track. A no-op outside `created`.
    pub fn start(&mut self) {
        if self.state != State::Created {
            return;
        }

        if let Some(slot) = &mut self.video {
            slot.recorder.start(slot.track.clone());
        }
        if let Some(slot) = &mut self.audio {
            slot.recorder.start(slot.track.clone());
        }

        self.started_at = Some(Utc::now());
        self.state = State::Recording;
        tracing::debug!(participant = %self.identity, "recording started");
    }

    /// Stops both track recorders (video first), runs post-processing and
    /// returns the completion record. Yields `None` when there is nothing to
    /// report: the recorder never started or was already stopped.
    pub async fn stop(&mut self) -> Option<ParticipantData> {
        match self.state {
            State::Done => None,
            State::Created => {
                // Never started: close any registered sinks, produce no
                // output.
                for slot in [&mut self.video, &mut self.audio].into_iter().flatten() {
                    let _ = slot.recorder.stop().await;
                }
                self.state = State::Done;
                None
            }
            State::Recording => {
                if let Some(slot) = &mut self.video {
                    if let Err(err) = slot.recorder.stop().await {
                        tracing::warn!(participant = %self.identity, error = %err, "video recorder stop");
                    }
                }
                if let Some(slot) = &mut self.audio {
                    if let Err(err) = slot.recorder.stop().await {
                        tracing::warn!(participant = %self.identity, error = %err, "audio recorder stop");
                    }
                }

                self.ended_at = Some(Utc::now());
                self.state = State::Done;

                // Containerization is near-instant with stream copies, so it
                // runs inline; uploads go to the background.
                if let Err(err) = self.process().await {
                    tracing::error!(participant = %self.identity, error = %err, "post-processing failed");
                }

                Some(self.data())
            }
        }
    }

    async fn process(&mut self) -> anyhow::Result<()> {
        let audio_file = self.audio.as_ref().map(|slot| slot.file.clone());

        let Some(video) = &self.video else {
            // Audio only: the raw ogg is already playable, upload it as-is.
            let Some(audio_file) = audio_file else {
                return Ok(());
            };
            self.output = audio_file.display().to_string();
            self.spawn_upload(audio_file);
            return Ok(());
        };

        let job = processing::mux_job(
            Some((video.file.as_path(), video.extension)),
            audio_file.as_deref(),
            &Ulid::new().to_string(),
            &self.dir,
        )
        .ok_or_else(|| anyhow::anyhow!("no containerization case for recorded tracks"))?;

        self.muxer.run(&job).await?;
        tracing::debug!(
            participant = %self.identity,
            output = %job.output.display(),
            "containerised recording"
        );

        // The elementary streams are only needed until the container exists.
        std::fs::remove_file(&video.file)?;
        if let Some(audio_file) = &audio_file {
            std::fs::remove_file(audio_file)?;
        }

        self.output = job.output.display().to_string();
        self.spawn_upload(job.output);
        Ok(())
    }

    /// Uploads the finished file in the background, deleting the local copy
    /// on success. Failures are logged and do not fail the recording.
    fn spawn_upload(&mut self, file: PathBuf) {
        let Some(uploader) = self.uploader.clone() else {
            return;
        };

        let Some(key) = file.file_name().map(|n| n.to_string_lossy().to_string()) else {
            return;
        };
        self.output = format!("{}/{key}", uploader.directory());

        let identity = self.identity.clone();
        tokio::spawn(async move {
            match uploader.upload(&key, &file).await {
                Ok(()) => {
                    tracing::info!(participant = %identity, key, "uploaded recording");
                    if let Err(err) = std::fs::remove_file(&file) {
                        tracing::warn!(
                            file = %file.display(),
                            error = %err,
                            "cannot remove uploaded file"
                        );
                    }
                }
                Err(err) => {
                    tracing::error!(participant = %identity, key, error = %err, "cannot upload recording");
                }
            }
        });
    }
}
