use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecParameters;

pub mod twirp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    Joining,
    Joined,
    Active,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub sid: String,
    pub kind: TrackKind,
}

#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    pub sid: String,
    pub identity: String,
    pub state: ParticipantState,
    pub tracks: Vec<TrackInfo>,
}

#[derive(Debug, thiserror::Error)]
pub enum TrackReadError {
    /// The track ended normally.
    #[error("end of stream")]
    Eof,
    #[error("transport error: {0}")]
    Transport(String),
}

/// A subscribed media track, read packet by packet.
#[async_trait]
pub trait RemoteTrack: Send + Sync {
    fn sid(&self) -> String;
    fn kind(&self) -> TrackKind;
    fn ssrc(&self) -> u32;
    fn codec(&self) -> RTCRtpCodecParameters;
    async fn read_rtp(&self) -> Result<Packet, TrackReadError>;
}

/// Subscription events delivered by a joined room, in arrival order.
pub enum RoomEvent {
    TrackSubscribed {
        track: Arc<dyn RemoteTrack>,
        participant: String,
    },
    TrackUnsubscribed {
        track_sid: String,
        participant: String,
    },
}

/// A live connection to a room, held by the recorder bot.
#[async_trait]
pub trait RoomHandle: Send + Sync {
    /// Sends a NACK + PLI pair for the given SSRC to prompt a keyframe and
    /// retransmissions.
    async fn request_keyframe(&self, ssrc: u32) -> anyhow::Result<()>;

    /// Sends a picture-loss indication for the given SSRC.
    async fn write_pli(&self, ssrc: u32) -> anyhow::Result<()>;

    async fn disconnect(&self) -> anyhow::Result<()>;
}

/// Joins rooms on behalf of the recorder bot.
///
/// Implementations must connect with auto-subscribe disabled; the service
/// drives subscriptions explicitly through [`RoomClient`].
#[async_trait]
pub trait RoomConnector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        token: &str,
    ) -> anyhow::Result<(Arc<dyn RoomHandle>, mpsc::UnboundedReceiver<RoomEvent>)>;
}

/// Server-side room API used by the service: participant lookup and
/// subscription management for the bot.
#[async_trait]
pub trait RoomClient: Send + Sync {
    async fn participant(&self, room: &str, identity: &str) -> anyhow::Result<ParticipantInfo>;

    async fn update_subscriptions(
        &self,
        room: &str,
        identity: &str,
        track_sids: &[String],
        subscribe: bool,
    ) -> anyhow::Result<()>;
}
