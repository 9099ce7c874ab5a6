use std::fmt;
use std::str::FromStr;

use crate::room::{TrackInfo, TrackKind};

/// Which media kinds must be captured before a recording may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaProfile {
    VideoOnly,
    AudioOnly,
    MuxedAv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown media profile")]
pub struct UnknownMediaProfile;

impl fmt::Display for MediaProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VideoOnly => f.write_str("video"),
            Self::AudioOnly => f.write_str("audio"),
            Self::MuxedAv => f.write_str("av"),
        }
    }
}

impl FromStr for MediaProfile {
    type Err = UnknownMediaProfile;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::VideoOnly),
            "audio" => Ok(Self::AudioOnly),
            "av" => Ok(Self::MuxedAv),
            _ => Err(UnknownMediaProfile),
        }
    }
}

impl MediaProfile {
    pub fn wants(&self, kind: TrackKind) -> bool {
        match self {
            Self::VideoOnly => kind == TrackKind::Video,
            Self::AudioOnly => kind == TrackKind::Audio,
            Self::MuxedAv => true,
        }
    }

    /// Picks the widest profile a participant's published tracks can
    /// satisfy.
    pub fn suggest(tracks: &[TrackInfo]) -> Result<Self, UnknownMediaProfile> {
        let video = tracks.iter().any(|t| t.kind == TrackKind::Video);
        let audio = tracks.iter().any(|t| t.kind == TrackKind::Audio);

        match (video, audio) {
            (true, true) => Ok(Self::MuxedAv),
            (true, false) => Ok(Self::VideoOnly),
            (false, true) => Ok(Self::AudioOnly),
            (false, false) => Err(UnknownMediaProfile),
        }
    }

    /// The subset of `tracks` this profile records.
    pub fn matching_tracks<'a>(&self, tracks: &'a [TrackInfo]) -> Vec<&'a TrackInfo> {
        tracks.iter().filter(|t| self.wants(t.kind)).collect()
    }

    /// The first required kind absent from `tracks`, if any.
    pub fn missing_kind(&self, tracks: &[&TrackInfo]) -> Option<TrackKind> {
        let has = |kind| tracks.iter().any(|t| t.kind == kind);

        match self {
            Self::VideoOnly => (!has(TrackKind::Video)).then_some(TrackKind::Video),
            Self::AudioOnly => (!has(TrackKind::Audio)).then_some(TrackKind::Audio),
            Self::MuxedAv => {
                if !has(TrackKind::Video) {
                    Some(TrackKind::Video)
                } else if !has(TrackKind::Audio) {
                    Some(TrackKind::Audio)
                } else {
                    None
                }
            }
        }
    }
}
