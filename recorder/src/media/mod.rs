use std::fmt;
use std::io::{Seek, Write};

use webrtc::api::media_engine::{
    MIME_TYPE_G722, MIME_TYPE_H264, MIME_TYPE_OPUS, MIME_TYPE_PCMA, MIME_TYPE_PCMU, MIME_TYPE_VP8,
    MIME_TYPE_VP9,
};
use webrtc::media::io::h264_writer::H264Writer;
use webrtc::media::io::ivf_reader::IVFFileHeader;
use webrtc::media::io::ivf_writer::IVFWriter;
use webrtc::media::io::ogg_writer::OggWriter;
use webrtc::media::io::Writer;
use webrtc::rtp::packetizer::Depacketizer;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecParameters;

use self::reconstructor::SampleReconstructor;

pub mod reconstructor;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("empty file ID")]
    EmptyFileId,
    #[error("extension in file ID")]
    ExtensionInFileId,
    #[error("media not supported")]
    NotSupported,
    #[error("cannot create media writer: {0}")]
    Writer(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The raw elementary file format a codec is captured into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaExtension {
    Ivf,
    H264,
    Ogg,
}

impl MediaExtension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ivf => "ivf",
            Self::H264 => "h264",
            Self::Ogg => "ogg",
        }
    }
}

impl fmt::Display for MediaExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a codec MIME type to its elementary file extension. Case-insensitive.
pub fn media_extension(mime_type: &str) -> Option<MediaExtension> {
    if mime_type.eq_ignore_ascii_case(MIME_TYPE_VP8) || mime_type.eq_ignore_ascii_case(MIME_TYPE_VP9)
    {
        return Some(MediaExtension::Ivf);
    }
    if mime_type.eq_ignore_ascii_case(MIME_TYPE_H264) {
        return Some(MediaExtension::H264);
    }
    if mime_type.eq_ignore_ascii_case(MIME_TYPE_OPUS)
        || mime_type.eq_ignore_ascii_case(MIME_TYPE_G722)
        || mime_type.eq_ignore_ascii_case(MIME_TYPE_PCMU)
        || mime_type.eq_ignore_ascii_case(MIME_TYPE_PCMA)
    {
        return Some(MediaExtension::Ogg);
    }
    None
}

/// Builds `<file_id>.<extension>` for a codec, rejecting empty ids and ids
/// that already carry an extension.
pub fn media_filename(file_id: &str, mime_type: &str) -> Result<String, MediaError> {
    if file_id.is_empty() {
        return Err(MediaError::EmptyFileId);
    }
    if file_id.contains('.') {
        return Err(MediaError::ExtensionInFileId);
    }

    let ext = media_extension(mime_type).ok_or(MediaError::NotSupported)?;
    Ok(format!("{file_id}.{ext}"))
}

const OGG_SAMPLE_RATE: u32 = 48_000;

fn ivf_header(mime_type: &str) -> IVFFileHeader {
    IVFFileHeader {
        signature: *b"DKIF",
        version: 0,
        header_size: 32,
        four_cc: if mime_type.eq_ignore_ascii_case(MIME_TYPE_VP9) {
            *b"VP90"
        } else {
            *b"VP80"
        },
        width: 640,
        height: 480,
        timebase_denominator: 30,
        timebase_numerator: 1,
        num_frames: 900,
        unused: 0,
    }
}

/// Builds the codec-specific media writer on top of a sink.
pub fn create_writer<S>(
    sink: S,
    codec: &RTCRtpCodecParameters,
) -> Result<Box<dyn Writer + Send + Sync>, MediaError>
where
    S: Write + Seek + Send + Sync + 'static,
{
    let mime_type = &codec.capability.mime_type;
    match media_extension(mime_type) {
        Some(MediaExtension::Ivf) => {
            let writer = IVFWriter::new(sink, &ivf_header(mime_type))
                .map_err(|err| MediaError::Writer(err.to_string()))?;
            Ok(Box::new(writer))
        }
        Some(MediaExtension::H264) => Ok(Box::new(H264Writer::new(sink))),
        Some(MediaExtension::Ogg) => {
            // The Opus ID header stores the channel count in a single byte.
            let channels = u8::try_from(codec.capability.channels).unwrap_or(u8::MAX);
            let writer = OggWriter::new(sink, OGG_SAMPLE_RATE, channels.into())
                .map_err(|err| MediaError::Writer(err.to_string()))?;
            Ok(Box::new(writer))
        }
        None => Err(MediaError::NotSupported),
    }
}

/// Maximum reorder window, in RTP sequence units.
pub const SAMPLE_MAX_LATE: u16 = 200;

/// Builds the packet reorder buffer for codecs with a known depacketizer.
/// Codecs without one record packets in arrival order instead.
pub fn create_reconstructor(codec: &RTCRtpCodecParameters) -> Option<SampleReconstructor> {
    let mime_type = &codec.capability.mime_type;
    let depacketizer: Box<dyn Depacketizer + Send + Sync> = if mime_type.eq_ignore_ascii_case(MIME_TYPE_VP8)
    {
        Box::new(webrtc::rtp::codecs::vp8::Vp8Packet::default())
    } else if mime_type.eq_ignore_ascii_case(MIME_TYPE_VP9) {
        Box::new(webrtc::rtp::codecs::vp9::Vp9Packet::default())
    } else if mime_type.eq_ignore_ascii_case(MIME_TYPE_H264) {
        Box::new(webrtc::rtp::codecs::h264::H264Packet::default())
    } else if mime_type.eq_ignore_ascii_case(MIME_TYPE_OPUS) {
        Box::new(webrtc::rtp::codecs::opus::OpusPacket::default())
    } else {
        return None;
    };

    Some(SampleReconstructor::new(SAMPLE_MAX_LATE, depacketizer))
}
