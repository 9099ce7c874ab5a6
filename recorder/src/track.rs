use std::io;
use std::sync::Arc;
use std::time::Duration;

use common::context::{Context, Handler};
use common::prelude::FutureTimeout;
use webrtc::media::io::Writer;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecParameters;

use crate::media::{self, reconstructor::SampleReconstructor, MediaError};
use crate::room::{RemoteTrack, TrackReadError};
use crate::sink::{self, Sink};

/// How long `stop` waits for the read loop to drain and close the sink.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum TrackRecorderError {
    #[error("recorder stop timeout")]
    StopTimeout,
}

/// Records a single subscribed track into a sink.
///
/// One task owns the read loop; `stop` cancels it cooperatively and waits,
/// bounded by [`STOP_TIMEOUT`]. The sink is closed by the time `stop`
/// returns, even when the wait times out.
pub struct TrackRecorder<S: Sink> {
    sink: S,
    writer: Option<Box<dyn Writer + Send + Sync>>,
    reconstructor: Option<SampleReconstructor>,
    ctx: Option<Context>,
    handler: Option<Handler>,
}

impl<S: Sink> TrackRecorder<S> {
    /// Builds the codec-specific writer and, for codecs with a depacketizer,
    /// the reorder buffer. Fails with [`MediaError::NotSupported`] for
    /// codecs outside the catalog.
    pub fn new(
        codec: &RTCRtpCodecParameters,
        sink: S,
        on_packet_dropped: Option<Box<dyn Fn() + Send + Sync>>,
    ) -> Result<Self, MediaError> {
        let writer = media::create_writer(sink.clone(), codec)?;
        let reconstructor = media::create_reconstructor(codec).map(|reconstructor| {
            match on_packet_dropped {
                Some(f) => reconstructor.with_packet_dropped(f),
                None => reconstructor,
            }
        });
        let (ctx, handler) = Context::new();

        Ok(Self {
            sink,
            writer: Some(writer),
            reconstructor,
            ctx: Some(ctx),
            handler: Some(handler),
        })
    }

    /// Launches the read loop. A second call is a no-op.
    pub fn start(&mut self, track: Arc<dyn RemoteTrack>) {
        let (Some(ctx), Some(writer)) = (self.ctx.take(), self.writer.take()) else {
            return;
        };
        let reconstructor = self.reconstructor.take();
        let sink = self.sink.clone();

        tokio::spawn(read_loop(ctx, track, writer, reconstructor, sink));
    }

    /// Cancels the read loop and waits for it to finish. Safe to call on a
    /// recorder that was never started; the sink still ends up closed.
    pub async fn stop(&mut self) -> Result<(), TrackRecorderError> {
        if self.ctx.is_some() {
            // Never started: there is no task to drain, but the sink must
            // not stay open.
            self.ctx = None;
            self.writer = None;
            let _ = self.sink.close();
        }

        let Some(handler) = self.handler.take() else {
            return Ok(());
        };

        match handler.cancel().timeout(STOP_TIMEOUT).await {
            Ok(()) => Ok(()),
            Err(_) => {
                let _ = self.sink.close();
                Err(TrackRecorderError::StopTimeout)
            }
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

async fn read_loop<S: Sink>(
    ctx: Context,
    track: Arc<dyn RemoteTrack>,
    mut writer: Box<dyn Writer + Send + Sync>,
    mut reconstructor: Option<SampleReconstructor>,
    sink: S,
) {
    let result = pump(&ctx, track.as_ref(), writer.as_mut(), &mut reconstructor).await;

    if let Err(err) = &result {
        if !is_sink_closed_error(err) {
            tracing::warn!(track = %track.sid(), error = %err, "track recorder error");
        }
    }

    // Flushes any container trailer the writer still owes the sink.
    if let Err(err) = writer.close() {
        tracing::debug!(track = %track.sid(), error = %err, "cannot close media writer");
    }
    if let Err(err) = sink.close() {
        tracing::debug!(track = %track.sid(), error = %err, "sink already closed");
    }
}

async fn pump(
    ctx: &Context,
    track: &dyn RemoteTrack,
    writer: &mut (dyn Writer + Send + Sync),
    reconstructor: &mut Option<SampleReconstructor>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            _ = ctx.done() => return Ok(()),
            read = track.read_rtp() => match read {
                Ok(packet) => write_packet(writer, reconstructor, packet)?,
                Err(TrackReadError::Eof) => return Ok(()),
                Err(err) => return Err(err.into()),
            },
        }
    }
}

fn write_packet(
    writer: &mut (dyn Writer + Send + Sync),
    reconstructor: &mut Option<SampleReconstructor>,
    packet: webrtc::rtp::packet::Packet,
) -> anyhow::Result<()> {
    match reconstructor {
        Some(reconstructor) => {
            reconstructor.push(packet);
            for packet in reconstructor.pop_ready() {
                writer.write_rtp(&packet)?;
            }
        }
        None => writer.write_rtp(&packet)?,
    }

    Ok(())
}

fn is_sink_closed_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.downcast_ref::<sink::SinkClosed>().is_some()
            || cause
                .downcast_ref::<io::Error>()
                .map(sink::is_sink_closed)
                .unwrap_or(false)
    })
}
