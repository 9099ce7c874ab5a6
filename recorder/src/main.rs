use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use common::{context::Context, logging, signal};
use tokio::{select, signal::unix::SignalKind, time};

use recorder::{api, auth, config, global, processing, room, service, upload};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::AppConfig::parse()?;

    logging::init(&config.log_level, false)?;

    tracing::info!("starting");

    // The mux tool is a hard dependency of post-processing.
    processing::FfmpegRunner::check()
        .await
        .context("ffmpeg is required for post-processing")?;

    std::fs::create_dir_all(&config.recordings_dir)
        .context("cannot create recordings directory")?;
    std::fs::set_permissions(
        &config.recordings_dir,
        std::fs::Permissions::from_mode(0o755),
    )
    .context("cannot set recordings directory permissions")?;

    let (ctx, handler) = Context::new();

    let token_builder =
        auth::AccessTokenBuilder::new(config.api_key.clone(), config.api_secret.clone());
    let room_client = Arc::new(room::twirp::TwirpRoomClient::new(
        &config.room_url,
        token_builder.clone(),
    )?);

    let service = service::RecordingService::new(service::ServiceOptions {
        url: config.room_url.clone(),
        auth: token_builder.clone(),
        client: room_client,
        // The SFU session collaborator is supplied by the embedding
        // deployment; see `room::RoomConnector`.
        connector: None,
        webhooks: config.webhook_urls.clone(),
        recordings_dir: config.recordings_dir.clone(),
        muxer: Arc::new(processing::FfmpegRunner),
    })?;

    if let Some(s3) = &config.s3 {
        let uploader =
            upload::S3Uploader::new(s3.region.clone(), s3.bucket.clone(), s3.directory.clone())
                .await;
        service.set_uploader(Some(Arc::new(uploader))).await;
        tracing::info!(bucket = s3.bucket, "uploader enabled");
    }

    let global = Arc::new(global::GlobalState::new(config, ctx, token_builder, service));

    let api_future = tokio::spawn(api::run(global.clone()));

    let mut signal_handler = signal::SignalHandler::new()
        .with_signal(SignalKind::interrupt())
        .with_signal(SignalKind::terminate());

    select! {
        r = api_future => tracing::error!("api stopped unexpectedly: {:?}", r),
        _ = signal_handler.recv() => tracing::info!("shutting down"),
    }

    // Stop in-flight recordings (post-processing included) before cancelling
    // the context the servers run under.
    global.service.shutdown().await;
    drop(global);

    tracing::info!("waiting for tasks to finish");

    select! {
        _ = time::sleep(Duration::from_secs(60)) => tracing::warn!("force shutting down"),
        _ = signal_handler.recv() => tracing::warn!("force shutting down"),
        _ = handler.cancel() => tracing::info!("shutdown complete"),
    }

    Ok(())
}
