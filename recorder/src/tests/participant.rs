use std::sync::Arc;

use crate::media::MediaError;
use crate::participant::{ParticipantRecorder, PliFn};
use crate::room::TrackKind;

use super::fake::{self, dir_files, wait_for, RecordingMuxRunner, RecordingUploader, ScriptedTrack};

fn noop_pli() -> PliFn {
    Arc::new(|_| {})
}

fn recorder_with(
    dir: &std::path::Path,
    uploader: Option<Arc<RecordingUploader>>,
    muxer: Arc<RecordingMuxRunner>,
) -> ParticipantRecorder {
    ParticipantRecorder::new(
        "alice",
        dir.to_path_buf(),
        uploader.map(|u| u as Arc<dyn crate::upload::Uploader>),
        noop_pli(),
        muxer,
    )
}

#[tokio::test]
async fn test_muxed_av_h264_opus_produces_mp4() {
    let dir = tempfile::tempdir().expect("tempdir");
    let muxer = Arc::new(RecordingMuxRunner::default());
    let mut recorder = recorder_with(dir.path(), None, muxer.clone());

    let (video, video_packets) =
        ScriptedTrack::new("TR_v", TrackKind::Video, 1, fake::h264_codec());
    let (audio, audio_packets) =
        ScriptedTrack::new("TR_a", TrackKind::Audio, 2, fake::opus_codec());

    recorder.register_video(video).await.expect("h264 video");
    recorder.register_audio(audio).await.expect("opus audio");
    assert!(recorder.has_video());
    assert!(recorder.has_audio());

    let raw_files = dir_files(dir.path());
    assert_eq!(raw_files.len(), 2, "one raw file per registered track");
    let video_file = raw_files
        .iter()
        .find(|p| p.extension().is_some_and(|e| e == "h264"))
        .expect("h264 file")
        .clone();
    let audio_file = raw_files
        .iter()
        .find(|p| p.extension().is_some_and(|e| e == "ogg"))
        .expect("ogg file")
        .clone();

    recorder.start();
    for seq in 0..20u16 {
        let _ = audio_packets.send(fake::opus_packet(seq));
    }
    drop(video_packets);
    drop(audio_packets);

    let data = recorder.stop().await.expect("completion record");
    assert_eq!(data.identity, "alice");
    assert!(data.end >= data.start);

    // The reference command line for the muxed mp4 case.
    let jobs = muxer.jobs.lock().unwrap();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    let mut expected = vec![
        "-i".to_string(),
        video_file.display().to_string(),
        "-i".to_string(),
        audio_file.display().to_string(),
    ];
    expected.extend(
        ["-c:v", "copy", "-c:a", "copy", "-loglevel", "error", "-y", "-shortest"]
            .map(String::from),
    );
    expected.push(job.output.display().to_string());
    assert_eq!(job.args, expected);
    assert!(job.output.extension().is_some_and(|e| e == "mp4"));
    assert_eq!(data.output, job.output.display().to_string());

    // Raw elementary files are deleted after a successful mux.
    assert!(!video_file.exists());
    assert!(!audio_file.exists());
    assert!(job.output.exists());
}

#[tokio::test]
async fn test_vp8_video_produces_webm() {
    let dir = tempfile::tempdir().expect("tempdir");
    let muxer = Arc::new(RecordingMuxRunner::default());
    let mut recorder = recorder_with(dir.path(), None, muxer.clone());

    let (video, packets) = ScriptedTrack::new("TR_v", TrackKind::Video, 1, fake::vp8_codec());
    recorder.register_video(video).await.expect("vp8 video");

    recorder.start();
    for seq in 0..10u16 {
        let _ = packets.send(fake::vp8_packet(seq));
    }
    drop(packets);

    let data = recorder.stop().await.expect("completion record");

    let jobs = muxer.jobs.lock().unwrap();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert!(job.output.extension().is_some_and(|e| e == "webm"));
    assert_eq!(
        &job.args[2..],
        &[
            "-c:v".to_string(),
            "copy".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            job.output.display().to_string(),
        ]
    );
    assert_eq!(data.output, job.output.display().to_string());
}

#[tokio::test]
async fn test_audio_only_skips_containerization() {
    let dir = tempfile::tempdir().expect("tempdir");
    let muxer = Arc::new(RecordingMuxRunner::default());
    let mut recorder = recorder_with(dir.path(), None, muxer.clone());

    let (audio, packets) = ScriptedTrack::new("TR_a", TrackKind::Audio, 2, fake::opus_codec());
    recorder.register_audio(audio).await.expect("opus audio");

    recorder.start();
    drop(packets);

    let data = recorder.stop().await.expect("completion record");

    assert!(muxer.jobs.lock().unwrap().is_empty());
    assert!(data.output.ends_with(".ogg"));
    // Without an uploader the raw ogg is the final artifact.
    assert!(std::path::Path::new(&data.output).exists());
}

#[tokio::test]
async fn test_audio_only_upload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let muxer = Arc::new(RecordingMuxRunner::default());
    let uploader = Arc::new(RecordingUploader::new("meetings"));
    let mut recorder = recorder_with(dir.path(), Some(uploader.clone()), muxer);

    let (audio, packets) = ScriptedTrack::new("TR_a", TrackKind::Audio, 2, fake::opus_codec());
    recorder.register_audio(audio).await.expect("opus audio");

    recorder.start();
    drop(packets);

    let data = recorder.stop().await.expect("completion record");

    wait_for("upload", || !uploader.uploads.lock().unwrap().is_empty()).await;
    let uploads = uploader.uploads.lock().unwrap();
    let (key, contents) = &uploads[0];
    assert!(key.ends_with(".ogg"));
    assert!(!contents.is_empty());
    assert_eq!(data.output, format!("meetings/{key}"));

    // The local copy goes away once the upload lands.
    wait_for("local cleanup", || dir_files(dir.path()).is_empty()).await;
}

#[tokio::test]
async fn test_mux_failure_keeps_raw_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let muxer = Arc::new(RecordingMuxRunner::failing());
    let mut recorder = recorder_with(dir.path(), None, muxer.clone());

    let (video, packets) = ScriptedTrack::new("TR_v", TrackKind::Video, 1, fake::vp8_codec());
    recorder.register_video(video).await.expect("vp8 video");

    recorder.start();
    drop(packets);

    let data = recorder.stop().await.expect("completion record");
    assert!(data.output.is_empty(), "no output on mux failure");
    assert_eq!(dir_files(dir.path()).len(), 1, "raw capture is kept");
}

#[tokio::test]
async fn test_start_is_idempotent_and_stop_is_final() {
    let dir = tempfile::tempdir().expect("tempdir");
    let muxer = Arc::new(RecordingMuxRunner::default());
    let mut recorder = recorder_with(dir.path(), None, muxer.clone());

    let (audio, packets) = ScriptedTrack::new("TR_a", TrackKind::Audio, 2, fake::opus_codec());
    recorder.register_audio(audio).await.expect("opus audio");

    recorder.start();
    let first_start = recorder.data().start;
    recorder.start();
    assert_eq!(recorder.data().start, first_start);

    drop(packets);
    assert!(recorder.stop().await.is_some());

    // `stop` from done is a no-op.
    assert!(recorder.stop().await.is_none());
}

#[tokio::test]
async fn test_stop_without_start_produces_no_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let muxer = Arc::new(RecordingMuxRunner::default());
    let mut recorder = recorder_with(dir.path(), None, muxer.clone());

    let (audio, _packets) = ScriptedTrack::new("TR_a", TrackKind::Audio, 2, fake::opus_codec());
    recorder.register_audio(audio).await.expect("opus audio");

    assert!(recorder.stop().await.is_none());
    assert!(muxer.jobs.lock().unwrap().is_empty());

    // `start` after `stop` must not revive the recorder.
    recorder.start();
    assert!(recorder.stop().await.is_none());
}

#[tokio::test]
async fn test_second_registration_replaces_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    let muxer = Arc::new(RecordingMuxRunner::default());
    let mut recorder = recorder_with(dir.path(), None, muxer);

    let (first, _first_packets) =
        ScriptedTrack::new("TR_v1", TrackKind::Video, 1, fake::vp8_codec());
    recorder.register_video(first).await.expect("vp8 video");
    let first_file = dir_files(dir.path())[0].clone();

    let (second, _second_packets) =
        ScriptedTrack::new("TR_v2", TrackKind::Video, 2, fake::vp8_codec());
    recorder.register_video(second).await.expect("vp8 video");

    // The stale capture file is removed together with its recorder.
    assert!(!first_file.exists());
    assert_eq!(dir_files(dir.path()).len(), 1);
}

#[tokio::test]
async fn test_register_unsupported_codec_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let muxer = Arc::new(RecordingMuxRunner::default());
    let mut recorder = recorder_with(dir.path(), None, muxer);

    let (video, _packets) = ScriptedTrack::new("TR_v", TrackKind::Video, 1, fake::av1_codec());
    assert!(matches!(
        recorder.register_video(video).await,
        Err(MediaError::NotSupported)
    ));
    assert!(!recorder.has_video());
}
