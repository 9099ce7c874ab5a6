use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context as _;
use async_trait::async_trait;
use common::vec_of_strings;
use tokio::process::Command;

use crate::media::MediaExtension;

/// A computed containerization run: the mux tool's argv and the file it
/// produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxJob {
    pub args: Vec<String>,
    pub output: PathBuf,
}

/// Executes mux jobs. Swapped for a recording double in tests.
#[async_trait]
pub trait MuxRunner: Send + Sync {
    async fn run(&self, job: &MuxJob) -> anyhow::Result<()>;
}

/// Runs `ffmpeg` as a subprocess with inherited stdio.
pub struct FfmpegRunner;

impl FfmpegRunner {
    /// Fails fast when ffmpeg is not on PATH.
    pub async fn check() -> anyhow::Result<()> {
        let status = Command::new("ffmpeg")
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("ffmpeg not found in PATH")?;

        anyhow::ensure!(status.success(), "ffmpeg -version exited with {status}");
        Ok(())
    }
}

#[async_trait]
impl MuxRunner for FfmpegRunner {
    async fn run(&self, job: &MuxJob) -> anyhow::Result<()> {
        let status = Command::new("ffmpeg")
            .args(&job.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .status()
            .await
            .context("failed to spawn ffmpeg")?;

        anyhow::ensure!(status.success(), "ffmpeg exited with {status}");
        Ok(())
    }
}

/// Chooses the containerization case for the captured elementary files:
/// IVF video goes into `.webm`, H.264 video into `.mp4`, audio is copied in
/// alongside when present. Audio-only recordings skip containerization, so
/// there is no job for them.
pub fn mux_job(
    video: Option<(&Path, MediaExtension)>,
    audio: Option<&Path>,
    output_id: &str,
    dir: &Path,
) -> Option<MuxJob> {
    let (video_file, video_ext) = video?;
    let container = match video_ext {
        MediaExtension::Ivf => "webm",
        MediaExtension::H264 => "mp4",
        MediaExtension::Ogg => return None,
    };
    let output = dir.join(format!("{output_id}.{container}"));

    let mut args = vec_of_strings!["-i", video_file.display()];
    match audio {
        Some(audio_file) => args.extend(vec_of_strings![
            "-i",
            audio_file.display(),
            "-c:v",
            "copy",
            "-c:a",
            "copy",
            "-loglevel",
            "error",
            "-y",
            "-shortest",
            output.display(),
        ]),
        None => args.extend(vec_of_strings![
            "-c:v",
            "copy",
            "-loglevel",
            "error",
            "-y",
            output.display(),
        ]),
    }

    Some(MuxJob { args, output })
}
