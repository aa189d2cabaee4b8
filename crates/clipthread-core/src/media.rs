use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ClipthreadError, Result};
use crate::types::Chapter;

/// Output path for a chapter clip, 1-based: `chapter_1.mp4`, `chapter_2.mp4`, ...
pub fn chapter_output_path(output_dir: &Path, index: usize) -> PathBuf {
    output_dir.join(format!("chapter_{}.mp4", index + 1))
}

/// ffmpeg arguments trimming `chapter` out of `source` into `output`.
///
/// Seeking before the input plus re-encoding rebases presentation timestamps
/// so every clip starts at zero.
fn trim_args(source: &Path, chapter: &Chapter, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        format!("{:.3}", chapter.start_time),
        "-i".to_string(),
        source.to_string_lossy().to_string(),
        "-t".to_string(),
        format!("{:.3}", chapter.duration()),
        output.to_string_lossy().to_string(),
    ]
}

/// Cut one clip per chapter into `output_dir`, returning the output paths in
/// chapter order.
///
/// Chapters whose output file already exists are skipped, so a re-run after
/// a partial failure only does the remaining work. All trims run
/// concurrently; the call returns once every spawned ffmpeg has exited. A
/// non-zero exit fails the whole call with the 1-based chapter index and the
/// captured stderr.
pub async fn segment(
    source: &Path,
    chapters: &[Chapter],
    output_dir: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<PathBuf>> {
    let outputs: Vec<PathBuf> = (0..chapters.len())
        .map(|i| chapter_output_path(output_dir, i))
        .collect();

    let mut jobs = JoinSet::new();
    for (index, chapter) in chapters.iter().enumerate() {
        let output = &outputs[index];
        if output.exists() {
            debug!(chapter = index + 1, path = %output.display(), "clip exists, skipping");
            continue;
        }

        let args = trim_args(source, chapter, output);
        debug!(chapter = index + 1, ?args, "spawning ffmpeg");
        jobs.spawn(async move {
            let result = Command::new("ffmpeg")
                .args(&args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await;
            (index, result)
        });
    }

    let spawned = jobs.len();
    loop {
        let joined = tokio::select! {
            _ = cancel.cancelled() => {
                jobs.abort_all();
                return Err(ClipthreadError::Cancelled);
            }
            joined = jobs.join_next() => joined,
        };
        let Some(joined) = joined else { break };

        let (index, result) =
            joined.map_err(|e| std::io::Error::other(format!("trim task failed: {e}")))?;
        let output = result?;
        if !output.status.success() {
            jobs.abort_all();
            return Err(ClipthreadError::SegmentationError {
                chapter: index + 1,
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        debug!(chapter = index + 1, "clip written");
    }

    info!(
        chapters = chapters.len(),
        trimmed = spawned,
        skipped = chapters.len() - spawned,
        "segmentation complete"
    );
    Ok(outputs)
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Video duration in seconds, via ffprobe.
pub async fn probe_duration(path: &Path) -> Result<f64> {
    if !path.exists() {
        return Err(ClipthreadError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        return Err(ClipthreadError::ProbeFailed {
            path: path.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let probe: FfprobeOutput =
        serde_json::from_slice(&output.stdout).map_err(|e| ClipthreadError::ProbeFailed {
            path: path.to_path_buf(),
            reason: format!("unparseable ffprobe output: {e}"),
        })?;

    probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| ClipthreadError::ProbeFailed {
            path: path.to_path_buf(),
            reason: "no duration in ffprobe output".to_string(),
        })
}
