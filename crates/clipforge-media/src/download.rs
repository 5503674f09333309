//! Source download into a job workdir.
//!
//! Remote URLs are fetched with yt-dlp, which handles both hosting
//! platforms and direct file URLs. Messages that indicate the video itself
//! is inaccessible are flagged permanent so the worker fails the job
//! instead of burning its retry budget.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{MediaError, MediaResult};

/// Download a remote source into `workdir`, returning the local path.
pub async fn download_source(url: &str, workdir: &Path, timeout_secs: u64) -> MediaResult<PathBuf> {
    which::which("yt-dlp").map_err(|_| MediaError::download_failed("yt-dlp not found in PATH"))?;

    tokio::fs::create_dir_all(workdir).await?;
    let output_template = workdir.join("source.%(ext)s");

    info!(url, "Downloading source");

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(timeout_secs),
        Command::new("yt-dlp")
            .args([
                "--no-playlist",
                "--no-progress",
                "-f",
                "bv*[height<=1080]+ba/b[height<=1080]/b",
                "--merge-output-format",
                "mp4",
                "-o",
            ])
            .arg(&output_template)
            .arg(url)
            .stdin(Stdio::null())
            .output(),
    )
    .await;

    let output = match result {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(MediaError::download_failed(format!("yt-dlp spawn: {e}"))),
        Err(_) => return Err(MediaError::Timeout(timeout_secs)),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        warn!(url, stderr = %stderr.trim(), "Source download failed");
        return Err(MediaError::download_failed(stderr));
    }

    // yt-dlp resolved the extension itself; find what it wrote.
    let mut entries = tokio::fs::read_dir(workdir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path
            .file_stem()
            .map(|stem| stem == "source")
            .unwrap_or(false)
        {
            info!(path = %path.display(), "Source downloaded");
            return Ok(path);
        }
    }

    Err(MediaError::download_failed(
        "yt-dlp succeeded but produced no source file",
    ))
}

/// Whether a download failure message indicates the video is permanently
/// inaccessible (retrying cannot help).
pub fn is_permanent_download_failure(message: &str) -> bool {
    let msg = message.to_lowercase();

    if msg.contains("private video") || msg.contains("video is private") {
        return true;
    }
    if msg.contains("video unavailable") || msg.contains("video not available") {
        return true;
    }
    if msg.contains("has been removed") || msg.contains("was deleted") {
        return true;
    }
    if msg.contains("age") && (msg.contains("restrict") || msg.contains("verif")) {
        return true;
    }
    if msg.contains("copyright") && msg.contains("block") {
        return true;
    }
    if msg.contains("not available in your country") || msg.contains("blocked in your country") {
        return true;
    }
    if msg.contains("unsupported url") {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_failures_are_recognized() {
        assert!(is_permanent_download_failure("ERROR: Private video"));
        assert!(is_permanent_download_failure("Video unavailable"));
        assert!(is_permanent_download_failure(
            "This video is not available in your country"
        ));
        assert!(is_permanent_download_failure(
            "Sign in to confirm your age. This video may be age-restricted"
        ));
        assert!(is_permanent_download_failure("Unsupported URL: ftp://x"));
    }

    #[test]
    fn transient_failures_are_not_permanent() {
        assert!(!is_permanent_download_failure("HTTP Error 503"));
        assert!(!is_permanent_download_failure("Connection reset by peer"));
        assert!(!is_permanent_download_failure("timed out"));
    }
}
