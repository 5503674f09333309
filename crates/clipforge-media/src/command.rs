//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// How much trailing stderr to keep for error reports.
const STDERR_TAIL_BYTES: usize = 4096;

/// Builder for FFmpeg invocations.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: Option<PathBuf>,
    input_args: Vec<String>,
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Command producing an output file.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: Some(output.as_ref().to_path_buf()),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    /// Analysis command discarding output (`-f null -`).
    pub fn analyze(input: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: None,
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    /// Add an argument before `-i`.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an argument after `-i`.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add several arguments after `-i`.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Seek to `start` and read `duration` seconds (input-side, keyframe-fast).
    pub fn window(self, start_secs: f64, duration_secs: f64) -> Self {
        self.input_arg("-ss")
            .input_arg(format!("{start_secs:.3}"))
            .input_arg("-t")
            .input_arg(format!("{duration_secs:.3}"))
    }

    /// Set the video filter chain.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set the audio filter chain.
    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    /// Set a complex filter graph.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Normalized H.264/AAC encode settings used for all clip artifacts.
    pub fn normalized_encode(self) -> Self {
        self.output_args([
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-crf",
            "20",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "aac",
            "-b:a",
            "128k",
            "-movflags",
            "+faststart",
        ])
    }

    /// Extract a single frame (thumbnails).
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    /// Assemble the full argument list.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
        ];
        args.extend(self.input_args.clone());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.clone());
        match &self.output {
            Some(output) => args.push(output.to_string_lossy().to_string()),
            None => {
                args.push("-f".to_string());
                args.push("null".to_string());
                args.push("-".to_string());
            }
        }
        args
    }
}

/// Runner with cancellation and timeout support.
#[derive(Default)]
pub struct FfmpegRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the process when the channel flips to `true`.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Kill the process after `secs` seconds.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run the command to completion, returning captured stderr.
    ///
    /// Analysis callers parse the returned stderr (`showinfo`, `ametadata`
    /// output lands there); render callers only see it inside errors.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<String> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stderr_pipe = child.stderr.take().expect("stderr piped");
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            stderr_pipe.read_to_string(&mut buf).await.ok();
            buf
        });

        let status = self.wait(&mut child).await;

        let stderr = stderr_task.await.unwrap_or_default();
        let status = match status {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "ffmpeg did not finish cleanly");
                return Err(e);
            }
        };

        if status.success() {
            Ok(stderr)
        } else {
            let tail = stderr_tail(&stderr);
            Err(MediaError::toolchain(
                "ffmpeg exited with non-zero status",
                Some(tail),
                status.code(),
            ))
        }
    }

    async fn wait(&self, child: &mut tokio::process::Child) -> MediaResult<std::process::ExitStatus> {
        let mut cancel_rx = self.cancel_rx.clone();

        let wait_with_cancel = async {
            loop {
                match &mut cancel_rx {
                    Some(rx) => {
                        tokio::select! {
                            status = child.wait() => return status.map_err(MediaError::from),
                            changed = rx.changed() => {
                                if changed.is_err() || *rx.borrow() {
                                    child.kill().await.ok();
                                    return Err(MediaError::Cancelled);
                                }
                            }
                        }
                    }
                    None => return child.wait().await.map_err(MediaError::from),
                }
            }
        };

        match self.timeout_secs {
            Some(secs) => {
                match tokio::time::timeout(std::time::Duration::from_secs(secs), wait_with_cancel)
                    .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("ffmpeg timed out after {secs}s, killing");
                        child.kill().await.ok();
                        Err(MediaError::Timeout(secs))
                    }
                }
            }
            None => wait_with_cancel.await,
        }
    }
}

fn stderr_tail(stderr: &str) -> String {
    if stderr.len() <= STDERR_TAIL_BYTES {
        return stderr.to_string();
    }
    let start = stderr.len() - STDERR_TAIL_BYTES;
    // Snap to a char boundary
    let start = (start..stderr.len())
        .find(|i| stderr.is_char_boundary(*i))
        .unwrap_or(start);
    stderr[start..].to_string()
}

/// Check if ffmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if ffprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_builds_input_side_seek() {
        let args = FfmpegCommand::new("in.mp4", "out.mp4")
            .window(12.5, 30.0)
            .build_args();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < i);
        assert_eq!(args[ss + 1], "12.500");
        assert!(args.contains(&"-t".to_string()));
        assert!(args.contains(&"30.000".to_string()));
    }

    #[test]
    fn analyze_discards_output() {
        let args = FfmpegCommand::analyze("in.mp4")
            .video_filter("select='gt(scene,0.4)',showinfo")
            .build_args();
        assert_eq!(args[args.len() - 3], "-f");
        assert_eq!(args[args.len() - 2], "null");
        assert_eq!(args[args.len() - 1], "-");
    }

    #[test]
    fn normalized_encode_sets_codecs() {
        let args = FfmpegCommand::new("in.mp4", "out.mp4")
            .normalized_encode()
            .build_args();
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
    }

    #[test]
    fn stderr_tail_respects_char_boundaries() {
        let s = "é".repeat(STDERR_TAIL_BYTES);
        let tail = stderr_tail(&s);
        assert!(tail.len() <= STDERR_TAIL_BYTES);
    }
}
