//! Clip publication: artifact + subtitle uploads with stable locators.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use clipforge_models::JobId;

use crate::client::ObjectStoreClient;
use crate::error::StorageResult;

/// Local files for one clip awaiting publication.
#[derive(Debug, Clone)]
pub struct ClipUpload {
    /// Stable per-(job, window) key from the render stage
    pub window_key: String,
    pub video_path: PathBuf,
    pub srt_path: PathBuf,
    pub vtt_path: PathBuf,
    /// Optional thumbnail
    pub thumbnail_path: Option<PathBuf>,
}

/// Locators of a published clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedClip {
    pub artifact_locator: String,
    pub srt_locator: String,
    pub vtt_locator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_locator: Option<String>,
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mp4") => "video/mp4",
        Some("srt") => "application/x-subrip",
        Some("vtt") => "text/vtt",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

impl ObjectStoreClient {
    /// Key prefix for a job's clips.
    fn clip_prefix(owner_id: &str, job_id: &JobId) -> String {
        format!("{owner_id}/{job_id}/clips")
    }

    /// Publish one clip's artifact and subtitle tracks.
    ///
    /// Keys derive from the render-stage window key, so republishing the
    /// same (job, window) overwrites rather than duplicates.
    pub async fn publish_clip(
        &self,
        owner_id: &str,
        job_id: &JobId,
        upload: &ClipUpload,
    ) -> StorageResult<PublishedClip> {
        let prefix = Self::clip_prefix(owner_id, job_id);
        let base = format!("{prefix}/clip_{}", upload.window_key);

        let artifact_locator = format!("{base}.mp4");
        self.upload_file(
            &upload.video_path,
            &artifact_locator,
            content_type_for(&upload.video_path),
        )
        .await?;

        let srt_locator = format!("{base}.srt");
        self.upload_file(&upload.srt_path, &srt_locator, "application/x-subrip")
            .await?;

        let vtt_locator = format!("{base}.vtt");
        self.upload_file(&upload.vtt_path, &vtt_locator, "text/vtt")
            .await?;

        let thumbnail_locator = match &upload.thumbnail_path {
            Some(thumb) => {
                let key = format!("{base}.jpg");
                self.upload_file(thumb, &key, "image/jpeg").await?;
                Some(key)
            }
            None => None,
        };

        info!(%job_id, key = %upload.window_key, "Published clip");
        Ok(PublishedClip {
            artifact_locator,
            srt_locator,
            vtt_locator,
            thumbnail_locator,
        })
    }
}
