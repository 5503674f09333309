//! Render specification resolved from job parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::JobParams;

/// Output aspect ratio presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AspectRatio {
    /// 9:16 vertical (1080x1920)
    #[default]
    Portrait,
    /// 16:9 horizontal (1920x1080)
    Landscape,
    /// 1:1 (1080x1080)
    Square,
}

impl AspectRatio {
    /// Output pixel dimensions (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            AspectRatio::Portrait => (1080, 1920),
            AspectRatio::Landscape => (1920, 1080),
            AspectRatio::Square => (1080, 1080),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Portrait => "portrait",
            AspectRatio::Landscape => "landscape",
            AspectRatio::Square => "square",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the source frame is fitted into the target aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReframeMode {
    /// Letterbox/pillarbox with blurred bars
    Pad,
    /// Scale to cover and crop around the frame center
    #[default]
    CenterCrop,
    /// Crop following a tracked subject when track data exists,
    /// falling back to center crop otherwise
    TrackedCrop,
}

impl ReframeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReframeMode::Pad => "pad",
            ReframeMode::CenterCrop => "center_crop",
            ReframeMode::TrackedCrop => "tracked_crop",
        }
    }
}

impl fmt::Display for ReframeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_font_size() -> u32 {
    48
}

fn default_bottom_margin() -> u32 {
    150
}

/// Caption rendering style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CaptionStyle {
    /// No burned-in captions; subtitle sidecars are still emitted.
    None,
    /// Burn captions into the frame from overlapping transcript segments.
    BurnIn {
        #[serde(default = "default_font_size")]
        font_size: u32,
        #[serde(default = "default_bottom_margin")]
        bottom_margin: u32,
    },
}

impl Default for CaptionStyle {
    fn default() -> Self {
        CaptionStyle::BurnIn {
            font_size: default_font_size(),
            bottom_margin: default_bottom_margin(),
        }
    }
}

impl CaptionStyle {
    pub fn burns_in(&self) -> bool {
        matches!(self, CaptionStyle::BurnIn { .. })
    }
}

/// Resolved output parameters for the render stage.
///
/// A pure value object derived from `JobParams`; it has no lifecycle of
/// its own and is recomputed per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderSpec {
    /// Target aspect ratio
    pub aspect_ratio: AspectRatio,

    /// Reframing strategy
    pub reframe: ReframeMode,

    /// Caption style
    pub captions: CaptionStyle,

    /// Minimum acceptable clip duration (seconds)
    pub min_duration_secs: f64,

    /// Maximum acceptable clip duration (seconds)
    pub max_duration_secs: f64,
}

impl RenderSpec {
    /// Resolve a spec from submitted parameters.
    ///
    /// Duration bounds bracket the requested target by ±50%, clamped to a
    /// floor of 5 seconds so boundary-clamped windows still render.
    pub fn resolve(params: &JobParams) -> Self {
        let target = params.target_duration_secs as f64;
        Self {
            aspect_ratio: params.aspect_ratio,
            reframe: ReframeMode::default(),
            captions: params.caption_style.clone(),
            min_duration_secs: (target * 0.5).max(5.0),
            max_duration_secs: target * 1.5,
        }
    }

    /// Resolve with an explicit reframe mode.
    pub fn with_reframe(mut self, reframe: ReframeMode) -> Self {
        self.reframe = reframe;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_match_ratio() {
        assert_eq!(AspectRatio::Portrait.dimensions(), (1080, 1920));
        assert_eq!(AspectRatio::Landscape.dimensions(), (1920, 1080));
        assert_eq!(AspectRatio::Square.dimensions(), (1080, 1080));
    }

    #[test]
    fn resolve_brackets_target_duration() {
        let params = JobParams {
            target_duration_secs: 30,
            ..Default::default()
        };
        let spec = RenderSpec::resolve(&params);
        assert_eq!(spec.min_duration_secs, 15.0);
        assert_eq!(spec.max_duration_secs, 45.0);
        assert!(spec.captions.burns_in());
    }
}
