//! Reframing filter construction.
//!
//! Builds the `-vf` chain that fits the source frame into the target
//! aspect ratio. Tracked crop consumes a per-second horizontal center
//! track; with no track data it degrades to a center crop.

use clipforge_models::{AspectRatio, ReframeMode};

use crate::render::SubjectTrack;

/// Build the reframe filter chain for one clip.
pub fn reframe_filter(
    mode: ReframeMode,
    aspect: AspectRatio,
    track: Option<&SubjectTrack>,
) -> String {
    let (w, h) = aspect.dimensions();
    match mode {
        ReframeMode::Pad => pad_filter(w, h),
        ReframeMode::CenterCrop => center_crop_filter(w, h),
        ReframeMode::TrackedCrop => match track {
            Some(track) if !track.centers.is_empty() => tracked_crop_filter(w, h, track),
            _ => center_crop_filter(w, h),
        },
    }
}

/// Scale to fit, then pad with a blurred copy of the frame behind.
fn pad_filter(w: u32, h: u32) -> String {
    format!(
        "split[fg][bg];\
         [bg]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},boxblur=20:5[blurred];\
         [fg]scale={w}:{h}:force_original_aspect_ratio=decrease[scaled];\
         [blurred][scaled]overlay=(W-w)/2:(H-h)/2"
    )
}

/// Scale to cover, crop around the frame center.
fn center_crop_filter(w: u32, h: u32) -> String {
    format!("scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}")
}

/// Crop following the tracked subject.
///
/// The horizontal crop offset is a piecewise-linear function of time built
/// from the track's normalized centers (0 = left edge, 1 = right edge).
fn tracked_crop_filter(w: u32, h: u32, track: &SubjectTrack) -> String {
    let x_expr = track_x_expr(track);
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,\
         crop={w}:{h}:x='clip(({x_expr})*(iw-{w}),0,iw-{w})':y='(ih-{h})/2'"
    )
}

/// Piecewise-linear interpolation over the track keyframes as an ffmpeg
/// expression in `t`.
fn track_x_expr(track: &SubjectTrack) -> String {
    let centers = &track.centers;
    if centers.len() == 1 {
        return format!("{:.4}", centers[0].1);
    }

    // Nested if(lt(t,...)) chain, linear between keyframes, clamped at the ends.
    let mut expr = format!("{:.4}", centers.last().expect("nonempty").1);
    for pair in centers.windows(2).rev() {
        let (t0, c0) = pair[0];
        let (t1, c1) = pair[1];
        let span = (t1 - t0).max(1e-6);
        expr = format!(
            "if(lt(t,{t1:.3}),{c0:.4}+({c1:.4}-{c0:.4})*(t-{t0:.3})/{span:.3},{expr})"
        );
    }
    format!("if(lt(t,{:.3}),{:.4},{})", centers[0].0, centers[0].1, expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_crop_uses_target_dims() {
        let f = reframe_filter(ReframeMode::CenterCrop, AspectRatio::Portrait, None);
        assert!(f.contains("scale=1080:1920"));
        assert!(f.contains("crop=1080:1920"));
    }

    #[test]
    fn pad_builds_blurred_background() {
        let f = reframe_filter(ReframeMode::Pad, AspectRatio::Square, None);
        assert!(f.contains("boxblur"));
        assert!(f.contains("overlay=(W-w)/2:(H-h)/2"));
    }

    #[test]
    fn tracked_without_data_falls_back_to_center() {
        let empty = SubjectTrack { centers: vec![] };
        let f = reframe_filter(ReframeMode::TrackedCrop, AspectRatio::Portrait, Some(&empty));
        assert_eq!(
            f,
            reframe_filter(ReframeMode::CenterCrop, AspectRatio::Portrait, None)
        );
    }

    #[test]
    fn tracked_crop_interpolates_centers() {
        let track = SubjectTrack {
            centers: vec![(0.0, 0.2), (10.0, 0.8)],
        };
        let f = reframe_filter(ReframeMode::TrackedCrop, AspectRatio::Portrait, Some(&track));
        assert!(f.contains("crop=1080:1920:x="));
        assert!(f.contains("0.2000"));
        assert!(f.contains("0.8000"));
        assert!(f.contains("lt(t,10.000)"));
    }

    #[test]
    fn single_keyframe_track_is_constant() {
        let track = SubjectTrack {
            centers: vec![(0.0, 0.5)],
        };
        assert_eq!(track_x_expr(&track), "0.5000");
    }
}
