//! Webcam picture-in-picture compositing.
//!
//! Pure transform: no I/O, no shared state. The overlay is scaled to a fifth of the
//! primary frame's width, keeps its own aspect ratio, and sits in the bottom-right
//! corner with a fixed padding.

use image::imageops::{self, FilterType};

use super::error::RecorderError;
use super::frame::Frame;

/// Gap between the overlay and the primary frame's right and bottom edges.
pub const OVERLAY_PADDING: u32 = 20;

/// Overlay width as a fraction of the primary width.
pub const OVERLAY_WIDTH_DIVISOR: u32 = 5;

/// Where and how large the overlay lands on a given primary frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayPlacement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Computes the overlay rectangle, or `None` when it would not fit.
pub fn placement(
    primary_width: u32,
    primary_height: u32,
    overlay_width: u32,
    overlay_height: u32,
) -> Option<OverlayPlacement> {
    if overlay_width == 0 || overlay_height == 0 {
        return None;
    }
    let width = primary_width / OVERLAY_WIDTH_DIVISOR;
    if width == 0 {
        return None;
    }
    let aspect = f64::from(overlay_width) / f64::from(overlay_height);
    let height = (f64::from(width) / aspect) as u32;
    if height == 0 {
        return None;
    }

    let x = i64::from(primary_width) - i64::from(width) - i64::from(OVERLAY_PADDING);
    let y = i64::from(primary_height) - i64::from(height) - i64::from(OVERLAY_PADDING);
    if x < 0 || y < 0 {
        return None;
    }

    Some(OverlayPlacement {
        x: x as u32,
        y: y as u32,
        width,
        height,
    })
}

/// Overlays `overlay` onto `primary`.
///
/// Without an overlay the primary frame is returned untouched. An overlay that does
/// not fit is skipped for this frame; the output always has the primary's dimensions.
pub fn compose(primary: Frame, overlay: Option<&Frame>) -> Frame {
    let Some(overlay) = overlay else {
        return primary;
    };
    match try_compose(primary, overlay) {
        Ok(frame) => frame,
        Err((frame, e)) => {
            tracing::debug!("Skipping webcam overlay: {}", e);
            frame
        }
    }
}

fn try_compose(mut primary: Frame, overlay: &Frame) -> Result<Frame, (Frame, RecorderError)> {
    let Some(place) = placement(
        primary.width(),
        primary.height(),
        overlay.width(),
        overlay.height(),
    ) else {
        let e = RecorderError::OverlayFailure(format!(
            "{} overlay does not fit a {} frame",
            overlay.size(),
            primary.size()
        ));
        return Err((primary, e));
    };

    let scaled = imageops::resize(overlay.image(), place.width, place.height, FilterType::Triangle);
    imageops::replace(
        primary.image_mut(),
        &scaled,
        i64::from(place.x),
        i64::from(place.y),
    );
    Ok(primary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::frame::FrameSize;

    fn gradient(width: u32, height: u32) -> Frame {
        let mut img = image::RgbImage::new(width, height);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = image::Rgb([(x % 251) as u8, (y % 241) as u8, ((x + y) % 239) as u8]);
        }
        Frame::from_image(img)
    }

    #[test]
    fn test_no_overlay_is_identity() {
        for (w, h) in [(1, 1), (17, 9), (640, 480)] {
            let primary = gradient(w, h);
            let out = compose(primary.clone(), None);
            assert_eq!(out.as_bytes(), primary.as_bytes());
        }
    }

    #[test]
    fn test_overlay_keeps_primary_dimensions() {
        let overlay = Frame::filled(FrameSize::new(640, 480), [255, 0, 0]);
        for (w, h) in [(1, 1), (30, 30), (120, 40), (640, 480), (1921, 1081)] {
            let out = compose(gradient(w, h), Some(&overlay));
            assert_eq!(out.size(), FrameSize::new(w, h));
        }
    }

    #[test]
    fn test_overlay_bottom_right_placement() {
        let place = placement(1000, 800, 640, 480).unwrap();
        assert_eq!(place.width, 200);
        assert_eq!(place.height, 150);
        assert_eq!(place.x, 1000 - 200 - OVERLAY_PADDING);
        assert_eq!(place.y, 800 - 150 - OVERLAY_PADDING);

        let overlay = Frame::filled(FrameSize::new(640, 480), [0, 255, 0]);
        let out = compose(Frame::filled(FrameSize::new(1000, 800), [0, 0, 0]), Some(&overlay));
        assert_eq!(out.image().get_pixel(place.x + 10, place.y + 10).0, [0, 255, 0]);
        assert_eq!(out.image().get_pixel(place.x - 1, place.y - 1).0, [0, 0, 0]);
        assert_eq!(out.image().get_pixel(999, 799).0, [0, 0, 0]);
    }

    #[test]
    fn test_small_primary_skips_overlay() {
        assert!(placement(60, 20, 640, 480).is_none());
        assert!(placement(4, 400, 640, 480).is_none());

        let primary = gradient(60, 20);
        let overlay = Frame::filled(FrameSize::new(640, 480), [9, 9, 9]);
        let out = compose(primary.clone(), Some(&overlay));
        assert_eq!(out.as_bytes(), primary.as_bytes());
    }
}
