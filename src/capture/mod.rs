/// The `capture` module turns camera stills into JPEG data URLs for the
/// recognition endpoint.
pub mod snapshot;
pub mod synthetic;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, GenericImageView};
use serde::Serialize;

pub use snapshot::SnapshotSource;
pub use synthetic::SyntheticSource;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// No complete frame is available yet (camera not started, partial write).
    #[error("video stream not ready: {0}")]
    NotReady(String),
    /// The camera source exists but may not be read.
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    /// The configured camera source does not exist.
    #[error("camera not found: {0}")]
    NotFound(String),
    #[error("frame encode failed: {0}")]
    Encode(String),
}

impl CaptureError {
    /// The camera cannot be used at all (as opposed to a frame not being
    /// ready yet).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::PermissionDenied(_) | Self::NotFound(_))
    }
}

/// One captured still, ready to send.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    /// `data:image/jpeg;base64,...`
    pub data_url: String,
    /// Width of the (possibly downscaled) image
    pub width: u32,
    /// Height of the (possibly downscaled) image
    pub height: u32,
    /// Epoch milliseconds when the frame was grabbed
    pub captured_at: i64,
}

/// How stills are prepared before encoding.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// Images wider than this are downscaled.
    pub max_width: u32,
    /// JPEG compression quality (1–100).
    pub jpeg_quality: u8,
    /// Flip horizontally; the live preview is mirrored, recognition wants the
    /// signer's real orientation.
    pub mirror: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            max_width: 720,
            jpeg_quality: 70,
            mirror: true,
        }
    }
}

/// A place frames come from.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Grab the current still.
    async fn capture(&self) -> Result<Frame, CaptureError>;

    /// Check the source once at startup. `PermissionDenied` here switches the
    /// app to demo mode.
    async fn probe(&self) -> Result<(), CaptureError> {
        self.capture().await.map(|_| ())
    }

    fn name(&self) -> &str;
}

/// Mirror, downscale, JPEG-encode and base64-encode an image.
pub fn encode_frame(img: DynamicImage, opts: &EncodeOptions) -> Result<Frame, CaptureError> {
    let img = if opts.mirror { img.fliph() } else { img };

    let img = if img.width() > opts.max_width {
        let ratio = opts.max_width as f64 / img.width() as f64;
        let new_h = ((img.height() as f64 * ratio).round() as u32).max(1);
        img.resize_exact(opts.max_width, new_h, imageops::FilterType::Triangle)
    } else {
        img
    };

    let (w, h) = img.dimensions();

    let mut jpeg_buf: Vec<u8> = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg_buf, opts.jpeg_quality.clamp(1, 100))
        .encode(img.to_rgb8().as_raw(), w, h, image::ExtendedColorType::Rgb8)
        .map_err(|e| CaptureError::Encode(format!("jpeg encode: {e}")))?;

    Ok(Frame {
        data_url: format!("data:image/jpeg;base64,{}", BASE64.encode(&jpeg_buf)),
        width: w,
        height: h,
        captured_at: chrono::Utc::now().timestamp_millis(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    /// Helper: left half black, right half white.
    fn split_image(w: u32, h: u32) -> DynamicImage {
        let mut img = RgbaImage::new(w, h);
        for (x, _y, pixel) in img.enumerate_pixels_mut() {
            if x < w / 2 {
                *pixel = image::Rgba([0, 0, 0, 255]);
            } else {
                *pixel = image::Rgba([255, 255, 255, 255]);
            }
        }
        DynamicImage::ImageRgba8(img)
    }

    fn decode(frame: &Frame) -> DynamicImage {
        let b64 = frame
            .data_url
            .strip_prefix("data:image/jpeg;base64,")
            .expect("data url prefix");
        let bytes = BASE64.decode(b64).unwrap();
        image::load_from_memory(&bytes).unwrap()
    }

    #[test]
    fn wide_frames_are_downscaled() {
        let opts = EncodeOptions {
            max_width: 100,
            jpeg_quality: 70,
            mirror: false,
        };
        let frame = encode_frame(split_image(400, 200), &opts).unwrap();
        assert_eq!((frame.width, frame.height), (100, 50));
    }

    #[test]
    fn small_frames_keep_size() {
        let frame = encode_frame(split_image(64, 48), &EncodeOptions::default()).unwrap();
        assert_eq!((frame.width, frame.height), (64, 48));
        assert!(frame.data_url.starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn mirror_flips_horizontally() {
        let opts = EncodeOptions {
            mirror: true,
            ..EncodeOptions::default()
        };
        let frame = encode_frame(split_image(64, 64), &opts).unwrap();
        let img = decode(&frame).to_luma8();
        // Originally black on the left; after the flip the left edge is bright.
        assert!(img.get_pixel(2, 32).0[0] > 200);
        assert!(img.get_pixel(61, 32).0[0] < 50);
    }
}
