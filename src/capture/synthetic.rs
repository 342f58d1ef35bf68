use async_trait::async_trait;
use image::{DynamicImage, RgbImage};

use super::{encode_frame, CaptureError, EncodeOptions, Frame, FrameSource};

/// Placeholder frames for demo mode, used when no camera can be opened.
pub struct SyntheticSource {
    width: u32,
    height: u32,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        // 3:4 portrait, like the camera default.
        Self {
            width: 240,
            height: 320,
        }
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn capture(&self) -> Result<Frame, CaptureError> {
        let img = RgbImage::from_fn(self.width, self.height, |x, y| {
            let shade = ((x + y) % 64) as u8 + 96;
            image::Rgb([shade, shade, shade])
        });
        let opts = EncodeOptions {
            mirror: false,
            ..EncodeOptions::default()
        };
        encode_frame(DynamicImage::ImageRgb8(img), &opts)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
