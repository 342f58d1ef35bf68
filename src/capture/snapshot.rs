// snapshot.rs — Reads the latest still that an external camera tool keeps
// overwriting (e.g. `ffmpeg -f v4l2 -i /dev/video0 -update 1 frame.jpg`).

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

use super::{encode_frame, CaptureError, EncodeOptions, Frame, FrameSource};

pub struct SnapshotSource {
    path: PathBuf,
    options: EncodeOptions,
}

impl SnapshotSource {
    pub fn new(path: impl Into<PathBuf>, options: EncodeOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }
}

#[async_trait]
impl FrameSource for SnapshotSource {
    async fn capture(&self) -> Result<Frame, CaptureError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return Err(CaptureError::PermissionDenied(format!(
                    "{}: {e}",
                    self.path.display()
                )));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CaptureError::NotFound(format!(
                    "{}: {e}",
                    self.path.display()
                )));
            }
            Err(e) => {
                return Err(CaptureError::NotReady(format!(
                    "{}: {e}",
                    self.path.display()
                )));
            }
        };

        if bytes.is_empty() {
            return Err(CaptureError::NotReady(format!(
                "{} is empty",
                self.path.display()
            )));
        }

        // A half-written file decodes as garbage; treat it as "not ready".
        let img = image::load_from_memory(&bytes)
            .map_err(|e| CaptureError::NotReady(format!("decode {}: {e}", self.path.display())))?;

        encode_frame(img, &self.options)
    }

    fn name(&self) -> &str {
        "snapshot"
    }
}
