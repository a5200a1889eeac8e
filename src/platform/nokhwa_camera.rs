//! Camera backend on top of nokhwa.

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

use crate::recording::error::RecorderError;
use crate::recording::frame::{PixelFormat, RawImage};

use super::{CameraBackend, CameraDevice};

fn unavailable(reason: impl ToString) -> RecorderError {
    RecorderError::DeviceUnavailable {
        device: "webcam",
        reason: reason.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct NokhwaCamera;

impl CameraBackend for NokhwaCamera {
    fn open_device(&self, id: u32) -> Result<Box<dyn CameraDevice>, RecorderError> {
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(CameraIndex::Index(id), requested).map_err(unavailable)?;
        camera.open_stream().map_err(unavailable)?;
        tracing::info!(
            "Webcam {} opened: {} @ {}",
            id,
            camera.info().human_name(),
            camera.camera_format()
        );
        Ok(Box::new(NokhwaDevice { camera }))
    }

    fn list_devices(&self) -> Result<Vec<(u32, String)>, RecorderError> {
        let cameras = nokhwa::query(ApiBackend::Auto).map_err(unavailable)?;
        Ok(cameras
            .iter()
            .filter_map(|info| match info.index() {
                CameraIndex::Index(i) => Some((*i, info.human_name())),
                CameraIndex::String(_) => None,
            })
            .collect())
    }
}

struct NokhwaDevice {
    camera: Camera,
}

impl CameraDevice for NokhwaDevice {
    fn read_frame(&mut self) -> Result<RawImage, RecorderError> {
        let buffer = self.camera.frame().map_err(unavailable)?;
        let decoded = buffer.decode_image::<RgbFormat>().map_err(unavailable)?;
        let (width, height) = decoded.dimensions();
        Ok(RawImage {
            width,
            height,
            format: PixelFormat::Rgb8,
            data: decoded.into_raw(),
        })
    }
}

impl Drop for NokhwaDevice {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::debug!("Failed to stop webcam stream: {}", e);
        }
    }
}
