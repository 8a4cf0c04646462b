use crate::types::Frame;
use anyhow::{anyhow, Context, Result};
use colored::*;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraIndex, RequestedFormat, RequestedFormatType},
    Camera,
};

/// Seam between the session loop and the physical device, so the state
/// machine can run against a fake source in tests.
pub trait FrameSource {
    fn grab(&mut self) -> Result<Frame>;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn name(&self) -> String;
}

pub struct CameraSource {
    camera: Camera,
}

impl CameraSource {
    pub fn new(index: u32) -> Result<Self> {
        let cam_index = CameraIndex::Index(index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera =
            Camera::new(cam_index, requested).context("Failed to create camera instance")?;

        camera
            .open_stream()
            .map_err(|e| anyhow!(e))
            .context("Failed to open camera stream")?;

        println!(
            "{}",
            format!("Opened camera: {}", camera.info().human_name()).green()
        );
        println!("Format: {}", camera.camera_format());

        Ok(Self { camera })
    }
}

impl FrameSource for CameraSource {
    fn grab(&mut self) -> Result<Frame> {
        let frame = self
            .camera
            .frame()
            .map_err(|e| anyhow!(e))
            .context("Failed to get frame")?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| anyhow!(e))
            .context("Failed to decode frame")?;
        Ok(decoded)
    }

    fn width(&self) -> u32 {
        self.camera.resolution().width()
    }

    fn height(&self) -> u32 {
        self.camera.resolution().height()
    }

    fn name(&self) -> String {
        self.camera.info().human_name()
    }
}

/// Result of a one-shot availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraProbe {
    Available,
    Busy,
    NotAccessible,
}

impl CameraProbe {
    pub fn message(&self) -> &'static str {
        match self {
            CameraProbe::Available => "Webcam is available and working.",
            CameraProbe::Busy => "Webcam is already in use or busy.",
            CameraProbe::NotAccessible => "Webcam is not accessible.",
        }
    }
}

/// Open the device, pull a single frame, and release it again. The handle
/// is fully dropped before this returns, so a session spawned right after
/// can acquire the camera without contention.
pub fn probe(index: u32) -> CameraProbe {
    let requested =
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
    match Camera::new(CameraIndex::Index(index), requested) {
        Ok(mut camera) => {
            if camera.open_stream().is_err() {
                return CameraProbe::Busy;
            }
            let status = if camera.frame().is_ok() {
                CameraProbe::Available
            } else {
                CameraProbe::Busy
            };
            let _ = camera.stop_stream();
            status
        }
        Err(_) => CameraProbe::NotAccessible,
    }
}
