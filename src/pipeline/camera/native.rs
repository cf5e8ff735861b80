use std::time::Instant;

use anyhow::{Result, anyhow};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraIndex, CameraInfo, FrameFormat, RequestedFormat, RequestedFormatType,
    },
};
use rayon::prelude::*;

use super::{CameraBackend, CameraError, CaptureDevice};
use crate::types::{FacingMode, Frame};

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::MJPEG,
    FrameFormat::NV12,
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
];

const USER_HINTS: &[&str] = &["front", "user", "facetime", "integrated"];
const ENVIRONMENT_HINTS: &[&str] = &["back", "rear", "environment", "world"];

fn requested_formats() -> [RequestedFormat<'static>; 4] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        // Fall back to any format Nokhwa can decode, but prefer higher FPS to
        // avoid very low default rates (e.g. 15 FPS) that some drivers reject.
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: format_camera_label(&info),
        })
        .collect())
}

fn format_camera_label(info: &CameraInfo) -> String {
    let name = info.human_name();
    let desc = info.description().trim();
    if desc.is_empty() || desc == "N/A" {
        name
    } else {
        format!("{name} ({desc})")
    }
}

/// Facing mode is a preference, not a hard constraint: a device whose name
/// mentions the mode wins, otherwise `user` takes the first device and
/// `environment` the last one.
fn select_device(devices: &[CameraDevice], mode: FacingMode) -> Option<&CameraDevice> {
    let hints = match mode {
        FacingMode::User => USER_HINTS,
        FacingMode::Environment => ENVIRONMENT_HINTS,
    };

    devices
        .iter()
        .find(|device| {
            let label = device.label.to_lowercase();
            hints.iter().any(|hint| label.contains(hint))
        })
        .or_else(|| match mode {
            FacingMode::User => devices.first(),
            FacingMode::Environment => devices.last(),
        })
}

fn build_camera(index: CameraIndex) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

fn classify_open_error(err: anyhow::Error) -> CameraError {
    let message = format!("{err:#}");
    let lowered = message.to_lowercase();
    if ["permission", "denied", "not authorized", "unauthorized"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        CameraError::PermissionDenied(message)
    } else {
        CameraError::Backend(message)
    }
}

pub struct NokhwaBackend;

impl CameraBackend for NokhwaBackend {
    fn open(&self, mode: FacingMode) -> Result<Box<dyn CaptureDevice>, CameraError> {
        let devices = available_cameras().map_err(classify_open_error)?;
        let device = select_device(&devices, mode).ok_or(CameraError::NoMatchingDevice(mode))?;
        log::debug!("opening {} for facing mode {mode}", device.label);

        let camera = build_camera(device.index.clone()).map_err(classify_open_error)?;
        Ok(Box::new(NokhwaCapture { camera }))
    }
}

struct NokhwaCapture {
    camera: Camera,
}

impl CaptureDevice for NokhwaCapture {
    fn next_frame(&mut self) -> Result<Frame> {
        let frame = self.camera.frame()?;
        let decoded = frame.decode_image::<RgbFormat>()?;

        let (width, height) = decoded.dimensions();
        let rgb = decoded.into_raw();

        // Expand RGB to RGBA for the UI pipeline.
        let pixel_count = rgb.len() / 3;
        let mut rgba = vec![0u8; pixel_count * 4];
        rgba.par_chunks_mut(4)
            .zip(rgb.par_chunks_exact(3))
            .for_each(|(dst, src)| {
                dst[0] = src[0];
                dst[1] = src[1];
                dst[2] = src[2];
                dst[3] = 255;
            });

        Ok(Frame {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        })
    }
}

impl Drop for NokhwaCapture {
    fn drop(&mut self) {
        if let Err(err) = self.camera.stop_stream() {
            log::warn!("failed to stop camera stream: {err:?}");
        }
    }
}
