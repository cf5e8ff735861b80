#[cfg(feature = "camera-nokhwa")]
mod native;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Sender, bounded};
use thiserror::Error;

use crate::types::{FacingMode, Frame};

const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("no camera available for facing mode `{0}`")]
    NoMatchingDevice(FacingMode),
    #[error("camera backend error: {0}")]
    Backend(String),
}

/// Opens capture devices. Implementations must be shareable with the capture
/// thread.
pub trait CameraBackend: Send + Sync + 'static {
    fn open(&self, mode: FacingMode) -> Result<Box<dyn CaptureDevice>, CameraError>;
}

/// Backend used by the application window.
pub fn default_backend() -> Arc<dyn CameraBackend> {
    #[cfg(feature = "camera-nokhwa")]
    {
        Arc::new(native::NokhwaBackend)
    }
    #[cfg(not(feature = "camera-nokhwa"))]
    {
        Arc::new(NoCameraBackend)
    }
}

#[cfg(not(feature = "camera-nokhwa"))]
struct NoCameraBackend;

#[cfg(not(feature = "camera-nokhwa"))]
impl CameraBackend for NoCameraBackend {
    fn open(&self, _mode: FacingMode) -> Result<Box<dyn CaptureDevice>, CameraError> {
        Err(CameraError::Backend("built without camera support".into()))
    }
}

/// An opened camera. Dropping it releases the device.
pub trait CaptureDevice {
    fn next_frame(&mut self) -> anyhow::Result<Frame>;
}

/// Where captured frames go: the on-screen video and the detection loop.
#[derive(Clone)]
pub struct FrameSinks {
    pub display: Sender<Frame>,
    pub detection: Sender<Frame>,
}

impl FrameSinks {
    fn publish(&self, frame: Frame) {
        // Drop if a consumer is busy, otherwise forward every frame.
        let _ = self.display.try_send(frame.clone());
        let _ = self.detection.try_send(frame);
    }
}

#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    /// Blocks until the capture thread has released the device.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Opens the device on the capture thread and returns once it is open, or
/// with the error that kept it from opening.
fn start_camera_stream(
    backend: Arc<dyn CameraBackend>,
    mode: FacingMode,
    sinks: FrameSinks,
) -> Result<CameraStream, CameraError> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let (opened_tx, opened_rx) = bounded::<Result<(), CameraError>>(1);

    let handle = thread::spawn(move || {
        // Devices are opened on the thread that reads them; some platform
        // handles are not Send.
        let mut device = match backend.open(mode) {
            Ok(device) => {
                let _ = opened_tx.send(Ok(()));
                device
            }
            Err(err) => {
                let _ = opened_tx.send(Err(err));
                return;
            }
        };

        while !stop_flag.load(Ordering::Relaxed) {
            match device.next_frame() {
                Ok(frame) if frame.has_dimensions() => sinks.publish(frame),
                Ok(_) => continue,
                Err(err) => {
                    log::warn!("camera frame read failed: {err:?}");
                    thread::sleep(READ_RETRY_DELAY);
                }
            }
        }
    });

    let stream = CameraStream {
        stop,
        handle: Some(handle),
    };
    match opened_rx.recv() {
        Ok(Ok(())) => Ok(stream),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(CameraError::Backend(
            "capture thread exited before opening the camera".into(),
        )),
    }
}

struct CameraSession {
    mode: FacingMode,
    stream: CameraStream,
}

/// Owns the single camera session and binds it to the frame sinks.
pub struct CameraController {
    backend: Arc<dyn CameraBackend>,
    sinks: FrameSinks,
    session: Option<CameraSession>,
}

impl CameraController {
    pub fn new(backend: Arc<dyn CameraBackend>, sinks: FrameSinks) -> Self {
        Self {
            backend,
            sinks,
            session: None,
        }
    }

    pub fn start(&mut self, mode: FacingMode) -> Result<(), CameraError> {
        // Never hold two devices at once.
        self.stop();

        let stream = start_camera_stream(self.backend.clone(), mode, self.sinks.clone())?;
        self.session = Some(CameraSession { mode, stream });
        log::info!("camera started ({mode})");
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.stream.stop();
            log::info!("camera stopped ({})", session.mode);
        }
    }

    pub fn switch(&mut self, mode: FacingMode) -> Result<(), CameraError> {
        self.stop();
        self.start(mode)
    }

    pub fn active_mode(&self) -> Option<FacingMode> {
        self.session.as_ref().map(|session| session.mode)
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        self.stop();
    }
}
