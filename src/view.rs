use std::sync::Arc;

use anyhow::Result;
use crossbeam_channel::{Receiver, bounded, tick};

use crate::{
    config::AppConfig,
    pipeline::{
        camera::{CameraBackend, CameraController, FrameSinks},
        detector::{ModelHandle, ModelProvider, ModelStatus},
        overlay::{Canvas, OverlayFrame},
        scheduler::{DetectionLoop, SchedulerConfig},
    },
    types::{FacingMode, Frame},
};

/// What changed since the previous [`ViewController::poll`].
#[derive(Default)]
pub struct ViewUpdate {
    pub video: Option<Frame>,
    pub overlay: Option<OverlayFrame>,
    pub status_changed: bool,
}

impl ViewUpdate {
    pub fn is_empty(&self) -> bool {
        self.video.is_none() && self.overlay.is_none() && !self.status_changed
    }
}

/// Wires model loading, the camera and the detection loop for one window.
pub struct ViewController {
    facing: FacingMode,
    camera: CameraController,
    camera_error: Option<String>,
    model: ModelProvider,
    model_status: ModelStatus,
    detection: DetectionLoop,
    video_rx: Receiver<Frame>,
    // Shares the detection loop's queue so frames of a closed camera can be
    // dropped.
    detect_frame_rx: Receiver<Frame>,
    overlay_rx: Receiver<OverlayFrame>,
}

impl ViewController {
    pub fn mount<F>(config: &AppConfig, backend: Arc<dyn CameraBackend>, load_model: F) -> Self
    where
        F: FnOnce() -> Result<ModelHandle> + Send + 'static,
    {
        let (video_tx, video_rx) = bounded(1);
        let (detect_frame_tx, detect_frame_rx) = bounded(1);
        let (overlay_tx, overlay_rx) = bounded(1);
        let (model_tx, model_rx) = bounded(1);

        let detection = DetectionLoop::spawn(
            SchedulerConfig::from(config),
            model_rx,
            detect_frame_rx.clone(),
            Canvas::with_presenter(overlay_tx),
            tick(config.tick_interval()),
        );
        let model = ModelProvider::load(load_model, model_tx);

        let mut camera = CameraController::new(
            backend,
            FrameSinks {
                display: video_tx,
                detection: detect_frame_tx,
            },
        );
        let facing = config.initial_facing;
        let camera_error = camera.start(facing).err().map(|err| {
            log::error!("failed to start camera: {err}");
            err.to_string()
        });

        Self {
            facing,
            camera,
            camera_error,
            model,
            model_status: ModelStatus::Loading,
            detection,
            video_rx,
            detect_frame_rx,
            overlay_rx,
        }
    }

    /// Switches between the front and back camera. The old stream is fully
    /// released before the new one opens.
    pub fn toggle_facing(&mut self) {
        self.facing = self.facing.toggled();
        let switched = self.camera.switch(self.facing);
        // The old capture thread is joined by now; anything it queued is stale.
        self.video_rx.try_iter().for_each(drop);
        self.detect_frame_rx.try_iter().for_each(drop);

        self.camera_error = match switched {
            Ok(()) => None,
            Err(err) => {
                log::error!("failed to switch camera: {err}");
                Some(err.to_string())
            }
        };
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn is_loading(&self) -> bool {
        self.model.is_loading()
    }

    pub fn model_status(&self) -> &ModelStatus {
        &self.model_status
    }

    pub fn camera_error(&self) -> Option<&str> {
        self.camera_error.as_deref()
    }

    pub fn video_bound(&self) -> bool {
        self.camera.active_mode().is_some()
    }

    pub fn poll(&mut self) -> ViewUpdate {
        let mut update = ViewUpdate {
            video: self.video_rx.try_iter().last(),
            overlay: self.overlay_rx.try_iter().last(),
            status_changed: false,
        };
        if let Some(status) = self.model.poll_status() {
            update.status_changed = status != self.model_status;
            self.model_status = status;
        }
        update
    }
}

impl Drop for ViewController {
    fn drop(&mut self) {
        // No overlay may be painted for a camera that is already gone.
        self.detection.cancel();
        self.camera.stop();
        self.detection.join();
    }
}
