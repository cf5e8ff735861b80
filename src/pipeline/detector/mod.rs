mod ort;

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::{
    config::AppConfig,
    model_download::ensure_detector_model_ready,
    types::{BoxSpace, Detection, Frame},
};

pub use self::ort::{OrtSsdDetector, SsdParams};

pub trait Detector: Send + 'static {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    fn backend_label(&self) -> &'static str;

    /// Coordinate space of the boxes returned by `detect`.
    fn box_space(&self) -> BoxSpace;
}

/// The loaded detector. Detection needs `&mut self`, so whoever owns the
/// handle is the only caller.
pub struct ModelHandle {
    detector: Box<dyn Detector>,
}

impl ModelHandle {
    pub fn new(detector: impl Detector) -> Self {
        Self {
            detector: Box::new(detector),
        }
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.detector.detect(frame)
    }

    pub fn backend_label(&self) -> &'static str {
        self.detector.backend_label()
    }

    pub fn box_space(&self) -> BoxSpace {
        self.detector.box_space()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelStatus {
    Loading,
    Ready { backend: &'static str },
    Failed(String),
}

/// Clears the loading flag however the loader thread exits.
struct LoadingGuard(Arc<AtomicBool>);

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ModelProvider {
    loading: Arc<AtomicBool>,
    status_rx: Receiver<ModelStatus>,
    #[allow(dead_code)]
    worker: Option<thread::JoinHandle<()>>,
}

impl ModelProvider {
    /// Starts the one load of this provider's lifetime on a worker thread. The
    /// ready handle goes to `handle_tx`; progress goes to the status channel.
    pub fn load<F>(factory: F, handle_tx: Sender<ModelHandle>) -> Self
    where
        F: FnOnce() -> Result<ModelHandle> + Send + 'static,
    {
        let loading = Arc::new(AtomicBool::new(true));
        let (status_tx, status_rx) = unbounded();
        let _ = status_tx.send(ModelStatus::Loading);

        let guard = LoadingGuard(loading.clone());
        let worker = thread::spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(factory))
                .unwrap_or_else(|payload| {
                    Err(anyhow!("model loader panicked: {}", panic_message(&*payload)))
                });
            drop(guard);

            match outcome {
                Ok(handle) => {
                    let backend = handle.backend_label();
                    log::info!("detector ready ({backend})");
                    let _ = status_tx.send(ModelStatus::Ready { backend });
                    if handle_tx.send(handle).is_err() {
                        log::warn!("detection loop stopped before the model was ready");
                    }
                }
                Err(err) => {
                    log::error!("failed to load detector: {err:?}");
                    let _ = status_tx.send(ModelStatus::Failed(format!("{err:#}")));
                }
            }
        });

        Self {
            loading,
            status_rx,
            worker: Some(worker),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Most recent status change since the last call, if any.
    pub fn poll_status(&self) -> Option<ModelStatus> {
        self.status_rx.try_iter().last()
    }

    #[cfg(test)]
    pub fn wait(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Loader used by the application: fetch the model if needed, then build the
/// ONNX Runtime session.
pub fn ort_model_factory(config: &AppConfig) -> Box<dyn FnOnce() -> Result<ModelHandle> + Send> {
    let model_path: PathBuf = config.model_path.clone();
    let params = SsdParams {
        min_score: config.min_score,
        max_detections: config.max_detections,
        input_width: config.input_width,
    };

    Box::new(move || {
        ensure_detector_model_ready(&model_path, |event| log::debug!("model download: {event:?}"))?;
        let detector = OrtSsdDetector::new(&model_path, params)?;
        log::info!("SSD ORT backend ready using {}", model_path.display());
        Ok(ModelHandle::new(detector))
    })
}
