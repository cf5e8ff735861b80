//! Fakes shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender};

use crate::{
    pipeline::{
        camera::{CameraBackend, CameraError, CaptureDevice},
        detector::Detector,
        overlay::{CanvasRect, Surface},
    },
    types::{BoundingBox, BoxSpace, Detection, FacingMode, Frame},
};

pub fn detection(class_id: &str, score: f32, bbox: (f32, f32, f32, f32)) -> Detection {
    Detection {
        class_id: class_id.to_string(),
        score,
        bbox: BoundingBox {
            x: bbox.0,
            y: bbox.1,
            width: bbox.2,
            height: bbox.3,
        },
    }
}

pub fn frame(width: u32, height: u32) -> Frame {
    Frame {
        rgba: vec![0; width as usize * height as usize * 4],
        width,
        height,
        timestamp: Instant::now(),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceCall {
    Resize(u32, u32),
    StrokeRect(CanvasRect),
    FillText(String, f32, f32),
    Present,
}

/// Surface that records every call; clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingSurface {
    calls: Arc<Mutex<Vec<SurfaceCall>>>,
}

impl RecordingSurface {
    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn presents(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == SurfaceCall::Present)
            .count()
    }

    fn push(&self, call: SurfaceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Surface for RecordingSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.push(SurfaceCall::Resize(width, height));
    }

    fn stroke_rect(&mut self, rect: CanvasRect) {
        self.push(SurfaceCall::StrokeRect(rect));
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32) {
        self.push(SurfaceCall::FillText(text.to_string(), x, y));
    }

    fn present(&mut self) {
        self.push(SurfaceCall::Present);
    }
}

/// Detector that replays queued results (then returns no detections) and
/// counts its calls.
pub struct ScriptedDetector {
    script: VecDeque<Result<Vec<Detection>>>,
    calls: Arc<AtomicUsize>,
    gate: Option<(Sender<()>, Receiver<()>)>,
    box_space: BoxSpace,
}

impl ScriptedDetector {
    pub fn empty() -> Self {
        Self {
            script: VecDeque::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            gate: None,
            box_space: BoxSpace::Normalized,
        }
    }

    pub fn with_script(script: Vec<Result<Vec<Detection>>>) -> Self {
        Self {
            script: script.into(),
            ..Self::empty()
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Every detect call first reports on `entered` and then blocks until
    /// `release` yields a message.
    pub fn gated(mut self, entered: Sender<()>, release: Receiver<()>) -> Self {
        self.gate = Some((entered, release));
        self
    }

    pub fn in_pixels(mut self) -> Self {
        self.box_space = BoxSpace::Pixel;
        self
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((entered, release)) = &self.gate {
            let _ = entered.send(());
            release
                .recv()
                .map_err(|_| anyhow!("detector gate closed"))?;
        }
        self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn backend_label(&self) -> &'static str {
        "scripted"
    }

    fn box_space(&self) -> BoxSpace {
        self.box_space
    }
}

/// Camera backend that hands out synthetic devices and tracks how many are
/// open at once. Environment cameras yield 8x6 frames, user cameras 6x8.
#[derive(Clone, Default)]
pub struct FakeCameraBackend {
    open: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    opened_modes: Arc<Mutex<Vec<FacingMode>>>,
    fail_with: Arc<Mutex<Option<CameraError>>>,
}

impl FakeCameraBackend {
    pub fn open_devices(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn peak_devices(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> usize {
        self.opened_modes().len()
    }

    pub fn opened_modes(&self) -> Vec<FacingMode> {
        self.opened_modes.lock().unwrap().clone()
    }

    pub fn fail_next(&self, err: CameraError) {
        *self.fail_with.lock().unwrap() = Some(err);
    }

    /// Waits until exactly `expected` devices are open.
    pub fn wait_for_open(&self, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if self.open_devices() == expected {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }
}

impl CameraBackend for FakeCameraBackend {
    fn open(&self, mode: FacingMode) -> Result<Box<dyn CaptureDevice>, CameraError> {
        if let Some(err) = self.fail_with.lock().unwrap().take() {
            return Err(err);
        }
        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_open, Ordering::SeqCst);
        self.opened_modes.lock().unwrap().push(mode);
        let (width, height) = match mode {
            FacingMode::Environment => (8, 6),
            FacingMode::User => (6, 8),
        };
        Ok(Box::new(FakeDevice {
            open: self.open.clone(),
            width,
            height,
        }))
    }
}

struct FakeDevice {
    open: Arc<AtomicUsize>,
    width: u32,
    height: u32,
}

impl CaptureDevice for FakeDevice {
    fn next_frame(&mut self) -> Result<Frame> {
        thread::sleep(Duration::from_millis(2));
        Ok(frame(self.width, self.height))
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}
