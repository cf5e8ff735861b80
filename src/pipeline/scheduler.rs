use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use crossbeam_channel::{Receiver, Sender, bounded, select};

use crate::{
    config::AppConfig,
    pipeline::{
        detector::ModelHandle,
        overlay::{OverlayRenderer, Surface},
    },
    types::{BoxSpace, Frame},
};

#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    pub cadence: u32,
}

impl From<&AppConfig> for SchedulerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            cadence: config.cadence,
        }
    }
}

/// Cancellation token of the detection loop. Cancelling is synchronous and
/// cannot be undone.
#[derive(Clone, Debug)]
pub struct LoopToken {
    active: Arc<AtomicBool>,
}

impl LoopToken {
    fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// No model yet.
    Idle,
    /// Not an inference tick; the last overlay stays up.
    Skipped,
    /// Inference tick, but no frame with known size has arrived yet.
    NoFrame,
    Rendered(usize),
    InferenceFailed,
    /// The loop was cancelled while detection ran; result dropped.
    Discarded,
    Stopped,
}

pub struct DetectionScheduler<S: Surface> {
    state: LoopState,
    cadence: u32,
    frame_counter: u64,
    token: LoopToken,
    model: Option<ModelHandle>,
    current_frame: Option<Frame>,
    renderer: OverlayRenderer,
    surface: S,
}

impl<S: Surface> DetectionScheduler<S> {
    pub fn new(config: SchedulerConfig, surface: S, token: LoopToken) -> Self {
        Self {
            state: LoopState::Idle,
            cadence: config.cadence.max(1),
            frame_counter: 0,
            token,
            model: None,
            current_frame: None,
            renderer: OverlayRenderer::new(BoxSpace::Normalized),
            surface,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn attach_model(&mut self, model: ModelHandle) {
        if self.state != LoopState::Idle {
            log::warn!("ignoring model for a {:?} detection loop", self.state);
            return;
        }
        log::info!(
            "detection loop running ({}, every {} ticks, {:?} boxes)",
            model.backend_label(),
            self.cadence,
            model.box_space()
        );
        self.renderer = OverlayRenderer::new(model.box_space());
        self.model = Some(model);
        self.state = LoopState::Running;
    }

    pub fn on_tick(&mut self, frame_rx: &Receiver<Frame>) -> TickOutcome {
        if !self.token.is_active() {
            self.stop();
        }
        match self.state {
            LoopState::Idle => return TickOutcome::Idle,
            LoopState::Stopped => return TickOutcome::Stopped,
            LoopState::Running => {}
        }

        while let Ok(newer) = frame_rx.try_recv() {
            self.current_frame = Some(newer);
        }

        self.frame_counter += 1;
        if self.frame_counter % self.cadence as u64 != 0 {
            return TickOutcome::Skipped;
        }

        let Some(frame) = self.current_frame.as_ref().filter(|f| f.has_dimensions()) else {
            return TickOutcome::NoFrame;
        };
        let Some(model) = self.model.as_mut() else {
            return TickOutcome::Idle;
        };

        let detections = match model.detect(frame) {
            Ok(detections) => detections,
            Err(err) => {
                log::warn!("object detection failed: {err:?}");
                return TickOutcome::InferenceFailed;
            }
        };

        if !self.token.is_active() {
            self.stop();
            return TickOutcome::Discarded;
        }

        self.renderer
            .render(&detections, frame.width, frame.height, &mut self.surface);
        self.surface.present();
        TickOutcome::Rendered(detections.len())
    }

    pub fn stop(&mut self) {
        if self.state != LoopState::Stopped {
            self.token.cancel();
            self.state = LoopState::Stopped;
            self.model = None;
            log::info!("detection loop stopped");
        }
    }
}

/// Handle to the detection loop thread.
pub struct DetectionLoop {
    token: LoopToken,
    // Dropping the sender wakes the thread even while it waits for the model.
    stop_tx: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl DetectionLoop {
    /// Spawns the loop in the idle state. It starts running when a model
    /// arrives on `model_rx` and then handles one refresh tick at a time.
    pub fn spawn<S>(
        config: SchedulerConfig,
        model_rx: Receiver<ModelHandle>,
        frame_rx: Receiver<Frame>,
        surface: S,
        ticks: Receiver<Instant>,
    ) -> Self
    where
        S: Surface + Send + 'static,
    {
        let token = LoopToken::new();
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let loop_token = token.clone();

        let handle = thread::spawn(move || {
            let mut scheduler = DetectionScheduler::new(config, surface, loop_token);

            let model = select! {
                recv(model_rx) -> model => match model {
                    Ok(model) => model,
                    Err(_) => {
                        log::warn!("no model available; detection loop stays idle");
                        let _ = stop_rx.recv();
                        return;
                    }
                },
                recv(stop_rx) -> _ => return,
            };
            scheduler.attach_model(model);

            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticks) -> tick => {
                        if tick.is_err() {
                            break;
                        }
                        if scheduler.on_tick(&frame_rx) == TickOutcome::Stopped {
                            break;
                        }
                    }
                }
            }
            scheduler.stop();
        });

        Self {
            token,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn is_active(&self) -> bool {
        self.token.is_active()
    }

    /// Invalidates the loop without waiting: no inference starts and no
    /// overlay is painted after this returns.
    pub fn cancel(&mut self) {
        self.token.cancel();
        self.stop_tx.take();
    }

    /// Waits for the loop thread, including any detection call that was in
    /// flight. Only returns once the loop was cancelled.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    #[cfg(test)]
    pub fn stop(mut self) {
        self.cancel();
        self.join();
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::AtomicUsize, time::Duration};

    use anyhow::anyhow;
    use crossbeam_channel::unbounded;

    use super::*;
    use crate::{
        pipeline::overlay::CanvasRect,
        test_support::{RecordingSurface, ScriptedDetector, SurfaceCall, detection, frame},
    };

    fn scheduler(
        cadence: u32,
        detector: ScriptedDetector,
    ) -> (DetectionScheduler<RecordingSurface>, RecordingSurface) {
        let surface = RecordingSurface::default();
        let mut scheduler = DetectionScheduler::new(
            SchedulerConfig { cadence },
            surface.clone(),
            LoopToken::new(),
        );
        scheduler.attach_model(ModelHandle::new(detector));
        (scheduler, surface)
    }

    fn calls(counter: &Arc<AtomicUsize>) -> usize {
        counter.load(Ordering::SeqCst)
    }

    #[test]
    fn inference_runs_only_on_cadence_ticks() {
        for cadence in 1..=4u32 {
            let detector = ScriptedDetector::empty();
            let counter = detector.call_counter();
            let (mut scheduler, _surface) = scheduler(cadence, detector);
            let (frame_tx, frame_rx) = unbounded();
            frame_tx.send(frame(8, 6)).unwrap();

            for tick in 1..=12u32 {
                let before = calls(&counter);
                let outcome = scheduler.on_tick(&frame_rx);
                let ran = calls(&counter) - before;
                if tick % cadence == 0 {
                    assert_eq!(ran, 1, "cadence {cadence}, tick {tick}");
                    assert_eq!(outcome, TickOutcome::Rendered(0));
                } else {
                    assert_eq!(ran, 0, "cadence {cadence}, tick {tick}");
                    assert_eq!(outcome, TickOutcome::Skipped);
                }
            }
            assert_eq!(calls(&counter), (12 / cadence) as usize);
        }
    }

    #[test]
    fn overlay_uses_the_box_space_of_the_model() {
        let detector = ScriptedDetector::with_script(vec![Ok(vec![detection(
            "cat",
            0.7,
            (40.0, 30.0, 100.0, 50.0),
        )])])
        .in_pixels();
        let (mut scheduler, surface) = scheduler(1, detector);
        let (frame_tx, frame_rx) = unbounded();
        frame_tx.send(frame(800, 600)).unwrap();

        assert_eq!(scheduler.on_tick(&frame_rx), TickOutcome::Rendered(1));
        assert_eq!(
            surface.calls()[1],
            SurfaceCall::StrokeRect(CanvasRect {
                left: 40.0,
                top: 30.0,
                right: 140.0,
                bottom: 80.0,
            })
        );
    }

    #[test]
    fn idle_until_model_attached() {
        let surface = RecordingSurface::default();
        let mut scheduler = DetectionScheduler::new(
            SchedulerConfig { cadence: 1 },
            surface.clone(),
            LoopToken::new(),
        );
        let (frame_tx, frame_rx) = unbounded();
        frame_tx.send(frame(8, 6)).unwrap();

        assert_eq!(scheduler.state(), LoopState::Idle);
        assert_eq!(scheduler.on_tick(&frame_rx), TickOutcome::Idle);
        assert!(surface.calls().is_empty());

        scheduler.attach_model(ModelHandle::new(ScriptedDetector::empty()));
        assert_eq!(scheduler.state(), LoopState::Running);
        assert_eq!(scheduler.on_tick(&frame_rx), TickOutcome::Rendered(0));
    }

    #[test]
    fn nothing_is_drawn_before_a_sized_frame_arrives() {
        let detector = ScriptedDetector::empty();
        let counter = detector.call_counter();
        let (mut scheduler, surface) = scheduler(1, detector);
        let (frame_tx, frame_rx) = unbounded();

        assert_eq!(scheduler.on_tick(&frame_rx), TickOutcome::NoFrame);
        frame_tx.send(frame(0, 0)).unwrap();
        assert_eq!(scheduler.on_tick(&frame_rx), TickOutcome::NoFrame);
        assert_eq!(calls(&counter), 0);
        assert!(surface.calls().is_empty());

        frame_tx.send(frame(8, 6)).unwrap();
        assert_eq!(scheduler.on_tick(&frame_rx), TickOutcome::Rendered(0));
    }

    #[test]
    fn latest_frame_is_used_for_inference() {
        let (mut scheduler, surface) = scheduler(1, ScriptedDetector::empty());
        let (frame_tx, frame_rx) = unbounded();
        frame_tx.send(frame(8, 6)).unwrap();
        frame_tx.send(frame(16, 12)).unwrap();

        scheduler.on_tick(&frame_rx);
        assert_eq!(
            surface.calls()[0],
            SurfaceCall::Resize(16, 12)
        );
    }

    #[test]
    fn inference_error_skips_render_and_loop_continues() {
        let detector = ScriptedDetector::with_script(vec![
            Err(anyhow!("backend hiccup")),
            Ok(vec![detection("dog", 0.9, (0.1, 0.1, 0.2, 0.2))]),
        ]);
        let (mut scheduler, surface) = scheduler(1, detector);
        let (frame_tx, frame_rx) = unbounded();
        frame_tx.send(frame(8, 6)).unwrap();

        assert_eq!(scheduler.on_tick(&frame_rx), TickOutcome::InferenceFailed);
        assert_eq!(surface.presents(), 0);
        assert_eq!(scheduler.on_tick(&frame_rx), TickOutcome::Rendered(1));
        assert_eq!(surface.presents(), 1);
        assert_eq!(scheduler.state(), LoopState::Running);
    }

    #[test]
    fn stopped_scheduler_never_detects_again() {
        let detector = ScriptedDetector::empty();
        let counter = detector.call_counter();
        let (mut scheduler, surface) = scheduler(1, detector);
        let (frame_tx, frame_rx) = unbounded();
        frame_tx.send(frame(8, 6)).unwrap();

        scheduler.stop();
        for _ in 0..5 {
            assert_eq!(scheduler.on_tick(&frame_rx), TickOutcome::Stopped);
        }
        assert_eq!(calls(&counter), 0);
        assert!(surface.calls().is_empty());
    }

    #[test]
    fn cancel_discards_in_flight_detection() {
        let (entered_tx, entered_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        let detector = ScriptedDetector::with_script(vec![Ok(vec![detection(
            "cat",
            0.7,
            (0.0, 0.0, 0.5, 0.5),
        )])])
        .gated(entered_tx, release_rx);
        let counter = detector.call_counter();

        let surface = RecordingSurface::default();
        let (model_tx, model_rx) = bounded(1);
        let (frame_tx, frame_rx) = unbounded();
        let (tick_tx, tick_rx) = unbounded();
        let mut detection_loop = DetectionLoop::spawn(
            SchedulerConfig { cadence: 1 },
            model_rx,
            frame_rx,
            surface.clone(),
            tick_rx,
        );

        model_tx.send(ModelHandle::new(detector)).unwrap();
        frame_tx.send(frame(8, 6)).unwrap();
        tick_tx.send(Instant::now()).unwrap();
        entered_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("detection started");

        detection_loop.cancel();
        assert!(!detection_loop.is_active());
        release_tx.send(()).unwrap();
        for _ in 0..3 {
            let _ = tick_tx.send(Instant::now());
        }
        detection_loop.stop();

        assert_eq!(calls(&counter), 1);
        assert!(surface.calls().is_empty());
    }

    #[test]
    fn loop_renders_on_ticks_once_model_arrives() {
        let detector =
            ScriptedDetector::with_script(vec![Ok(vec![detection("cat", 0.7, (0.0, 0.0, 0.5, 0.5))])]);
        let counter = detector.call_counter();
        let surface = RecordingSurface::default();
        let (model_tx, model_rx) = bounded(1);
        let (frame_tx, frame_rx) = unbounded();
        let (tick_tx, tick_rx) = bounded(0);
        let detection_loop = DetectionLoop::spawn(
            SchedulerConfig { cadence: 2 },
            model_rx,
            frame_rx,
            surface.clone(),
            tick_rx,
        );

        frame_tx.send(frame(8, 6)).unwrap();
        model_tx.send(ModelHandle::new(detector)).unwrap();
        // Rendezvous sends return once the loop has taken the tick, so the
        // fifth send guarantees the fourth tick was fully handled.
        for _ in 0..5 {
            tick_tx.send(Instant::now()).unwrap();
        }
        detection_loop.stop();

        assert_eq!(calls(&counter), 2);
        assert_eq!(surface.presents(), 2);
    }

    #[test]
    fn cancel_while_idle_ends_the_thread() {
        let (_model_tx, model_rx) = bounded::<ModelHandle>(1);
        let (_frame_tx, frame_rx) = unbounded();
        let (_tick_tx, tick_rx) = unbounded();
        let detection_loop = DetectionLoop::spawn(
            SchedulerConfig { cadence: 3 },
            model_rx,
            frame_rx,
            RecordingSurface::default(),
            tick_rx,
        );
        // Joins; would hang if the idle loop ignored cancellation.
        detection_loop.stop();
    }
}
