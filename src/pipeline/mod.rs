//! Camera capture, pose inference and overlay drawing around a
//! [`DetectionEngine`].
//!
//! Threads, each fed by a bounded channel that drops rather than blocks:
//! capture -> worker (inference + engine) -> compositor (overlay). The latest
//! [`SessionSnapshot`] is published through a shared slot, and the rendering
//! side writes back through a bounded command queue.

pub mod camera;
pub mod compositor;
#[cfg(feature = "backend-ort")]
pub mod movenet;
pub mod skeleton;

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::{
    assign::{AssignMode, Assignment, PlayerAssigner},
    engine::{DetectionEngine, EngineCommand, PlayerEvaluation},
    error::PipelineError,
    pose::JointFrame,
    types::{AnnotatedFrame, Frame, PlayerSlot, SessionSnapshot},
};

use self::{
    camera::{CameraOpener, start_capture},
    compositor::{OverlaySettings, start_frame_compositor},
};

pub const COMMAND_QUEUE_CAPACITY: usize = 64;
/// Longest the worker waits for a frame before refreshing the snapshot anyway.
const IDLE_TICK: Duration = Duration::from_millis(100);

/// External pose estimator. `Ok(None)` means nobody was found.
pub trait PoseEngine: Send + 'static {
    fn infer(&mut self, frame: &Frame) -> anyhow::Result<Option<JointFrame>>;
}

/// Result of one tick, before the overlay is drawn.
#[derive(Clone, Debug)]
pub struct ProcessedFrame {
    pub frame: Frame,
    pub evaluations: Vec<PlayerEvaluation>,
    pub snapshot: SessionSnapshot,
    pub mode: AssignMode,
}

/// Single-threaded tick: infer, assign, update the engine.
pub struct FrameProcessor<E> {
    pose: E,
    engine: DetectionEngine,
    assigner: PlayerAssigner,
    mode: AssignMode,
    session_start: Instant,
}

impl<E: PoseEngine> FrameProcessor<E> {
    pub fn new(pose: E, engine: DetectionEngine, assigner: PlayerAssigner, mode: AssignMode) -> Self {
        Self {
            pose,
            engine,
            assigner,
            mode,
            session_start: Instant::now(),
        }
    }

    pub fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    pub fn mode(&self) -> AssignMode {
        self.mode
    }

    /// Seconds between session start and `instant`.
    pub fn session_time(&self, instant: Instant) -> f64 {
        instant.saturating_duration_since(self.session_start).as_secs_f64()
    }

    pub fn process(&mut self, frame: Frame) -> ProcessedFrame {
        let at = self.session_time(frame.timestamp);
        let assignment = self.assign(&frame);
        let evaluations = self.engine.process(&assignment, at);
        ProcessedFrame {
            snapshot: self.engine.snapshot(at),
            frame,
            evaluations,
            mode: self.mode,
        }
    }

    fn assign(&mut self, frame: &Frame) -> Assignment {
        match self.mode {
            AssignMode::Midpoint { midpoint } => {
                let detection = self.infer(frame);
                self.assigner.by_midpoint(detection, midpoint)
            }
            AssignMode::SplitScreen => {
                let half = frame.width / 2;
                let left = self
                    .infer(&frame.crop_columns(0, half))
                    .map(|joints| joints.remap_columns(0, frame.width));
                let right = self
                    .infer(&frame.crop_columns(half, frame.width))
                    .map(|joints| joints.remap_columns(half, frame.width));
                self.assigner.by_halves(left, right)
            }
        }
    }

    fn infer(&mut self, frame: &Frame) -> Option<JointFrame> {
        match self.pose.infer(frame) {
            Ok(Some(joints)) => Some(joints),
            Ok(None) => {
                log::debug!("no person detected");
                None
            }
            Err(err) => {
                log::warn!("pose inference failed: {err:?}");
                None
            }
        }
    }

    pub fn apply(&mut self, command: EngineCommand) {
        if command == EngineCommand::Reset {
            self.session_start = Instant::now();
        }
        self.engine.apply(command);
    }

    pub fn set_device_available(&mut self, available: bool) {
        self.engine.set_device_available(available);
    }

    pub fn snapshot_now(&self) -> SessionSnapshot {
        self.engine.snapshot(self.session_time(Instant::now()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Stopped,
}

/// Cheap, cloneable access to a pipeline from the rendering thread.
#[derive(Clone)]
pub struct PipelineHandle {
    stop: Arc<AtomicBool>,
    command_tx: Sender<EngineCommand>,
    latest: Arc<Mutex<SessionSnapshot>>,
    annotated_rx: Receiver<AnnotatedFrame>,
}

impl PipelineHandle {
    /// Value copy of the most recent state.
    pub fn latest(&self) -> SessionSnapshot {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Newest annotated frame, if one arrived since the last call.
    pub fn latest_frame(&self) -> Option<AnnotatedFrame> {
        let mut frame = self.annotated_rx.try_recv().ok()?;
        while let Ok(newer) = self.annotated_rx.try_recv() {
            frame = newer;
        }
        Some(frame)
    }

    pub fn annotated_frames(&self) -> &Receiver<AnnotatedFrame> {
        &self.annotated_rx
    }

    pub fn send(&self, command: EngineCommand) -> Result<(), PipelineError> {
        if self.is_stopped() {
            return Err(PipelineError::Stopped);
        }
        self.command_tx.try_send(command).map_err(|err| match err {
            TrySendError::Full(_) => PipelineError::CommandQueueFull,
            TrySendError::Disconnected(_) => PipelineError::Stopped,
        })
    }

    pub fn set_target_zone(&self, slot: PlayerSlot, in_zone: bool) -> Result<(), PipelineError> {
        self.send(EngineCommand::TargetZone { slot, in_zone })
    }

    pub fn reset(&self) -> Result<(), PipelineError> {
        self.send(EngineCommand::Reset)
    }

    /// Ask every pipeline thread to wind down. Safe to call repeatedly and
    /// from any thread; [`Pipeline::stop`] also waits for them.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

struct Startup<E> {
    processor: FrameProcessor<E>,
    opener: CameraOpener,
    command_rx: Receiver<EngineCommand>,
    annotated_tx: Sender<AnnotatedFrame>,
    overlay: OverlaySettings,
}

struct Running {
    capture: thread::JoinHandle<()>,
    worker: thread::JoinHandle<()>,
    compositor: thread::JoinHandle<()>,
}

pub struct Pipeline<E> {
    state: PipelineState,
    retry_interval: Duration,
    handle: PipelineHandle,
    startup: Option<Startup<E>>,
    running: Option<Running>,
}

impl<E: PoseEngine> Pipeline<E> {
    pub fn new(processor: FrameProcessor<E>, opener: CameraOpener, retry_interval: Duration) -> Self {
        let (command_tx, command_rx) = crossbeam_channel::bounded(COMMAND_QUEUE_CAPACITY);
        let (annotated_tx, annotated_rx) = crossbeam_channel::bounded(1);
        let overlay = OverlaySettings {
            profile: processor.engine().profile().clone(),
            min_visibility: processor.assigner.min_visibility(),
        };
        let handle = PipelineHandle {
            stop: Arc::new(AtomicBool::new(false)),
            command_tx,
            latest: Arc::new(Mutex::new(processor.snapshot_now())),
            annotated_rx,
        };

        Self {
            state: PipelineState::Idle,
            retry_interval,
            handle,
            startup: Some(Startup {
                processor,
                opener,
                command_rx,
                annotated_tx,
                overlay,
            }),
            running: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    /// Idle -> Running. Fails once the pipeline has been started or stopped.
    pub fn start(&mut self) -> Result<PipelineHandle, PipelineError> {
        let Some(startup) = self.startup.take() else {
            return Err(PipelineError::Stopped);
        };
        let Startup {
            processor,
            opener,
            command_rx,
            annotated_tx,
            overlay,
        } = startup;

        let (frame_tx, frame_rx) = crossbeam_channel::bounded(1);
        let (processed_tx, processed_rx) = crossbeam_channel::bounded(1);
        let device_available = Arc::new(AtomicBool::new(true));

        let capture = start_capture(
            opener,
            frame_tx,
            self.handle.stop.clone(),
            device_available.clone(),
            self.retry_interval,
        );
        let compositor = start_frame_compositor(processed_rx, annotated_tx, overlay);
        let worker = {
            let channels = WorkerChannels {
                frame_rx,
                command_rx,
                processed_tx,
            };
            let shared = WorkerShared {
                stop: self.handle.stop.clone(),
                device_available,
                latest: self.handle.latest.clone(),
            };
            thread::spawn(move || worker_loop(processor, channels, shared))
        };

        self.running = Some(Running {
            capture,
            worker,
            compositor,
        });
        self.state = PipelineState::Running;
        log::info!("pipeline running");
        Ok(self.handle())
    }

    /// Stop and join every thread. Idempotent; the final snapshot stays
    /// readable through any handle.
    pub fn stop(&mut self) {
        self.handle.stop();
        if let Some(running) = self.running.take() {
            for (name, thread) in [
                ("capture", running.capture),
                ("worker", running.worker),
                ("compositor", running.compositor),
            ] {
                if thread.join().is_err() {
                    log::error!("{name} thread panicked");
                }
            }
            log::info!("pipeline stopped");
        }
        self.startup = None;
        self.state = PipelineState::Stopped;
    }
}

impl<E> Drop for Pipeline<E> {
    fn drop(&mut self) {
        self.handle.stop.store(true, Ordering::SeqCst);
        if let Some(running) = self.running.take() {
            let _ = running.capture.join();
            let _ = running.worker.join();
            let _ = running.compositor.join();
        }
    }
}

struct WorkerChannels {
    frame_rx: Receiver<Frame>,
    command_rx: Receiver<EngineCommand>,
    processed_tx: Sender<ProcessedFrame>,
}

struct WorkerShared {
    stop: Arc<AtomicBool>,
    device_available: Arc<AtomicBool>,
    latest: Arc<Mutex<SessionSnapshot>>,
}

impl WorkerShared {
    fn publish(&self, snapshot: SessionSnapshot) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

fn worker_loop<E: PoseEngine>(
    mut processor: FrameProcessor<E>,
    channels: WorkerChannels,
    shared: WorkerShared,
) {
    loop {
        while let Ok(command) = channels.command_rx.try_recv() {
            processor.apply(command);
        }
        processor.set_device_available(shared.device_available.load(Ordering::SeqCst));
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }

        match recv_latest_frame(&channels.frame_rx, IDLE_TICK) {
            Ok(frame) => {
                let processed = processor.process(frame);
                shared.publish(processed.snapshot.clone());
                let _ = channels.processed_tx.try_send(processed);
            }
            Err(RecvTimeoutError::Timeout) => shared.publish(processor.snapshot_now()),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Commands queued before the stop still count.
    while let Ok(command) = channels.command_rx.try_recv() {
        processor.apply(command);
    }
    processor.set_device_available(shared.device_available.load(Ordering::SeqCst));
    shared.publish(processor.snapshot_now());
    log::debug!("worker thread exiting");
}

fn recv_latest_frame(frame_rx: &Receiver<Frame>, timeout: Duration) -> Result<Frame, RecvTimeoutError> {
    let mut frame = frame_rx.recv_timeout(timeout)?;
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    Ok(frame)
}
