use std::{
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender};

use crate::{
    assign::AssignMode,
    pipeline::{ProcessedFrame, skeleton},
    profile::ExerciseProfile,
    types::AnnotatedFrame,
};

const MAX_COMPOSITED_FPS: u64 = 30;
const MIN_COMPOSITED_FPS: u64 = 12;
const SLOWDOWN_FACTOR: f64 = 1.25;
const RECOVERY_FACTOR: f64 = 0.85;

/// What the compositor needs to know about the session to draw it.
#[derive(Clone, Debug)]
pub struct OverlaySettings {
    pub profile: ExerciseProfile,
    pub min_visibility: f32,
}

pub(crate) fn start_frame_compositor(
    processed_rx: Receiver<ProcessedFrame>,
    annotated_tx: Sender<AnnotatedFrame>,
    overlay: OverlaySettings,
) -> thread::JoinHandle<()> {
    thread::spawn(move || compositor_loop(processed_rx, annotated_tx, overlay))
}

fn compositor_loop(
    processed_rx: Receiver<ProcessedFrame>,
    annotated_tx: Sender<AnnotatedFrame>,
    overlay: OverlaySettings,
) {
    let min_interval = Duration::from_millis(1_000 / MAX_COMPOSITED_FPS);
    let max_interval = Duration::from_millis(1_000 / MIN_COMPOSITED_FPS);
    let mut target_interval = min_interval;

    while let Ok(mut processed) = processed_rx.recv() {
        while let Ok(newer) = processed_rx.try_recv() {
            processed = newer;
        }

        let ProcessedFrame {
            mut frame,
            evaluations,
            snapshot,
            mode,
        } = processed;

        let compose_start = Instant::now();
        let split_x = split_column(mode, frame.width);
        skeleton::draw_overlay(
            &mut frame,
            &overlay.profile,
            split_x,
            overlay.min_visibility,
            &evaluations,
        );
        let compose_time = compose_start.elapsed();

        let dropped_frame = annotated_tx
            .try_send(AnnotatedFrame { frame, snapshot })
            .is_err();

        target_interval = adjust_interval(
            target_interval,
            compose_time,
            min_interval,
            max_interval,
            dropped_frame,
        );
        if let Some(sleep_for) = target_interval.checked_sub(compose_time) {
            if !sleep_for.is_zero() {
                thread::sleep(sleep_for);
            }
        }
    }

    log::debug!("compositor thread exiting");
}

/// Pixel column separating the two players.
pub fn split_column(mode: AssignMode, width: u32) -> u32 {
    match mode {
        AssignMode::Midpoint { midpoint } => (midpoint.clamp(0.0, 1.0) * width as f32) as u32,
        AssignMode::SplitScreen => width / 2,
    }
}

fn adjust_interval(
    current: Duration,
    compose_time: Duration,
    min_interval: Duration,
    max_interval: Duration,
    dropped_frame: bool,
) -> Duration {
    let current_secs = current.as_secs_f64();
    let compose_secs = compose_time.as_secs_f64();
    let min_secs = min_interval.as_secs_f64();
    let max_secs = max_interval.as_secs_f64();

    if dropped_frame && current < max_interval {
        Duration::from_secs_f64((current_secs * SLOWDOWN_FACTOR).min(max_secs))
    } else if compose_secs > current_secs && current < max_interval {
        Duration::from_secs_f64((compose_secs * SLOWDOWN_FACTOR).min(max_secs))
    } else if compose_secs * 1.5 < current_secs && current > min_interval {
        Duration::from_secs_f64((current_secs * RECOVERY_FACTOR).max(min_secs))
    } else {
        current
    }
}
