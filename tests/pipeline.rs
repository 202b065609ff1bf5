mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use common::{HEIGHT, MarkerPose, SquatCamera, WIDTH, wait_for};
use squativa::{
    assign::{AssignMode, PlayerAssigner},
    engine::{DetectionEngine, EngineSettings},
    error::PipelineError,
    pipeline::{
        FrameProcessor, Pipeline, PipelineState,
        camera::{CameraOpener, CameraSource},
    },
    pose::BodySide,
    profile::{ExerciseKind, ExerciseProfile},
    scoring::ScoringMode,
    types::PlayerSlot,
};

const TIMEOUT: Duration = Duration::from_secs(5);

struct Rig {
    pipeline: Pipeline<MarkerPose>,
    moving: Arc<AtomicBool>,
}

fn rig(scoring: ScoringMode, player_x: f32) -> Rig {
    let profile = ExerciseProfile::preset(ExerciseKind::Squat, BodySide::Left);
    let assigner = PlayerAssigner::new(profile.required_joints(), 0.5);
    let engine = DetectionEngine::new(EngineSettings::new(profile).with_scoring(scoring)).unwrap();
    let processor = FrameProcessor::new(
        MarkerPose { x: player_x },
        engine,
        assigner,
        AssignMode::default(),
    );

    let moving = Arc::new(AtomicBool::new(false));
    let camera_moving = moving.clone();
    let reads = Arc::new(AtomicUsize::new(0));
    let opener: CameraOpener = Box::new(move || {
        Ok(Box::new(SquatCamera {
            moving: camera_moving.clone(),
            reads: reads.clone(),
            interval: Duration::from_millis(5),
        }) as Box<dyn CameraSource>)
    });

    Rig {
        pipeline: Pipeline::new(processor, opener, Duration::from_millis(10)),
        moving,
    }
}

#[test]
fn counts_reps_and_resets() {
    let Rig {
        mut pipeline,
        moving,
    } = rig(ScoringMode::FormOnly, 0.3);
    let handle = pipeline.start().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Running);

    moving.store(true, Ordering::SeqCst);
    assert!(wait_for(TIMEOUT, || {
        handle.latest().player(PlayerSlot::Player1).rep_count >= 2
    }));

    let snapshot = handle.latest();
    let p1 = snapshot.player(PlayerSlot::Player1);
    assert!(p1.form_correct);
    // Form only: full form and no timing component.
    assert_eq!(p1.last_rep_score, Some(50.0));
    assert_eq!(p1.score, 50.0 * f64::from(p1.rep_count));
    assert!(p1.present);
    assert!(snapshot.device_available);
    assert_eq!(snapshot.player(PlayerSlot::Player2).rep_count, 0);

    moving.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
    handle.reset().unwrap();
    assert!(wait_for(TIMEOUT, || handle.latest().total_reps() == 0));

    thread::sleep(Duration::from_millis(100));
    assert_eq!(handle.latest().total_reps(), 0);

    pipeline.stop();
    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert!(matches!(handle.reset(), Err(PipelineError::Stopped)));
}

#[test]
fn target_zone_hit_counts_once_per_entry() {
    let Rig {
        mut pipeline,
        moving,
    } = rig(ScoringMode::TargetZone, 0.7);
    let handle = pipeline.start().unwrap();

    handle.set_target_zone(PlayerSlot::Player2, true).unwrap();
    moving.store(true, Ordering::SeqCst);
    assert!(wait_for(TIMEOUT, || {
        handle.latest().player(PlayerSlot::Player2).rep_count >= 2
    }));

    let p2 = handle.latest().player(PlayerSlot::Player2).clone();
    assert_eq!(p2.zone_hits, 1);
    assert!(p2.score > 0.0);
    assert_eq!(handle.latest().player(PlayerSlot::Player1).rep_count, 0);

    pipeline.stop();
}

#[test]
fn publishes_annotated_frames() {
    let Rig { mut pipeline, .. } = rig(ScoringMode::FormOnly, 0.3);
    let handle = pipeline.start().unwrap();

    let frame = handle
        .annotated_frames()
        .recv_timeout(TIMEOUT)
        .expect("compositor should publish a frame");
    assert_eq!((frame.frame.width, frame.frame.height), (WIDTH, HEIGHT));
    let image = frame.to_image().unwrap();
    assert_eq!(image.dimensions(), (WIDTH, HEIGHT));
    // The skeleton is drawn over a black frame.
    assert!(image.pixels().any(|px| px.0[..3] != [0, 0, 0]));

    pipeline.stop();
}
