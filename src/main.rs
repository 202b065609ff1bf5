use std::{
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use squativa::{
    config::{Config, DEFAULT_CONFIG_PATH},
    engine::DetectionEngine,
    replay::run_replay,
};

const USAGE: &str = "usage: squativa [--config <file>] [--replay <file.jsonl>] [--dump-dir <dir>]";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    replay: Option<PathBuf>,
    dump_dir: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut parsed = Args::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let slot = match arg.as_str() {
            "--config" | "-c" => &mut parsed.config,
            "--replay" => &mut parsed.replay,
            "--dump-dir" => &mut parsed.dump_dir,
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("unexpected argument {other:?}\n{USAGE}"),
        };
        let value = args
            .next()
            .with_context(|| format!("{arg} needs a value\n{USAGE}"))?;
        *slot = Some(PathBuf::from(value));
    }
    Ok(parsed)
}

fn main() -> Result<()> {
    env_logger::init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(DEFAULT_CONFIG_PATH)?,
    };
    log::info!(
        "{} session, {:?} assignment, {:?} scoring",
        config.session.exercise.display_name(),
        config.session.assignment,
        config.scoring.mode
    );

    match &args.replay {
        Some(path) => replay(&config, path),
        None => live::run(&config, args.dump_dir.as_deref()),
    }
}

fn replay(config: &Config, path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut engine = DetectionEngine::new(config.engine_settings())?;
    let report = run_replay(
        BufReader::new(file),
        &mut engine,
        &config.assigner(),
        config.assign_mode(),
    )?;

    println!(
        "{} ticks, {} repetitions completed",
        report.ticks, report.completed_reps
    );
    serde_json::to_writer_pretty(io::stdout().lock(), &report.snapshot)?;
    println!();
    Ok(())
}

#[cfg(all(feature = "camera-nokhwa", feature = "backend-ort"))]
mod live {
    use std::{
        collections::HashMap,
        io::{self, BufRead},
        path::Path,
        thread,
        time::Duration,
    };

    use anyhow::{Context, Result};
    use squativa::{
        config::Config,
        engine::DetectionEngine,
        pipeline::{
            FrameProcessor, Pipeline, PipelineHandle,
            camera::{CameraOpener, CameraSource, NokhwaCamera, available_cameras},
            movenet::MoveNetEngine,
        },
        types::PlayerSlot,
    };

    const REPORT_INTERVAL: Duration = Duration::from_millis(250);

    pub fn run(config: &Config, dump_dir: Option<&Path>) -> Result<()> {
        match available_cameras() {
            Ok(cameras) => {
                for camera in cameras {
                    log::info!("found camera {}", camera.label);
                }
            }
            Err(err) => log::warn!("failed to list cameras: {err:?}"),
        }
        if let Some(dir) = dump_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        let pose = MoveNetEngine::load(&config.model)?;
        let engine = DetectionEngine::new(config.engine_settings())?;
        let processor = FrameProcessor::new(pose, engine, config.assigner(), config.assign_mode());

        let camera_config = config.camera.clone();
        let opener: CameraOpener = Box::new(move || {
            NokhwaCamera::open(&camera_config).map(|camera| Box::new(camera) as Box<dyn CameraSource>)
        });

        let mut pipeline = Pipeline::new(processor, opener, config.camera.retry_interval());
        let handle = pipeline.start()?;

        let reporter = {
            let handle = handle.clone();
            let dump_dir = dump_dir.map(Path::to_path_buf);
            thread::spawn(move || report_loop(handle, dump_dir.as_deref()))
        };

        println!("commands: r = reset, 1/2 = toggle target zone for a player, q = quit");
        let result = command_loop(&handle);

        pipeline.stop();
        if reporter.join().is_err() {
            log::error!("reporter thread panicked");
        }
        let snapshot = handle.latest();
        for player in &snapshot.players {
            println!(
                "{}: {} reps, score {:.1}",
                player.slot.label(),
                player.rep_count,
                player.score
            );
        }
        result
    }

    fn command_loop(handle: &PipelineHandle) -> Result<()> {
        let mut zones: HashMap<PlayerSlot, bool> = HashMap::new();
        for line in io::stdin().lock().lines() {
            let line = line?;
            let sent = match line.trim() {
                "q" => break,
                "r" => handle.reset(),
                "1" | "2" => {
                    let slot = if line.trim() == "1" {
                        PlayerSlot::Player1
                    } else {
                        PlayerSlot::Player2
                    };
                    let in_zone = zones.entry(slot).or_default();
                    *in_zone = !*in_zone;
                    println!("{} target zone {}", slot.label(), if *in_zone { "on" } else { "off" });
                    handle.set_target_zone(slot, *in_zone)
                }
                "" => continue,
                other => {
                    println!("unknown command {other:?}");
                    continue;
                }
            };
            if let Err(err) = sent {
                log::warn!("command rejected: {err}");
            }
        }
        Ok(())
    }

    fn report_loop(handle: PipelineHandle, dump_dir: Option<&Path>) {
        let mut last_counts = [0u32; 2];
        let mut saved = 0usize;

        while !handle.is_stopped() {
            let snapshot = handle.latest();
            for player in &snapshot.players {
                let index = player.slot.index();
                if player.rep_count != last_counts[index] {
                    println!(
                        "{}: rep {} ({}), score {:.1}",
                        player.slot.label(),
                        player.rep_count,
                        if player.form_correct { "good form" } else { "check form" },
                        player.score
                    );
                    last_counts[index] = player.rep_count;
                }
            }

            if let (Some(dir), Some(frame)) = (dump_dir, handle.latest_frame()) {
                let path = dir.join(format!("frame_{saved:06}.png"));
                match frame.to_image().map(|image| image.save(&path)) {
                    Some(Ok(())) => saved += 1,
                    Some(Err(err)) => log::warn!("failed to save {}: {err}", path.display()),
                    None => log::warn!("annotated frame has an inconsistent buffer size"),
                }
            }

            thread::sleep(REPORT_INTERVAL);
        }
    }
}

#[cfg(not(all(feature = "camera-nokhwa", feature = "backend-ort")))]
mod live {
    use std::path::Path;

    use anyhow::{Result, bail};
    use squativa::config::Config;

    pub fn run(_config: &Config, _dump_dir: Option<&Path>) -> Result<()> {
        bail!(
            "live capture needs the `camera-nokhwa` and `backend-ort` features; \
             use --replay <file.jsonl> for offline sessions"
        )
    }
}
