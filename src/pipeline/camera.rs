use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Sender, TrySendError};
use rayon::prelude::*;

use crate::{error::CameraError, types::Frame};

/// Wait after a read miss before asking the device again.
const READ_MISS_BACKOFF: Duration = Duration::from_millis(5);
/// Granularity of the stop check while waiting to reopen a device.
const STOP_POLL: Duration = Duration::from_millis(20);

/// Anything that hands out RGBA frames on demand.
pub trait CameraSource: Send {
    /// `ReadMiss` is transient; `Unavailable` means the device must be reopened.
    fn read(&mut self) -> Result<Frame, CameraError>;
}

/// Opens (or reopens) the capture device. Called from the capture thread.
pub type CameraOpener =
    Box<dyn FnMut() -> Result<Box<dyn CameraSource>, CameraError> + Send + 'static>;

pub(crate) fn start_capture(
    opener: CameraOpener,
    frame_tx: Sender<Frame>,
    stop: Arc<AtomicBool>,
    device_available: Arc<AtomicBool>,
    retry_interval: Duration,
) -> thread::JoinHandle<()> {
    thread::spawn(move || capture_loop(opener, frame_tx, stop, device_available, retry_interval))
}

fn capture_loop(
    mut opener: CameraOpener,
    frame_tx: Sender<Frame>,
    stop: Arc<AtomicBool>,
    device_available: Arc<AtomicBool>,
    retry_interval: Duration,
) {
    let mut camera: Option<Box<dyn CameraSource>> = None;

    while !stop.load(Ordering::Relaxed) {
        if camera.is_none() {
            match opener() {
                Ok(source) => {
                    log::info!("camera opened");
                    device_available.store(true, Ordering::SeqCst);
                    camera = Some(source);
                }
                Err(err) => {
                    log::warn!("{err}, retrying in {retry_interval:?}");
                    device_available.store(false, Ordering::SeqCst);
                    sleep_unless_stopped(&stop, retry_interval);
                }
            }
            continue;
        }
        let Some(source) = camera.as_mut() else {
            continue;
        };

        match source.read() {
            Ok(frame) => match frame_tx.try_send(frame) {
                // Drop the newest frame if the worker is busy.
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => break,
            },
            Err(CameraError::ReadMiss) => {
                log::debug!("camera read miss");
                thread::sleep(READ_MISS_BACKOFF);
            }
            Err(err @ CameraError::Unavailable(_)) => {
                log::warn!("camera lost: {err}");
                device_available.store(false, Ordering::SeqCst);
                camera = None;
            }
        }
    }

    log::debug!("capture thread exiting");
}

fn sleep_unless_stopped(stop: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(STOP_POLL.min(deadline - now));
    }
}

/// Expand packed RGB to RGBA with an opaque alpha channel.
pub fn rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    let pixel_count = rgb.len() / 3;
    let mut rgba = vec![0u8; pixel_count * 4];
    rgba.par_chunks_mut(4)
        .zip(rgb.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            dst[..3].copy_from_slice(src);
            dst[3] = 255;
        });
    rgba
}

#[cfg(feature = "camera-nokhwa")]
pub use self::nokhwa_source::{CameraDevice, NokhwaCamera, available_cameras};

#[cfg(feature = "camera-nokhwa")]
mod nokhwa_source {
    use anyhow::{Result, anyhow};
    use nokhwa::{
        Camera,
        pixel_format::RgbFormat,
        query,
        utils::{
            ApiBackend, CameraFormat, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
            RequestedFormatType, Resolution,
        },
    };

    use super::{CameraSource, rgb_to_rgba};
    use crate::{config::CameraConfig, error::CameraError, types::Frame};

    // MJPEG first: some built-in cameras reject YUYV even when it is listed.
    const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
        FrameFormat::MJPEG,
        FrameFormat::NV12,
        FrameFormat::RAWRGB,
        FrameFormat::RAWBGR,
    ];

    fn requested_formats(config: &CameraConfig) -> [RequestedFormat<'static>; 4] {
        let wanted = CameraFormat::new(
            Resolution::new(config.width, config.height),
            FrameFormat::MJPEG,
            config.fps,
        );
        [
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted)),
            RequestedFormat::with_formats(
                RequestedFormatType::AbsoluteHighestFrameRate,
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ]
    }

    #[derive(Clone, Debug)]
    pub struct CameraDevice {
        pub index: CameraIndex,
        pub label: String,
    }

    pub fn available_cameras() -> Result<Vec<CameraDevice>> {
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
        let index = info.index().as_string();
        if desc.is_empty() || desc == "N/A" {
            format!("{name} (#{index})")
        } else {
            format!("{name} ({desc}, #{index})")
        }
    }

    fn build_camera(index: CameraIndex, config: &CameraConfig) -> Result<Camera> {
        let mut last_err = None;

        for requested in requested_formats(config) {
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

    pub struct NokhwaCamera {
        camera: Camera,
    }

    impl NokhwaCamera {
        pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
            let index = CameraIndex::Index(config.index);
            let camera = build_camera(index, config)
                .map_err(|err| CameraError::Unavailable(format!("camera #{}: {err:#}", config.index)))?;
            let format = camera.camera_format();
            log::info!(
                "camera #{} streaming {}x{} @ {} fps",
                config.index,
                format.width(),
                format.height(),
                format.frame_rate()
            );
            Ok(Self { camera })
        }
    }

    impl CameraSource for NokhwaCamera {
        fn read(&mut self) -> Result<Frame, CameraError> {
            let buffer = self.camera.frame().map_err(|err| {
                if self.camera.is_stream_open() {
                    log::debug!("camera frame read failed: {err:?}");
                    CameraError::ReadMiss
                } else {
                    CameraError::Unavailable(err.to_string())
                }
            })?;

            let decoded = buffer.decode_image::<RgbFormat>().map_err(|err| {
                log::warn!("failed to decode camera frame: {err:?}");
                CameraError::ReadMiss
            })?;

            let (width, height) = decoded.dimensions();
            let rgb = decoded.into_raw();
            if rgb.is_empty() {
                return Err(CameraError::ReadMiss);
            }
            Ok(Frame::new(rgb_to_rgba(&rgb), width, height))
        }
    }
}
