use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::{
    assign::{AssignMode, DEFAULT_MIN_VISIBILITY, PlayerAssigner},
    engine::{DEFAULT_STALE_AFTER_SECS, EngineSettings},
    error::ConfigError,
    pose::BodySide,
    profile::{AngleThresholds, ExerciseKind, ExerciseProfile, Limbs},
    rhythm::RhythmPattern,
    scoring::ScoringMode,
};

pub const DEFAULT_CONFIG_PATH: &str = "squativa.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub rhythm: RhythmPattern,
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Per-exercise overrides keyed by exercise name, e.g. `[thresholds.squat]`.
    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdOverride>,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_camera_index")]
    pub index: u32,
    /// Requested capture size. The device may pick something else.
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
    /// Wait between attempts to reopen a lost device.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

fn default_camera_index() -> u32 { 0 }
fn default_camera_width() -> u32 { 640 }
fn default_camera_height() -> u32 { 480 }
fn default_camera_fps() -> u32 { 30 }
fn default_retry_interval_ms() -> u64 { 1000 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: default_camera_index(),
            width: default_camera_width(),
            height: default_camera_height(),
            fps: default_camera_fps(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl CameraConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    /// Whole frame, players told apart by nose position.
    #[default]
    Midpoint,
    /// Left and right halves inferred separately.
    Split,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_exercise")]
    pub exercise: ExerciseKind,
    #[serde(default = "default_side")]
    pub side: BodySide,
    /// `single` tracks `side` only; `either` and `both` read both sides.
    #[serde(default)]
    pub limbs: Limbs,
    #[serde(default)]
    pub assignment: AssignmentKind,
    #[serde(default = "default_midpoint")]
    pub midpoint: f32,
    #[serde(default = "default_min_visibility")]
    pub min_visibility: f32,
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

fn default_exercise() -> ExerciseKind { ExerciseKind::Squat }
fn default_side() -> BodySide { BodySide::Left }
fn default_midpoint() -> f32 { 0.5 }
fn default_min_visibility() -> f32 { DEFAULT_MIN_VISIBILITY }
fn default_stale_after_ms() -> u64 { (DEFAULT_STALE_AFTER_SECS * 1000.0) as u64 }

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            exercise: default_exercise(),
            side: default_side(),
            limbs: Limbs::default(),
            assignment: AssignmentKind::default(),
            midpoint: default_midpoint(),
            min_visibility: default_min_visibility(),
            stale_after_ms: default_stale_after_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub mode: ScoringMode,
}

/// Any field left out keeps the preset value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOverride {
    pub contracted: Option<f32>,
    pub extended: Option<f32>,
    pub form_bound: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_path")]
    pub path: String,
    /// Fetched into `path` when the file is missing.
    #[serde(default)]
    pub url: Option<String>,
    /// Square input edge the network expects.
    #[serde(default = "default_input_size")]
    pub input_size: u32,
}

fn default_model_path() -> String { "models/movenet_singlepose_lightning.onnx".to_string() }
fn default_input_size() -> u32 { 192 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            url: None,
            input_size: default_input_size(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Defaults when the file does not exist. A file that exists but is
    /// malformed is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            log::info!("{} not found, using default config", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        if !(0.0..=1.0).contains(&session.min_visibility) {
            return Err(ConfigError::Visibility(session.min_visibility));
        }
        if !(session.midpoint > 0.0 && session.midpoint < 1.0) {
            return Err(ConfigError::Midpoint(session.midpoint));
        }
        if self.camera.retry_interval_ms == 0 {
            return Err(ConfigError::NonPositive {
                name: "camera retry interval",
                value: 0.0,
            });
        }
        if let Some(unknown) = self
            .thresholds
            .keys()
            .find(|name| !ExerciseKind::ALL.iter().any(|kind| kind.name() == name.as_str()))
        {
            return Err(ConfigError::UnknownExercise(unknown.clone()));
        }
        self.engine_settings().validate()
    }

    /// Preset for the configured exercise with any table overrides applied.
    pub fn profile(&self) -> ExerciseProfile {
        let exercise = self.session.exercise;
        let mut profile =
            ExerciseProfile::preset(exercise, self.session.side).with_limbs(self.session.limbs);
        if let Some(o) = self.thresholds.get(exercise.name()) {
            let thresholds = AngleThresholds::new(
                o.contracted.unwrap_or(profile.thresholds.contracted),
                o.extended.unwrap_or(profile.thresholds.extended),
            );
            profile = profile.with_thresholds(thresholds);
            if let Some(bound) = o.form_bound {
                profile = profile.with_form_bound(bound);
            }
        }
        profile
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let mut settings = EngineSettings::new(self.profile())
            .with_scoring(self.scoring.mode)
            .with_rhythm(self.rhythm.clone());
        settings.stale_after = self.session.stale_after_ms as f64 / 1000.0;
        settings
    }

    pub fn assign_mode(&self) -> AssignMode {
        match self.session.assignment {
            AssignmentKind::Midpoint => AssignMode::Midpoint {
                midpoint: self.session.midpoint,
            },
            AssignmentKind::Split => AssignMode::SplitScreen,
        }
    }

    pub fn assigner(&self) -> PlayerAssigner {
        PlayerAssigner::new(self.profile().required_joints(), self.session.min_visibility)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.session.exercise, ExerciseKind::Squat);
        assert_eq!(config.scoring.mode, ScoringMode::Rhythm);
        assert_eq!(config.rhythm, RhythmPattern::default());
        assert_eq!(config.assign_mode(), AssignMode::Midpoint { midpoint: 0.5 });
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.camera.retry_interval(), Duration::from_secs(1));
        assert_eq!(config.session.stale_after_ms, 1500);
        assert_eq!(config.model.input_size, 192);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml_str(
            r#"
            [session]
            exercise = "bicep_curl"
            side = "right"
            assignment = "split"

            [rhythm]
            base = [1.0, 2.5]

            [scoring]
            mode = "target_zone"
            "#,
        )
        .unwrap();
        assert_eq!(config.session.exercise, ExerciseKind::BicepCurl);
        assert_eq!(config.session.side, BodySide::Right);
        assert!(approx_eq(config.session.min_visibility, 0.5));
        assert_eq!(config.assign_mode(), AssignMode::SplitScreen);
        assert_eq!(config.rhythm.base, vec![1.0, 2.5]);
        assert_eq!(config.rhythm.gap, 2.0);
        assert_eq!(config.scoring.mode, ScoringMode::TargetZone);
    }

    #[test]
    fn test_threshold_override() {
        let config = Config::from_toml_str(
            r#"
            [thresholds.squat]
            contracted = 90.0
            form_bound = 80.0
            "#,
        )
        .unwrap();
        let profile = config.profile();
        assert!(approx_eq(profile.thresholds.contracted, 90.0));
        assert!(approx_eq(profile.thresholds.extended, 160.0));
        assert_eq!(profile.form.bound(), Some(80.0));
    }

    #[test]
    fn test_extended_only_override_keeps_preset_contracted() {
        let config = Config::from_toml_str(
            r#"
            [session]
            exercise = "lateral_raise"

            [thresholds.lateral_raise]
            extended = 20.0
            "#,
        )
        .unwrap();
        let profile = config.profile();
        assert!(approx_eq(profile.thresholds.contracted, 80.0));
        assert!(approx_eq(profile.thresholds.extended, 20.0));
        assert_eq!(profile.form.bound(), Some(150.0));
    }

    #[test]
    fn test_limbs_setting() {
        assert_eq!(Config::default().profile().limbs, Limbs::Single);
        let config = Config::from_toml_str(
            r#"
            [session]
            exercise = "bicep_curl"
            limbs = "either"
            "#,
        )
        .unwrap();
        let profile = config.profile();
        assert_eq!(profile.limbs, Limbs::Either);
        assert_eq!(profile.required_joints().len(), 8);
    }

    #[test]
    fn test_override_for_other_exercise_is_ignored() {
        let config = Config::from_toml_str(
            r#"
            [thresholds.bicep_curl]
            contracted = 30.0
            "#,
        )
        .unwrap();
        assert!(approx_eq(config.profile().thresholds.contracted, 70.0));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let err = Config::from_toml_str(
            r#"
            [thresholds.squat]
            contracted = 170.0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::BoundOrder { .. }));
    }

    #[test]
    fn test_unknown_exercise_rejected() {
        let err = Config::from_toml_str("[thresholds.pushup]\ncontracted = 10.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownExercise(name) if name == "pushup"));
    }

    #[test]
    fn test_empty_pattern_needs_rhythm_scoring_to_fail() {
        let err = Config::from_toml_str("[rhythm]\nbase = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyPattern));
        let config =
            Config::from_toml_str("[rhythm]\nbase = []\n[scoring]\nmode = \"form_only\"\n").unwrap();
        assert_eq!(config.scoring.mode, ScoringMode::FormOnly);
    }

    #[test]
    fn test_out_of_range_session_values() {
        assert!(matches!(
            Config::from_toml_str("[session]\nmin_visibility = 1.5\n"),
            Err(ConfigError::Visibility(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[session]\nmidpoint = 1.0\n"),
            Err(ConfigError::Midpoint(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[session]\nstale_after_ms = 0\n"),
            Err(ConfigError::NonPositive { .. })
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Config::from_toml_str("[session\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("/nonexistent/squativa.toml").unwrap();
        assert_eq!(config.session.exercise, ExerciseKind::Squat);
        assert!(matches!(
            Config::load("/nonexistent/squativa.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
