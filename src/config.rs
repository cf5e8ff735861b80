use std::{env, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

use crate::{model_download::default_detector_model_path, types::FacingMode};

const DEFAULT_CADENCE: u32 = 3;
const DEFAULT_REFRESH_HZ: u32 = 60;
const DEFAULT_DISPLAY_WIDTH: f32 = 800.0;
const DEFAULT_MIN_SCORE: f32 = 0.5;
const DEFAULT_MAX_DETECTIONS: usize = 20;
const DEFAULT_INPUT_WIDTH: u32 = 640;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Run inference on every `cadence`-th refresh tick.
    pub cadence: u32,
    pub refresh_hz: u32,
    pub initial_facing: FacingMode,
    pub display_width: f32,
    pub model_path: PathBuf,
    pub min_score: f32,
    pub max_detections: usize,
    /// Frames wider than this are downscaled before inference.
    pub input_width: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cadence: DEFAULT_CADENCE,
            refresh_hz: DEFAULT_REFRESH_HZ,
            initial_facing: FacingMode::Environment,
            display_width: DEFAULT_DISPLAY_WIDTH,
            model_path: default_detector_model_path(),
            min_score: DEFAULT_MIN_SCORE,
            max_detections: DEFAULT_MAX_DETECTIONS,
            input_width: DEFAULT_INPUT_WIDTH,
        }
    }
}

impl AppConfig {
    /// Defaults overridden by `FRAMEAI_*` environment variables. Bad values are
    /// logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let apply = |result: Result<(), ConfigError>| {
            if let Err(err) = result {
                log::warn!("ignoring invalid setting {err}");
            }
        };

        if let Some(raw) = lookup("FRAMEAI_CADENCE") {
            apply(
                parse::<u32>("FRAMEAI_CADENCE", &raw).and_then(|cadence| {
                    if cadence == 0 {
                        return Err(invalid("FRAMEAI_CADENCE", "cadence must be at least 1"));
                    }
                    config.cadence = cadence;
                    Ok(())
                }),
            );
        }
        if let Some(raw) = lookup("FRAMEAI_REFRESH_HZ") {
            apply(
                parse::<u32>("FRAMEAI_REFRESH_HZ", &raw).and_then(|hz| {
                    if hz == 0 || hz > 240 {
                        return Err(invalid("FRAMEAI_REFRESH_HZ", "expected 1..=240"));
                    }
                    config.refresh_hz = hz;
                    Ok(())
                }),
            );
        }
        if let Some(raw) = lookup("FRAMEAI_FACING") {
            apply(
                parse::<FacingMode>("FRAMEAI_FACING", &raw)
                    .map(|facing| config.initial_facing = facing),
            );
        }
        if let Some(raw) = lookup("FRAMEAI_DISPLAY_WIDTH") {
            apply(
                parse::<f32>("FRAMEAI_DISPLAY_WIDTH", &raw).and_then(|width| {
                    if !(width.is_finite() && width >= 160.0) {
                        return Err(invalid("FRAMEAI_DISPLAY_WIDTH", "expected at least 160"));
                    }
                    config.display_width = width;
                    Ok(())
                }),
            );
        }
        if let Some(raw) = lookup("FRAMEAI_MODEL_PATH") {
            if !raw.trim().is_empty() {
                config.model_path = PathBuf::from(raw.trim());
            }
        }
        if let Some(raw) = lookup("FRAMEAI_MIN_SCORE") {
            apply(
                parse::<f32>("FRAMEAI_MIN_SCORE", &raw).and_then(|score| {
                    if !(0.0..=1.0).contains(&score) {
                        return Err(invalid("FRAMEAI_MIN_SCORE", "expected 0..=1"));
                    }
                    config.min_score = score;
                    Ok(())
                }),
            );
        }
        if let Some(raw) = lookup("FRAMEAI_MAX_DETECTIONS") {
            apply(
                parse::<usize>("FRAMEAI_MAX_DETECTIONS", &raw)
                    .map(|max| config.max_detections = max),
            );
        }
        if let Some(raw) = lookup("FRAMEAI_INPUT_WIDTH") {
            apply(
                parse::<u32>("FRAMEAI_INPUT_WIDTH", &raw).and_then(|width| {
                    if width < 32 {
                        return Err(invalid("FRAMEAI_INPUT_WIDTH", "expected at least 32"));
                    }
                    config.input_width = width;
                    Ok(())
                }),
            );
        }

        config
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refresh_hz.max(1) as f64)
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    raw.trim()
        .parse::<T>()
        .map_err(|err| invalid(key, err.to_string()))
}

fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.into(),
    }
}
