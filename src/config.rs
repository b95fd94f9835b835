// Deployment settings: a TOML file merged with CLI overrides.
//
// Every key has a default so an absent file yields a runnable (if
// source-less) configuration; validation of the video source and the
// identification endpoint happens at startup, not here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cli::Args;
use crate::startup::StartupError;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 360;
const DEFAULT_FPS: u32 = 30;
const DEFAULT_MAX_FACES: usize = 11;
const DEFAULT_H_PORTION: f32 = 1.3;
const DEFAULT_V_PORTION: f32 = 1.6;
const DEFAULT_FACE_WIDTH: u32 = 156;
const DEFAULT_FACE_HEIGHT: u32 = 192;
const DEFAULT_GRACE_FRAMES: u32 = 8;
const DEFAULT_MIN_OVERLAP: f32 = 0.1;
const DEFAULT_RECOGNITION_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STARTUP_DELAY_MS: u64 = 500;
const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";

#[derive(Debug, Deserialize, Default)]
struct SettingsFile {
    video: Option<VideoSection>,
    tracking: Option<TrackingSection>,
    detector: Option<DetectorSection>,
    recognition: Option<RecognitionSection>,
    notify: Option<NotifySection>,
    visualization: Option<VisualizationSection>,
}

#[derive(Debug, Deserialize, Default)]
struct VideoSection {
    flip: Option<bool>,
    device: Option<u32>,
    stream: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    startup_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackingSection {
    max_faces: Option<usize>,
    h_portion: Option<f32>,
    v_portion: Option<f32>,
    face_width: Option<u32>,
    face_height: Option<u32>,
    grace_frames: Option<u32>,
    min_overlap: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorSection {
    classifier: Option<PathBuf>,
    landmarks: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct RecognitionSection {
    url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct NotifySection {
    channel_id: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct VisualizationSection {
    enabled: Option<bool>,
    snapshot_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub flip: bool,
    pub device: Option<u32>,
    pub stream: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub startup_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct TrackingSettings {
    pub max_faces: usize,
    pub h_portion: f32,
    pub v_portion: f32,
    pub face_width: u32,
    pub face_height: u32,
    pub grace_frames: u32,
    pub min_overlap: f32,
}

#[derive(Debug, Clone, Default)]
pub struct DetectorSettings {
    pub classifier: Option<PathBuf>,
    pub landmarks: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RecognitionSettings {
    pub url: Option<String>,
    pub timeout: Duration,
}

/// Present only when both the channel id and the token are configured;
/// either one missing disables notification entirely.
#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub channel_id: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct VisualizationSettings {
    pub enabled: bool,
    pub snapshot_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub video: VideoSettings,
    pub tracking: TrackingSettings,
    pub detector: DetectorSettings,
    pub recognition: RecognitionSettings,
    pub notify: Option<NotifySettings>,
    pub visualization: VisualizationSettings,
}

impl Settings {
    /// Load from a settings file if one is given; otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, StartupError> {
        let file = match path {
            Some(path) => {
                let raw =
                    std::fs::read_to_string(path).map_err(|e| StartupError::Config {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    })?;
                toml::from_str::<SettingsFile>(&raw).map_err(|e| StartupError::Config {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
            }
            None => SettingsFile::default(),
        };
        Ok(Self::from_file(file))
    }

    fn from_file(file: SettingsFile) -> Self {
        let video = file.video.unwrap_or_default();
        let tracking = file.tracking.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let recognition = file.recognition.unwrap_or_default();
        let notify = file.notify.unwrap_or_default();
        let visualization = file.visualization.unwrap_or_default();

        let notify = match (notify.channel_id, notify.token) {
            (Some(channel_id), Some(token))
                if !channel_id.trim().is_empty() && !token.trim().is_empty() =>
            {
                Some(NotifySettings { channel_id, token })
            }
            _ => None,
        };

        Settings {
            video: VideoSettings {
                flip: video.flip.unwrap_or(false),
                device: video.device,
                stream: video.stream.filter(|s| !s.trim().is_empty()),
                width: video.width.unwrap_or(DEFAULT_WIDTH),
                height: video.height.unwrap_or(DEFAULT_HEIGHT),
                fps: video.fps.unwrap_or(DEFAULT_FPS),
                startup_delay: Duration::from_millis(
                    video.startup_delay_ms.unwrap_or(DEFAULT_STARTUP_DELAY_MS),
                ),
            },
            tracking: TrackingSettings {
                max_faces: tracking.max_faces.unwrap_or(DEFAULT_MAX_FACES),
                h_portion: tracking.h_portion.unwrap_or(DEFAULT_H_PORTION),
                v_portion: tracking.v_portion.unwrap_or(DEFAULT_V_PORTION),
                face_width: tracking.face_width.unwrap_or(DEFAULT_FACE_WIDTH),
                face_height: tracking.face_height.unwrap_or(DEFAULT_FACE_HEIGHT),
                grace_frames: tracking.grace_frames.unwrap_or(DEFAULT_GRACE_FRAMES),
                min_overlap: tracking.min_overlap.unwrap_or(DEFAULT_MIN_OVERLAP),
            },
            detector: DetectorSettings {
                classifier: detector.classifier,
                landmarks: detector.landmarks,
            },
            recognition: RecognitionSettings {
                url: recognition.url.filter(|s| !s.trim().is_empty()),
                timeout: Duration::from_secs(
                    recognition
                        .timeout_secs
                        .unwrap_or(DEFAULT_RECOGNITION_TIMEOUT_SECS),
                ),
            },
            notify,
            visualization: VisualizationSettings {
                enabled: visualization.enabled.unwrap_or(false),
                snapshot_dir: visualization
                    .snapshot_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
            },
        }
    }

    /// CLI values win over the settings file.
    pub fn apply_cli(&mut self, args: &Args) {
        if args.device.is_some() {
            self.video.device = args.device;
        }
        if let Some(stream) = &args.stream {
            self.video.stream = Some(stream.clone());
        }
        if let Some(url) = &args.api_url {
            self.recognition.url = Some(url.clone());
        }
        if args.visualization {
            self.visualization.enabled = true;
        }
    }
}
