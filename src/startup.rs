// Fatal startup failures and their process exit codes.
//
// Each variant maps to a distinct, documented exit status so supervisors
// can tell the failure modes apart. Nothing here is recoverable: every
// variant is reported and the process exits before the pipeline starts.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("can not create log file {path}: {reason}")]
    LogFile { path: PathBuf, reason: String },

    #[error("can not open video device {device}: {reason}")]
    Device { device: u32, reason: String },

    #[error("can not open video stream {url}: {reason}")]
    Stream { url: String, reason: String },

    #[error("video source has not been selected")]
    NoSource,

    #[error("can not load face classifier resource {0}")]
    DetectorResource(PathBuf),

    #[error("can not load face landmark predictor resource {0}")]
    LandmarkResource(PathBuf),

    #[error("identification resource location has not been provided")]
    NoEndpoint,

    #[error("invalid settings file {path}: {reason}")]
    Config { path: PathBuf, reason: String },
}

impl StartupError {
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::LogFile { .. } => 1,
            StartupError::Device { .. } => 2,
            StartupError::Stream { .. } => 3,
            StartupError::NoSource => 4,
            StartupError::DetectorResource(_) => 5,
            StartupError::LandmarkResource(_) => 6,
            StartupError::NoEndpoint => 7,
            StartupError::Config { .. } => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let errors = [
            StartupError::LogFile {
                path: "x.log".into(),
                reason: String::new(),
            },
            StartupError::Device {
                device: 0,
                reason: String::new(),
            },
            StartupError::Stream {
                url: String::new(),
                reason: String::new(),
            },
            StartupError::NoSource,
            StartupError::DetectorResource("c.xml".into()),
            StartupError::LandmarkResource("l.dat".into()),
            StartupError::NoEndpoint,
            StartupError::Config {
                path: "f.toml".into(),
                reason: String::new(),
            },
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|c| *c > 0));
    }
}
