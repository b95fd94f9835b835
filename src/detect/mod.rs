// Face detection and alignment seams.
//
// The actual detection and landmark models are external, pre-built
// resources; the pipeline only depends on these traits. Startup verifies
// the configured resource files exist so a missing model fails fast with
// its own exit code instead of surfacing mid-stream.

pub mod align;
pub mod stub;

use anyhow::Result;
use image::RgbImage;

use crate::config::DetectorSettings;
use crate::pipeline::types::FaceBox;
use crate::startup::StartupError;

pub use align::SimilarityAligner;
pub use stub::{BrightSpotDetector, ScriptedDetector};

/// One detected face. Landmarks, when the detector provides them, are
/// five points as x,y pairs: left eye, right eye, nose, left mouth
/// corner, right mouth corner.
#[derive(Debug, Clone)]
pub struct FaceDetection {
    pub region: FaceBox,
    pub score: f32,
    pub landmarks: Option<[f32; 10]>,
}

pub trait FaceDetector: Send {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceDetection>>;
}

pub trait FaceAligner: Send {
    /// Produce the canonical-size, canonical-orientation crop for a
    /// detection, suitable for recognition.
    fn align(
        &self,
        image: &RgbImage,
        detection: &FaceDetection,
        target: (u32, u32),
    ) -> Result<RgbImage>;
}

/// Verify the configured pre-built resources are present.
pub fn check_resources(settings: &DetectorSettings) -> Result<(), StartupError> {
    if let Some(classifier) = &settings.classifier {
        if !classifier.is_file() {
            return Err(StartupError::DetectorResource(classifier.clone()));
        }
    }
    if let Some(landmarks) = &settings.landmarks {
        if !landmarks.is_file() {
            return Err(StartupError::LandmarkResource(landmarks.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_classifier_has_its_own_exit_code() {
        let settings = DetectorSettings {
            classifier: Some("does/not/exist.xml".into()),
            landmarks: None,
        };
        let err = check_resources(&settings).unwrap_err();
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn missing_landmarks_has_its_own_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = dir.path().join("cascade.xml");
        std::fs::write(&classifier, "<cascade/>").unwrap();
        let settings = DetectorSettings {
            classifier: Some(classifier),
            landmarks: Some("does/not/exist.dat".into()),
        };
        let err = check_resources(&settings).unwrap_err();
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn unconfigured_resources_pass() {
        assert!(check_resources(&DetectorSettings::default()).is_ok());
    }
}
