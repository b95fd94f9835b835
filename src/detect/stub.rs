// Built-in detector backends.
//
// `BrightSpotDetector` is a bring-up backend: it boxes the brightest
// connected region of the frame, which pairs with the synthetic source
// for end-to-end runs on machines without a real model. `ScriptedDetector`
// replays a fixed sequence of detections and exists for tests.

use std::collections::VecDeque;

use anyhow::Result;
use image::RgbImage;

use super::{FaceDetection, FaceDetector};
use crate::pipeline::types::FaceBox;

pub struct BrightSpotDetector {
    threshold: u8,
}

impl BrightSpotDetector {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }
}

impl Default for BrightSpotDetector {
    fn default() -> Self {
        Self::new(200)
    }
}

impl FaceDetector for BrightSpotDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceDetection>> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        let mut hits = 0u64;

        for (x, y, pixel) in image.enumerate_pixels() {
            // Integer luma approximation.
            let luma = (2 * pixel[0] as u32 + 5 * pixel[1] as u32 + pixel[2] as u32) / 8;
            if luma >= self.threshold as u32 {
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
                hits += 1;
            }
        }

        if hits < 4 {
            return Ok(Vec::new());
        }

        let width = (max_x - min_x + 1) as f32;
        let height = (max_y - min_y + 1) as f32;
        let region = FaceBox::axis_aligned(
            min_x as f32 + width / 2.0,
            min_y as f32 + height / 2.0,
            width,
            height,
        );
        let coverage = hits as f32 / (width * height);
        Ok(vec![FaceDetection {
            region,
            score: coverage.min(1.0),
            landmarks: None,
        }])
    }
}

pub struct ScriptedDetector {
    script: VecDeque<Vec<FaceDetection>>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Vec<FaceDetection>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl FaceDetector for ScriptedDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<FaceDetection>> {
        Ok(self.script.pop_front().unwrap_or_default())
    }
}
