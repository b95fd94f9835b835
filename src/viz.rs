// Snapshot writer for visual debugging.
//
// Draws slot outlines onto a copy of the frame and writes it as a JPEG
// next to the process. Strictly best effort: every failure is logged at
// debug level and swallowed, the pipeline never sees one.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use tracing::debug;

use crate::config::VisualizationSettings;
use crate::pipeline::tracker::FaceSlot;
use crate::pipeline::types::{FaceBox, Frame, LabelState};

/// Every Nth frame gets a snapshot; writing all of them would swamp
/// the disk at camera rates.
const SNAPSHOT_STRIDE: u64 = 30;

const UNLABELED: Rgb<u8> = Rgb([220, 40, 40]);
const PENDING: Rgb<u8> = Rgb([220, 200, 40]);
const LABELED: Rgb<u8> = Rgb([40, 220, 40]);

pub struct SnapshotSink {
    dir: PathBuf,
    stride: u64,
}

impl SnapshotSink {
    pub fn new(settings: &VisualizationSettings) -> Self {
        Self {
            dir: settings.snapshot_dir.clone(),
            stride: SNAPSHOT_STRIDE,
        }
    }

    pub fn record(&mut self, frame: &Frame, slots: &[FaceSlot]) {
        if frame.seq % self.stride != 0 {
            return;
        }
        if let Err(e) = self.write_snapshot(frame, slots) {
            debug!("snapshot for frame {} failed: {e:#}", frame.seq);
        }
    }

    fn write_snapshot(&self, frame: &Frame, slots: &[FaceSlot]) -> Result<()> {
        let mut image = frame.image.clone();
        for slot in slots {
            let color = match slot.label {
                LabelState::Unlabeled => UNLABELED,
                LabelState::Pending => PENDING,
                LabelState::Labeled { .. } => LABELED,
            };
            draw_outline(&mut image, &slot.region, color);
        }
        fs::create_dir_all(&self.dir).context("create snapshot dir")?;
        let path = self.dir.join(format!("snapshot_{:08}.jpg", frame.seq));
        image.save(&path).context("write snapshot")?;
        Ok(())
    }
}

/// One-pixel axis-aligned outline, clipped to the image.
fn draw_outline(image: &mut RgbImage, region: &FaceBox, color: Rgb<u8>) {
    let (w, h) = image.dimensions();
    let clip_x = |v: f32| (v.max(0.0) as u32).min(w.saturating_sub(1));
    let clip_y = |v: f32| (v.max(0.0) as u32).min(h.saturating_sub(1));
    let x0 = clip_x(region.cx - region.width / 2.0);
    let x1 = clip_x(region.cx + region.width / 2.0);
    let y0 = clip_y(region.cy - region.height / 2.0);
    let y1 = clip_y(region.cy + region.height / 2.0);

    for x in x0..=x1 {
        image.put_pixel(x, y0, color);
        image.put_pixel(x, y1, color);
    }
    for y in y0..=y1 {
        image.put_pixel(x0, y, color);
        image.put_pixel(x1, y, color);
    }
}
