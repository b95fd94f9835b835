use chrono::{DateTime, Utc};
use image::RgbImage;

/// One captured image. Owned exclusively by whichever stage currently
/// holds it; the orientation transform has already been applied by the
/// capture worker before handoff.
pub struct Frame {
    pub seq: u64,
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(seq: u64, image: RgbImage) -> Self {
        Self {
            seq,
            image,
            captured_at: Utc::now(),
        }
    }
}

/// Oriented face region: center, extent and rotation angle in degrees.
/// Overlap is computed on the axis-aligned hull, which keeps the
/// association deterministic for the small angles detectors report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
    pub angle: f32,
}

impl FaceBox {
    pub fn axis_aligned(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            cx,
            cy,
            width,
            height,
            angle: 0.0,
        }
    }

    /// Grow the box around its center by independent horizontal and
    /// vertical portions, clamped to the frame.
    pub fn scaled(&self, h_portion: f32, v_portion: f32, frame_w: u32, frame_h: u32) -> Self {
        let width = (self.width * h_portion).min(frame_w as f32);
        let height = (self.height * v_portion).min(frame_h as f32);
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        let cx = self.cx.clamp(half_w, frame_w as f32 - half_w);
        let cy = self.cy.clamp(half_h, frame_h as f32 - half_h);
        Self {
            cx,
            cy,
            width,
            height,
            angle: self.angle,
        }
    }

    fn bounds(&self) -> (f32, f32, f32, f32) {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        (
            self.cx - half_w,
            self.cy - half_h,
            self.cx + half_w,
            self.cy + half_h,
        )
    }

    /// Intersection over union of the axis-aligned hulls, in 0..=1.
    pub fn overlap(&self, other: &FaceBox) -> f32 {
        let (ax0, ay0, ax1, ay1) = self.bounds();
        let (bx0, by0, bx1, by1) = other.bounds();
        let ix = (ax1.min(bx1) - ax0.max(bx0)).max(0.0);
        let iy = (ay1.min(by1) - ay0.max(by0)).max(0.0);
        let intersection = ix * iy;
        if intersection <= 0.0 {
            return 0.0;
        }
        let union = self.width * self.height + other.width * other.height - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// Label lifecycle of a tracked slot. `Pending` means a submission for
/// this slot was admitted through the gate and its result has not come
/// back yet.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelState {
    Unlabeled,
    Pending,
    Labeled { label: String, confidence: f64 },
}

impl LabelState {
    pub fn is_unlabeled(&self) -> bool {
        matches!(self, LabelState::Unlabeled)
    }
}

/// A (crop, region) pair emitted by the tracker for an unlabeled slot.
/// Becomes the active ticket if the gate admits it.
#[derive(Clone)]
pub struct RecognitionRequest {
    pub crop: RgbImage,
    pub region: FaceBox,
}

/// Produced exactly once per admitted ticket.
#[derive(Clone)]
pub struct RecognitionResult {
    pub label: String,
    pub confidence: f64,
    pub crop: RgbImage,
    pub region: FaceBox,
}

/// Feedback edge into the tracking thread. Delivered FIFO and handled
/// between frames, so a `Pending` mark always precedes the result for
/// the same ticket.
pub enum TrackerUpdate {
    /// The gate admitted a submission for this region.
    Pending(FaceBox),
    /// The gate timed out waiting for this region's result.
    PendingExpired(FaceBox),
    /// A recognition result to merge onto the matching slot.
    Labeled(RecognitionResult),
}

/// Projection of a result for the notification sink.
pub struct NotifyEvent {
    pub label: String,
    pub confidence: f64,
    pub crop: RgbImage,
}

impl From<&RecognitionResult> for NotifyEvent {
    fn from(res: &RecognitionResult) -> Self {
        Self {
            label: res.label.clone(),
            confidence: res.confidence,
            crop: res.crop.clone(),
        }
    }
}
