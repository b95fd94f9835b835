// Landmark-based face normalization.
//
// With eye landmarks available, the crop is produced by a similarity
// transform (rotation + uniform scale + translation) that maps the
// detected eye pair onto fixed reference positions, so every crop
// reaches recognition at the same size and orientation. Without
// landmarks, the region is cut out axis-aligned and resized.

use anyhow::{anyhow, Result};
use image::{imageops, Rgb, RgbImage};

use super::{FaceAligner, FaceDetection};

// Reference eye positions inside a 112x112 canonical face, scaled to
// the requested target size.
const REF_SIZE: f32 = 112.0;
const REF_LEFT_EYE: (f32, f32) = (38.3, 51.7);
const REF_RIGHT_EYE: (f32, f32) = (73.5, 51.5);

pub struct SimilarityAligner;

impl SimilarityAligner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SimilarityAligner {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceAligner for SimilarityAligner {
    fn align(
        &self,
        image: &RgbImage,
        detection: &FaceDetection,
        target: (u32, u32),
    ) -> Result<RgbImage> {
        match detection.landmarks {
            Some(landmarks) => warp_by_eyes(image, &landmarks, target),
            None => crop_and_resize(image, detection, target),
        }
    }
}

/// Similarity transform determined by one point pair (the two eyes),
/// expressed as dst = A * src + t with A = [a -b; b a].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Build the transform taking (src_l, src_r) onto (dst_l, dst_r).
    pub(crate) fn from_pairs(
        src_l: (f32, f32),
        src_r: (f32, f32),
        dst_l: (f32, f32),
        dst_r: (f32, f32),
    ) -> Result<Self> {
        // Complex division: (dst_r - dst_l) / (src_r - src_l).
        let (sx, sy) = (src_r.0 - src_l.0, src_r.1 - src_l.1);
        let (dx, dy) = (dst_r.0 - dst_l.0, dst_r.1 - dst_l.1);
        let norm = sx * sx + sy * sy;
        if norm < f32::EPSILON {
            return Err(anyhow!("degenerate eye pair"));
        }
        let a = (dx * sx + dy * sy) / norm;
        let b = (dy * sx - dx * sy) / norm;
        let tx = dst_l.0 - (a * src_l.0 - b * src_l.1);
        let ty = dst_l.1 - (b * src_l.0 + a * src_l.1);
        Ok(Self { a, b, tx, ty })
    }

    #[cfg(test)]
    pub(crate) fn apply(&self, p: (f32, f32)) -> (f32, f32) {
        (
            self.a * p.0 - self.b * p.1 + self.tx,
            self.b * p.0 + self.a * p.1 + self.ty,
        )
    }

    fn inverse_apply(&self, p: (f32, f32)) -> Result<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det < f32::EPSILON {
            return Err(anyhow!("non-invertible transform"));
        }
        let (x, y) = (p.0 - self.tx, p.1 - self.ty);
        Ok(((self.a * x + self.b * y) / det, (self.a * y - self.b * x) / det))
    }
}

fn warp_by_eyes(image: &RgbImage, landmarks: &[f32; 10], target: (u32, u32)) -> Result<RgbImage> {
    let (tw, th) = target;
    let left_eye = (landmarks[0], landmarks[1]);
    let right_eye = (landmarks[2], landmarks[3]);
    let ref_left = (
        REF_LEFT_EYE.0 * tw as f32 / REF_SIZE,
        REF_LEFT_EYE.1 * th as f32 / REF_SIZE,
    );
    let ref_right = (
        REF_RIGHT_EYE.0 * tw as f32 / REF_SIZE,
        REF_RIGHT_EYE.1 * th as f32 / REF_SIZE,
    );

    let transform = Similarity::from_pairs(left_eye, right_eye, ref_left, ref_right)?;

    let mut out = RgbImage::new(tw, th);
    for y in 0..th {
        for x in 0..tw {
            let (sx, sy) = transform.inverse_apply((x as f32, y as f32))?;
            let sx = sx.round() as i64;
            let sy = sy.round() as i64;
            if sx >= 0 && sy >= 0 && (sx as u32) < image.width() && (sy as u32) < image.height() {
                out.put_pixel(x, y, *image.get_pixel(sx as u32, sy as u32));
            } else {
                out.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
    }
    Ok(out)
}

fn crop_and_resize(
    image: &RgbImage,
    detection: &FaceDetection,
    target: (u32, u32),
) -> Result<RgbImage> {
    let region = detection.region;
    let x0 = (region.cx - region.width / 2.0).max(0.0) as u32;
    let y0 = (region.cy - region.height / 2.0).max(0.0) as u32;
    let w = (region.width as u32).max(1).min(image.width().saturating_sub(x0));
    let h = (region.height as u32).max(1).min(image.height().saturating_sub(y0));
    if w == 0 || h == 0 {
        return Err(anyhow!("face region lies outside the frame"));
    }
    let cropped = imageops::crop_imm(image, x0, y0, w, h).to_image();
    Ok(imageops::resize(
        &cropped,
        target.0,
        target.1,
        imageops::FilterType::Triangle,
    ))
}
