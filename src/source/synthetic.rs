// Synthetic frame source for bring-up and tests.
//
// Produces dark frames with one bright square drifting across the
// image, sized so the bright-spot detector picks it up. Selected with a
// `synthetic://` stream URL; an optional `WxH` spec overrides the
// configured geometry.

use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use super::VideoSource;
use crate::config::VideoSettings;

const SQUARE: u32 = 48;

pub struct SyntheticSource {
    width: u32,
    height: u32,
    interval: Duration,
    seq: u64,
}

impl SyntheticSource {
    pub fn from_spec(spec: &str, settings: &VideoSettings) -> Result<Self> {
        let (width, height) = match spec {
            "" => (settings.width, settings.height),
            spec => {
                let (w, h) = spec
                    .split_once('x')
                    .ok_or_else(|| anyhow!("expected WxH, got '{spec}'"))?;
                (w.parse()?, h.parse()?)
            }
        };
        if width < SQUARE || height < SQUARE {
            return Err(anyhow!("synthetic frame must be at least {SQUARE}px"));
        }
        let fps = settings.fps.max(1);
        Ok(Self {
            width,
            height,
            interval: Duration::from_millis(1000 / fps as u64),
            seq: 0,
        })
    }
}

impl VideoSource for SyntheticSource {
    fn grab(&mut self) -> Result<RgbImage> {
        thread::sleep(self.interval);
        let mut image = RgbImage::from_pixel(self.width, self.height, Rgb([24, 24, 24]));
        // The drift range collapses to a fixed position when an axis
        // exactly fits the square.
        let x0 = (self.seq * 3) as u32 % (self.width - SQUARE).max(1);
        let y0 = (self.seq * 2) as u32 % (self.height - SQUARE).max(1);
        for y in y0..y0 + SQUARE {
            for x in x0..x0 + SQUARE {
                image.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        self.seq += 1;
        Ok(image)
    }

    fn describe(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }
}
