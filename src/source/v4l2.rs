// Local camera capture through the v4l2 API.
//
// The driver gets first say on geometry: we ask for the configured
// size in RGB3, fall back to YUYV, and finally accept whatever format
// the device insists on, converting to RGB in software.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use tracing::{debug, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use super::VideoSource;
use crate::config::VideoSettings;

pub struct DeviceSource {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    fourcc: FourCC,
    index: u32,
}

impl DeviceSource {
    pub fn open(index: u32, settings: &VideoSettings) -> Result<Self> {
        let dev = Device::new(index as usize).context("open video device")?;

        let mut fmt = dev.format().context("query device format")?;
        let desired = Format::new(settings.width, settings.height, FourCC::new(b"RGB3"));
        fmt = dev.set_format(&desired).unwrap_or(fmt);
        if fmt.fourcc != FourCC::new(b"RGB3") {
            let yuyv = Format::new(settings.width, settings.height, FourCC::new(b"YUYV"));
            fmt = dev.set_format(&yuyv).unwrap_or(fmt);
        }
        if let Err(e) = dev.set_params(&Parameters::with_fps(settings.fps)) {
            warn!("device {index} refused {} fps: {e}", settings.fps);
        }

        let (width, height, fourcc) = (fmt.width, fmt.height, fmt.fourcc);
        let stream =
            Stream::with_buffers(&dev, Type::VideoCapture, 4).context("start capture stream")?;
        Ok(Self {
            stream,
            width,
            height,
            fourcc,
            index,
        })
    }
}

impl VideoSource for DeviceSource {
    fn grab(&mut self) -> Result<RgbImage> {
        let (data, meta) = self.stream.next().context("dequeue capture buffer")?;
        debug!(
            "device frame seq={} fourcc={} len={}",
            meta.sequence,
            self.fourcc,
            data.len()
        );

        let rgb = match self.fourcc {
            f if f == FourCC::new(b"RGB3") => data.to_vec(),
            f if f == FourCC::new(b"YUYV") => yuyv_to_rgb(self.width, self.height, data)?,
            f if f == FourCC::new(b"GREY") => grey_to_rgb(self.width, self.height, data)?,
            other => return Err(anyhow!("unsupported pixel format {other}")),
        };

        let expected = (self.width * self.height * 3) as usize;
        if rgb.len() < expected {
            return Err(anyhow!(
                "short frame buffer: {} bytes, expected {expected}",
                rgb.len()
            ));
        }

        RgbImage::from_raw(self.width, self.height, rgb[..expected].to_vec())
            .ok_or_else(|| anyhow!("frame buffer did not form an image"))
    }

    fn describe(&self) -> String {
        format!(
            "v4l2 device {} {}x{} {}",
            self.index, self.width, self.height, self.fourcc
        )
    }
}

fn yuyv_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        return Err(anyhow!("short YUYV buffer: {} bytes", data.len()));
    }
    let mut out = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let u = chunk[1] as i32 - 128;
        let v = chunk[3] as i32 - 128;
        for &y in &[chunk[0], chunk[2]] {
            let y = y as i32;
            out.push(clamp(y + (359 * v >> 8)));
            out.push(clamp(y - (88 * u >> 8) - (183 * v >> 8)));
            out.push(clamp(y + (454 * u >> 8)));
        }
    }
    Ok(out)
}

fn grey_to_rgb(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let expected = (width * height) as usize;
    if data.len() < expected {
        return Err(anyhow!("short GREY buffer: {} bytes", data.len()));
    }
    let mut out = Vec::with_capacity(expected * 3);
    for &y in &data[..expected] {
        out.extend_from_slice(&[y, y, y]);
    }
    Ok(out)
}

fn clamp(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}
