// MJPEG-over-HTTP stream source.
//
// Frame extraction scans the byte stream for JPEG start/end markers
// rather than parsing the multipart framing, which tolerates the many
// camera firmwares that get the part headers wrong. Each extracted JPEG
// is decoded in memory; nothing touches disk.

use std::io::{BufReader, Read};

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbImage};

use super::VideoSource;

/// Upper bound for a single frame; anything larger means we lost sync.
const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

const SOI: [u8; 2] = [0xff, 0xd8];
const EOI: [u8; 2] = [0xff, 0xd9];

pub struct MjpegSource {
    stream: MjpegStream<Box<dyn Read + Send + Sync + 'static>>,
    url: String,
}

impl MjpegSource {
    pub fn connect(url: &str) -> Result<Self> {
        let response = ureq::get(url).call().context("connect to mjpeg stream")?;
        let content_type = response.header("Content-Type").unwrap_or("").to_string();
        if !content_type.to_ascii_lowercase().contains("multipart") {
            return Err(anyhow!(
                "not an mjpeg stream (Content-Type: {content_type})"
            ));
        }
        Ok(Self {
            stream: MjpegStream::new(response.into_reader()),
            url: url.to_string(),
        })
    }
}

impl VideoSource for MjpegSource {
    fn grab(&mut self) -> Result<RgbImage> {
        let jpeg = self.stream.next_jpeg()?;
        let image = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .context("decode mjpeg frame")?;
        Ok(image.to_rgb8())
    }

    fn describe(&self) -> String {
        format!("mjpeg stream {}", self.url)
    }
}

pub struct MjpegStream<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> MjpegStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Extract the next complete JPEG (SOI through EOI, inclusive).
    pub fn next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut prev = 0u8;
        loop {
            let b = self.read_byte()?;
            if prev == SOI[0] && b == SOI[1] {
                break;
            }
            prev = b;
        }

        let mut frame = vec![SOI[0], SOI[1]];
        let mut prev = 0u8;
        loop {
            let b = self.read_byte()?;
            frame.push(b);
            if prev == EOI[0] && b == EOI[1] {
                return Ok(frame);
            }
            if frame.len() > MAX_JPEG_BYTES {
                return Err(anyhow!("frame exceeds {MAX_JPEG_BYTES} bytes, lost sync"));
            }
            prev = b;
        }
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        let n = self.reader.read(&mut byte).context("read mjpeg stream")?;
        if n == 0 {
            return Err(anyhow!("mjpeg stream ended"));
        }
        Ok(byte[0])
    }
}
