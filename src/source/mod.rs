// Video ingestion.
//
// The capture worker only sees the `VideoSource` trait; the concrete
// backend is picked at startup from the configured device index or
// stream URL. Open failures are fatal and carry the distinct exit code
// for their source kind.

pub mod mjpeg;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;

use anyhow::Result;
use image::RgbImage;
use tracing::info;

use crate::config::VideoSettings;
use crate::startup::StartupError;

pub trait VideoSource: Send {
    /// Block until the next frame is available.
    fn grab(&mut self) -> Result<RgbImage>;

    fn describe(&self) -> String;
}

/// Resolve the configured source. A device index wins over a stream
/// URL, matching the CLI flag precedence.
pub fn open(settings: &VideoSettings) -> Result<Box<dyn VideoSource>, StartupError> {
    if let Some(device) = settings.device {
        return open_device(device, settings);
    }

    if let Some(url) = &settings.stream {
        let source = open_stream(url, settings)?;
        info!("opened video stream {url}");
        return Ok(source);
    }

    Err(StartupError::NoSource)
}

#[cfg(feature = "v4l2")]
fn open_device(device: u32, settings: &VideoSettings) -> Result<Box<dyn VideoSource>, StartupError> {
    let source = v4l2::DeviceSource::open(device, settings).map_err(|e| StartupError::Device {
        device,
        reason: format!("{e:#}"),
    })?;
    info!("opened video device {device}: {}", source.describe());
    Ok(Box::new(source))
}

#[cfg(not(feature = "v4l2"))]
fn open_device(device: u32, _settings: &VideoSettings) -> Result<Box<dyn VideoSource>, StartupError> {
    Err(StartupError::Device {
        device,
        reason: "built without v4l2 support".to_string(),
    })
}

fn open_stream(url: &str, settings: &VideoSettings) -> Result<Box<dyn VideoSource>, StartupError> {
    if let Some(spec) = url.strip_prefix("synthetic://") {
        let source = synthetic::SyntheticSource::from_spec(spec, settings).map_err(|e| {
            StartupError::Stream {
                url: url.to_string(),
                reason: format!("{e:#}"),
            }
        })?;
        return Ok(Box::new(source));
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        let source = mjpeg::MjpegSource::connect(url).map_err(|e| StartupError::Stream {
            url: url.to_string(),
            reason: format!("{e:#}"),
        })?;
        return Ok(Box::new(source));
    }

    Err(StartupError::Stream {
        url: url.to_string(),
        reason: "unsupported scheme; expected http(s) or synthetic".to_string(),
    })
}
