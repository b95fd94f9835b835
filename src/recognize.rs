// Face identification against the external recognition resource.
//
// The worker runs on its own thread, so the network round trip never
// blocks capture or tracking. A failed call is logged and produces no
// result; the gate's timeout is what eventually reopens submissions in
// that case.

use std::io::Cursor;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel::{Receiver, Sender};
use image::{ImageFormat, RgbImage};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::pipeline::types::{RecognitionRequest, RecognitionResult};

#[derive(Debug, Clone)]
pub struct Identity {
    pub label: String,
    pub confidence: f64,
}

pub trait RecognitionBackend: Send {
    fn identify(&self, crop: &RgbImage) -> Result<Identity>;
}

/// Wire format of the identification endpoint's reply.
#[derive(Debug, Deserialize)]
struct IdentifyResponse {
    label: String,
    confidence: f64,
}

pub struct HttpRecognizer {
    agent: ureq::Agent,
    url: String,
}

impl HttpRecognizer {
    pub fn new(url: String, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { agent, url }
    }
}

impl RecognitionBackend for HttpRecognizer {
    fn identify(&self, crop: &RgbImage) -> Result<Identity> {
        let jpeg = encode_jpeg(crop)?;
        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", "image/jpeg")
            .send_bytes(&jpeg)
            .context("identification request failed")?;
        let reply: IdentifyResponse = response
            .into_json()
            .context("malformed identification reply")?;
        Ok(Identity {
            label: reply.label,
            confidence: reply.confidence,
        })
    }
}

pub(crate) fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .context("jpeg encoding failed")?;
    Ok(bytes)
}

/// Identify every admitted ticket, in order, one at a time.
pub fn recognition_worker(
    tickets: Receiver<RecognitionRequest>,
    results: Sender<RecognitionResult>,
    backend: Box<dyn RecognitionBackend>,
) {
    for ticket in tickets {
        match backend.identify(&ticket.crop) {
            Ok(identity) => {
                debug!(
                    "identified '{}' with confidence {:.2}",
                    identity.label, identity.confidence
                );
                let result = RecognitionResult {
                    label: identity.label,
                    confidence: identity.confidence,
                    crop: ticket.crop,
                    region: ticket.region,
                };
                if results.send(result).is_err() {
                    break;
                }
            }
            // No result is emitted for a failed call.
            Err(e) => warn!("identification call failed: {e:#}"),
        }
    }
    info!("recognition worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::FaceBox;
    use crossbeam::channel::unbounded;

    struct Scripted {
        fail_on_label: &'static str,
        label: &'static str,
    }

    impl RecognitionBackend for Scripted {
        fn identify(&self, crop: &RgbImage) -> Result<Identity> {
            // Width doubles as a per-ticket marker in these tests.
            if crop.width() == 1 {
                anyhow::bail!("{}", self.fail_on_label);
            }
            Ok(Identity {
                label: self.label.to_string(),
                confidence: 0.87,
            })
        }
    }

    fn ticket(width: u32) -> RecognitionRequest {
        RecognitionRequest {
            crop: RgbImage::new(width, 4),
            region: FaceBox::axis_aligned(10.0, 10.0, 8.0, 8.0),
        }
    }

    #[test]
    fn reply_wire_format_parses() {
        let reply: IdentifyResponse =
            serde_json::from_str(r#"{"label":"alice","confidence":0.93}"#).unwrap();
        assert_eq!(reply.label, "alice");
        assert!((reply.confidence - 0.93).abs() < 1e-9);
    }

    #[test]
    fn worker_emits_one_result_per_successful_call() {
        let (ticket_tx, ticket_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        ticket_tx.send(ticket(4)).unwrap();
        ticket_tx.send(ticket(1)).unwrap(); // fails
        ticket_tx.send(ticket(8)).unwrap();
        drop(ticket_tx);

        recognition_worker(
            ticket_rx,
            result_tx,
            Box::new(Scripted {
                fail_on_label: "backend down",
                label: "alice",
            }),
        );

        let results: Vec<RecognitionResult> = result_rx.try_iter().collect();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.label == "alice"));
    }

    #[test]
    fn encodes_a_decodable_jpeg() {
        let image = RgbImage::new(16, 12);
        let jpeg = encode_jpeg(&image).unwrap();
        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.width(), 16);
        assert_eq!(decoded.height(), 12);
    }
}
