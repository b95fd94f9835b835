// Slack notification sink.
//
// Best effort only: a failed post is logged and forgotten, never
// retried, and can never affect the pipeline. Enabled only when both a
// channel id and a bot token are configured.

use std::io::Write;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam::channel::Receiver;
use serde::Deserialize;
use tracing::{info, warn};

use crate::pipeline::types::NotifyEvent;
use crate::recognize::encode_jpeg;

const SLACK_UPLOAD_URL: &str = "https://slack.com/api/files.upload";
const POST_TIMEOUT: Duration = Duration::from_secs(15);

pub trait NotificationSink: Send {
    fn post(&self, event: &NotifyEvent) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct SlackReply {
    ok: bool,
    error: Option<String>,
}

pub struct SlackNotifier {
    agent: ureq::Agent,
    channel_id: String,
    token: String,
    upload_url: String,
}

impl SlackNotifier {
    pub fn new(channel_id: String, token: String) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(POST_TIMEOUT).build(),
            channel_id,
            token,
            upload_url: SLACK_UPLOAD_URL.to_string(),
        }
    }
}

impl NotificationSink for SlackNotifier {
    fn post(&self, event: &NotifyEvent) -> Result<()> {
        let jpeg = encode_jpeg(&event.crop)?;
        let comment = format!(
            "{} recognized with confidence {:.2}",
            event.label, event.confidence
        );
        let boundary = format!("facewatch-{:016x}", std::process::id() as u64);
        let body = multipart_body(
            &boundary,
            &[("channels", &self.channel_id), ("initial_comment", &comment)],
            ("file", "face.jpg", &jpeg),
        );

        let response = self
            .agent
            .post(&self.upload_url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={boundary}"),
            )
            .send_bytes(&body)
            .context("notification post failed")?;

        let reply: SlackReply = response.into_json().context("malformed slack reply")?;
        if !reply.ok {
            return Err(anyhow!(
                "slack rejected the upload: {}",
                reply.error.unwrap_or_else(|| "unknown error".into())
            ));
        }
        Ok(())
    }
}

/// Assemble a multipart/form-data body with text fields and one file part.
fn multipart_body(boundary: &str, fields: &[(&str, &str)], file: (&str, &str, &[u8])) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        let _ = write!(
            body,
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        );
    }
    let (name, filename, bytes) = file;
    let _ = write!(
        body,
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: image/jpeg\r\n\r\n"
    );
    body.extend_from_slice(bytes);
    let _ = write!(body, "\r\n--{boundary}--\r\n");
    body
}

/// Drain notification events, posting each at most once.
pub fn notification_worker(events: Receiver<NotifyEvent>, sink: Box<dyn NotificationSink>) {
    for event in events {
        if let Err(e) = sink.post(&event) {
            warn!("notification for '{}' failed: {e:#}", event.label);
        }
    }
    info!("notification worker finished");
}
