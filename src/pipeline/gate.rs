// Single-slot admission control between tracking and recognition.
//
// Two states: Open (no ticket outstanding) and Locked (one ticket
// outstanding). Submissions while Locked are shed, not queued; only the
// most recently admitted face is awaiting recognition at any time.
// `release` reopens unconditionally regardless of which face the result
// was for; the gate carries no ticket identity. A bounded timeout
// force-releases the gate when a result never arrives, otherwise a
// failed recognition call would wedge the pipeline permanently.

use std::time::{Duration, Instant};

use super::types::{FaceBox, RecognitionRequest};

pub enum Admission {
    /// The submission became the active ticket; forward it.
    Admitted(RecognitionRequest),
    /// The gate was locked; the submission is dropped. Expected
    /// steady-state behavior, not an error.
    Shed,
}

struct Outstanding {
    region: FaceBox,
    since: Instant,
}

pub struct SubmissionGate {
    outstanding: Option<Outstanding>,
    timeout: Duration,
}

impl SubmissionGate {
    pub fn new(timeout: Duration) -> Self {
        Self {
            outstanding: None,
            timeout,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.outstanding.is_some()
    }

    pub fn submit(&mut self, request: RecognitionRequest, now: Instant) -> Admission {
        if self.outstanding.is_some() {
            return Admission::Shed;
        }
        self.outstanding = Some(Outstanding {
            region: request.region,
            since: now,
        });
        Admission::Admitted(request)
    }

    /// Locked -> Open, no matter whose result arrived. Calling while
    /// already Open is a no-op. Returns whether a ticket was cleared.
    pub fn release(&mut self) -> bool {
        self.outstanding.take().is_some()
    }

    /// Force-release an expired ticket, returning its region so the
    /// tracker can clear the matching pending mark.
    pub fn poll_timeout(&mut self, now: Instant) -> Option<FaceBox> {
        match &self.outstanding {
            Some(ticket) if now.duration_since(ticket.since) >= self.timeout => {
                let region = ticket.region;
                self.outstanding = None;
                Some(region)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn request(cx: f32) -> RecognitionRequest {
        RecognitionRequest {
            crop: RgbImage::new(4, 4),
            region: FaceBox::axis_aligned(cx, 10.0, 10.0, 10.0),
        }
    }

    #[test]
    fn starts_open_and_locks_on_submit() {
        let mut gate = SubmissionGate::new(Duration::from_secs(10));
        assert!(!gate.is_locked());
        assert!(matches!(
            gate.submit(request(1.0), Instant::now()),
            Admission::Admitted(_)
        ));
        assert!(gate.is_locked());
    }

    #[test]
    fn sheds_while_locked() {
        let mut gate = SubmissionGate::new(Duration::from_secs(10));
        let now = Instant::now();
        let _ = gate.submit(request(1.0), now);
        assert!(matches!(gate.submit(request(2.0), now), Admission::Shed));
        // Shedding leaves the state unchanged.
        assert!(gate.is_locked());
    }

    #[test]
    fn release_reopens_and_is_idempotent() {
        let mut gate = SubmissionGate::new(Duration::from_secs(10));
        let _ = gate.submit(request(1.0), Instant::now());
        assert!(gate.release());
        assert!(!gate.is_locked());
        // Release while Open is a no-op.
        assert!(!gate.release());
        assert!(!gate.is_locked());
    }

    #[test]
    fn reopens_after_release_for_new_submissions() {
        let mut gate = SubmissionGate::new(Duration::from_secs(10));
        let now = Instant::now();
        let _ = gate.submit(request(1.0), now);
        gate.release();
        assert!(matches!(gate.submit(request(2.0), now), Admission::Admitted(_)));
    }

    #[test]
    fn times_out_an_abandoned_ticket() {
        let mut gate = SubmissionGate::new(Duration::from_secs(5));
        let t0 = Instant::now();
        let _ = gate.submit(request(7.0), t0);
        assert!(gate.poll_timeout(t0 + Duration::from_secs(4)).is_none());
        let region = gate.poll_timeout(t0 + Duration::from_secs(5)).unwrap();
        assert_eq!(region.cx, 7.0);
        assert!(!gate.is_locked());
    }

    #[test]
    fn poll_timeout_is_a_noop_while_open() {
        let mut gate = SubmissionGate::new(Duration::from_secs(5));
        assert!(gate.poll_timeout(Instant::now()).is_none());
    }
}
