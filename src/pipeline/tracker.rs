// Multi-face tracking across frames.
//
// The tracker owns the slot table and is the only thing that mutates
// it; everything else talks to it through the tracking thread's
// channels. Per frame it runs the detector, associates detections to
// existing slots by maximal region overlap, ages out slots that miss
// for longer than the grace period, and emits a recognition request for
// every slot still unlabeled. Label state flows back in as
// `TrackerUpdate` messages.

use crossbeam::channel::{never, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::TrackingSettings;
use crate::detect::{FaceAligner, FaceDetection, FaceDetector};
use crate::viz::SnapshotSink;

use super::handoff::HandoffReceiver;
use super::types::{FaceBox, Frame, LabelState, RecognitionRequest, RecognitionResult, TrackerUpdate};

pub struct FaceSlot {
    /// Stable while the same physical face persists; never reused.
    pub id: u64,
    pub region: FaceBox,
    pub label: LabelState,
    misses: u32,
}

pub struct FaceTracker {
    settings: TrackingSettings,
    detector: Box<dyn FaceDetector>,
    aligner: Box<dyn FaceAligner>,
    slots: Vec<FaceSlot>,
    next_slot_id: u64,
}

impl FaceTracker {
    pub fn new(
        settings: TrackingSettings,
        detector: Box<dyn FaceDetector>,
        aligner: Box<dyn FaceAligner>,
    ) -> Self {
        Self {
            settings,
            detector,
            aligner,
            slots: Vec::new(),
            next_slot_id: 0,
        }
    }

    pub fn slots(&self) -> &[FaceSlot] {
        &self.slots
    }

    /// Consume one frame: detect, associate, expire, and emit a
    /// recognition request per unlabeled slot seen this frame.
    pub fn process_frame(&mut self, frame: &Frame) -> Vec<RecognitionRequest> {
        let detections = match self.detector.detect(&frame.image) {
            Ok(detections) => detections,
            Err(e) => {
                // A single frame's detection failure is transient: log,
                // age the slots, move on.
                warn!("face detection failed on frame {}: {e:#}", frame.seq);
                self.age_and_expire(&[]);
                return Vec::new();
            }
        };

        let (frame_w, frame_h) = frame.image.dimensions();
        let mut detections: Vec<FaceDetection> = detections
            .into_iter()
            .map(|mut det| {
                det.region = det.region.scaled(
                    self.settings.h_portion,
                    self.settings.v_portion,
                    frame_w,
                    frame_h,
                );
                det
            })
            .collect();
        // Rank by detector score; overflow beyond the slot cap rejects
        // the weakest detections, deterministically.
        detections.sort_by(|a, b| b.score.total_cmp(&a.score));
        detections.truncate(self.settings.max_faces);

        let mut matched_ids: Vec<u64> = Vec::with_capacity(detections.len());
        let mut seen: Vec<(u64, FaceDetection)> = Vec::with_capacity(detections.len());

        for det in detections {
            let best = self
                .slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| !matched_ids.contains(&slot.id))
                .map(|(i, slot)| (i, slot.region.overlap(&det.region)))
                .filter(|(_, overlap)| *overlap >= self.settings.min_overlap)
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(i, _)| i);

            match best {
                Some(i) => {
                    let slot = &mut self.slots[i];
                    slot.region = det.region;
                    slot.misses = 0;
                    matched_ids.push(slot.id);
                    seen.push((slot.id, det));
                }
                None if self.slots.len() < self.settings.max_faces => {
                    let id = self.next_slot_id;
                    self.next_slot_id += 1;
                    self.slots.push(FaceSlot {
                        id,
                        region: det.region,
                        label: LabelState::Unlabeled,
                        misses: 0,
                    });
                    matched_ids.push(id);
                    seen.push((id, det));
                }
                None => {
                    debug!("slot table full, rejecting detection at {:?}", det.region);
                }
            }
        }

        self.age_and_expire(&matched_ids);

        let mut requests = Vec::new();
        for (slot_id, det) in &seen {
            let Some(slot) = self.slots.iter().find(|s| s.id == *slot_id) else {
                continue;
            };
            if !slot.label.is_unlabeled() {
                continue;
            }
            let target = (self.settings.face_width, self.settings.face_height);
            match self.aligner.align(&frame.image, det, target) {
                Ok(crop) => requests.push(RecognitionRequest {
                    crop,
                    region: slot.region,
                }),
                Err(e) => debug!("face alignment failed on frame {}: {e:#}", frame.seq),
            }
        }
        requests
    }

    fn age_and_expire(&mut self, matched_ids: &[u64]) {
        let grace = self.settings.grace_frames;
        for slot in &mut self.slots {
            if !matched_ids.contains(&slot.id) {
                slot.misses += 1;
            }
        }
        self.slots.retain(|slot| {
            let keep = slot.misses <= grace;
            if !keep {
                debug!("freeing slot {} after {} missed frames", slot.id, slot.misses);
            }
            keep
        });
    }

    /// Feedback from the router, handled between frames.
    pub fn apply_update(&mut self, update: TrackerUpdate) {
        match update {
            TrackerUpdate::Pending(region) => self.mark_pending(&region),
            TrackerUpdate::PendingExpired(region) => self.clear_pending(&region),
            TrackerUpdate::Labeled(result) => self.apply_label(result),
        }
    }

    fn best_overlap_index(
        &self,
        region: &FaceBox,
        predicate: impl Fn(&FaceSlot) -> bool,
    ) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| predicate(slot))
            .map(|(i, slot)| (i, slot.region.overlap(region)))
            .filter(|(_, overlap)| *overlap > 0.0)
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
    }

    fn mark_pending(&mut self, region: &FaceBox) {
        if let Some(i) = self.best_overlap_index(region, |s| s.label.is_unlabeled()) {
            self.slots[i].label = LabelState::Pending;
        }
    }

    fn clear_pending(&mut self, region: &FaceBox) {
        if let Some(i) = self.best_overlap_index(region, |s| s.label == LabelState::Pending) {
            self.slots[i].label = LabelState::Unlabeled;
        }
    }

    /// Merge a recognition result onto the slot whose region matches it
    /// best. A result that matches no live slot is dropped silently:
    /// the face may have left the frame before the answer came back.
    fn apply_label(&mut self, result: RecognitionResult) {
        match self.best_overlap_index(&result.region, |_| true) {
            Some(i) => {
                let slot = &mut self.slots[i];
                debug!(
                    "slot {} labeled '{}' ({:.2})",
                    slot.id, result.label, result.confidence
                );
                slot.label = LabelState::Labeled {
                    label: result.label,
                    confidence: result.confidence,
                };
            }
            None => {
                debug!("recognition result matched no live slot, dropping");
                // This result answered the outstanding ticket, so any
                // pending mark it left behind is now stale. The ticket's
                // face may have drifted away from its submitted region;
                // without this the slot would stay Pending forever and
                // never resubmit.
                for slot in &mut self.slots {
                    if slot.label == LabelState::Pending {
                        debug!("slot {} back to unlabeled, its ticket went astray", slot.id);
                        slot.label = LabelState::Unlabeled;
                    }
                }
            }
        }
    }
}

/// Tracking thread body. Frames come in over the synchronous handoff
/// and label feedback over the updates channel; recognition requests go
/// out to the router. The capture worker stays blocked for the whole
/// per-frame pass, including the snapshot write.
pub fn tracking_worker(
    frames: HandoffReceiver<Frame>,
    mut updates: Receiver<TrackerUpdate>,
    requests: Sender<RecognitionRequest>,
    mut tracker: FaceTracker,
    mut snapshots: Option<SnapshotSink>,
) {
    loop {
        crossbeam::select! {
            recv(frames.inbox()) -> msg => match msg {
                Ok(frame) => {
                    debug!("frame {} captured at {}", frame.seq, frame.captured_at);
                    for request in tracker.process_frame(&frame) {
                        // The router going away means we are shutting
                        // down; keep draining frames until the handoff
                        // closes too.
                        let _ = requests.send(request);
                    }
                    if let Some(sink) = snapshots.as_mut() {
                        sink.record(&frame, tracker.slots());
                    }
                    frames.complete();
                }
                Err(_) => break,
            },
            recv(updates) -> msg => match msg {
                Ok(update) => tracker.apply_update(update),
                Err(_) => updates = never(),
            },
        }
    }
    info!("tracking worker finished");
}
