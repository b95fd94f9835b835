// Pipeline wiring: builds the channel graph and spawns one thread per
// stage.
//
//   capture --(sync handoff)--> tracking --> router --> recognition
//                                  ^            |           |
//                                  +-- updates -+-- results-+
//                                               +--> notifier
//
// Shutdown is a cascade of channel disconnects. The stop flag only
// stops the capture worker; every downstream stage exits when its
// inputs close, so nothing in flight is dropped on the floor.

pub mod capture;
pub mod gate;
pub mod handoff;
pub mod router;
pub mod tracker;
pub mod types;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::unbounded;
use tracing::{error, info};

use crate::config::Settings;
use crate::detect::{FaceAligner, FaceDetector};
use crate::notify::{notification_worker, NotificationSink};
use crate::recognize::{recognition_worker, RecognitionBackend};
use crate::source::VideoSource;
use crate::viz::SnapshotSink;

use capture::capture_worker;
use gate::SubmissionGate;
use handoff::sync_handoff;
use router::router_worker;
use tracker::{tracking_worker, FaceTracker};
use types::Frame;

pub struct PipelineHandles {
    workers: Vec<(&'static str, JoinHandle<()>)>,
}

impl PipelineHandles {
    fn spawn(&mut self, name: &'static str, body: impl FnOnce() + Send + 'static) {
        self.workers.push((
            name,
            thread::spawn(move || {
                info!("{name} worker started");
                body();
            }),
        ));
    }

    /// Block until every stage has exited.
    pub fn join(self) {
        for (name, handle) in self.workers {
            if handle.join().is_err() {
                error!("{name} worker panicked");
            }
        }
    }
}

pub fn start(
    source: Box<dyn VideoSource>,
    detector: Box<dyn FaceDetector>,
    aligner: Box<dyn FaceAligner>,
    backend: Box<dyn RecognitionBackend>,
    sink: Option<Box<dyn NotificationSink>>,
    settings: &Settings,
    running: Arc<AtomicBool>,
) -> PipelineHandles {
    let (frame_tx, frame_rx) = sync_handoff::<Frame>();
    let (request_tx, request_rx) = unbounded();
    let (update_tx, update_rx) = unbounded();
    let (ticket_tx, ticket_rx) = unbounded();
    let (result_tx, result_rx) = unbounded();

    let mut handles = PipelineHandles {
        workers: Vec::new(),
    };

    let flip = settings.video.flip;
    let startup_delay = settings.video.startup_delay;
    handles.spawn("capture", move || {
        capture_worker(source, frame_tx, flip, startup_delay, running)
    });

    let tracker = FaceTracker::new(settings.tracking.clone(), detector, aligner);
    let snapshots = settings
        .visualization
        .enabled
        .then(|| SnapshotSink::new(&settings.visualization));
    handles.spawn("tracking", move || {
        tracking_worker(frame_rx, update_rx, request_tx, tracker, snapshots)
    });

    let notify_tx = match sink {
        Some(sink) => {
            let (notify_tx, notify_rx) = unbounded();
            handles.spawn("notifier", move || notification_worker(notify_rx, sink));
            Some(notify_tx)
        }
        None => None,
    };

    let gate = SubmissionGate::new(settings.recognition.timeout);
    handles.spawn("router", move || {
        router_worker(request_rx, result_rx, ticket_tx, update_tx, notify_tx, gate)
    });

    handles.spawn("recognition", move || {
        recognition_worker(ticket_rx, result_tx, backend)
    });

    handles
}
