// Result router: the only thread that touches the submission gate.
//
// Requests from the tracking thread race results from the recognition
// thread; the router serializes both against the gate and fans each
// result out to the tracker and the notification sink. A periodic tick
// expires tickets whose result never came back.

use std::time::{Duration, Instant};

use crossbeam::channel::{never, Receiver, Sender};
use tracing::{debug, info, warn};

use super::gate::{Admission, SubmissionGate};
use super::types::{NotifyEvent, RecognitionRequest, RecognitionResult, TrackerUpdate};

const TICK: Duration = Duration::from_millis(250);

pub fn router_worker(
    mut requests: Receiver<RecognitionRequest>,
    mut results: Receiver<RecognitionResult>,
    tickets: Sender<RecognitionRequest>,
    updates: Sender<TrackerUpdate>,
    notify: Option<Sender<NotifyEvent>>,
    mut gate: SubmissionGate,
) {
    // Held in an Option so it can be dropped mid-loop: closing the
    // ticket channel is what lets the recognition worker drain and exit.
    let mut tickets = Some(tickets);
    let mut requests_open = true;
    let mut results_open = true;

    while requests_open || results_open {
        crossbeam::select! {
            recv(requests) -> msg => match msg {
                Ok(request) => match gate.submit(request, Instant::now()) {
                    Admission::Admitted(request) => {
                        debug!("admitted submission at {:?}", request.region);
                        // Pending mark first: it shares a FIFO channel
                        // with the eventual result, so the tracker can
                        // never see them out of order.
                        let _ = updates.send(TrackerUpdate::Pending(request.region));
                        if let Some(tx) = &tickets {
                            if let Err(e) = tx.send(request) {
                                // Recognizer is gone; undo the
                                // admission so the slot can resubmit.
                                gate.release();
                                let _ = updates
                                    .send(TrackerUpdate::PendingExpired(e.0.region));
                            }
                        }
                    }
                    // Normal steady state while a ticket is out.
                    Admission::Shed => {}
                },
                Err(_) => {
                    requests_open = false;
                    requests = never();
                    tickets = None;
                }
            },
            recv(results) -> msg => match msg {
                Ok(result) => {
                    if !gate.release() {
                        debug!("result for '{}' arrived after its ticket expired", result.label);
                    }
                    if let Some(tx) = &notify {
                        let _ = tx.send(NotifyEvent::from(&result));
                    }
                    let _ = updates.send(TrackerUpdate::Labeled(result));
                }
                Err(_) => {
                    results_open = false;
                    results = never();
                }
            },
            // Idle fallback only; expiry is checked after every
            // message as well, or steady request traffic would keep
            // this arm from ever running.
            default(TICK) => {}
        }
        if let Some(region) = gate.poll_timeout(Instant::now()) {
            warn!("recognition ticket timed out, reopening submissions");
            let _ = updates.send(TrackerUpdate::PendingExpired(region));
        }
    }
    info!("router finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::FaceBox;
    use crossbeam::channel::unbounded;
    use image::RgbImage;
    use std::thread;

    struct Harness {
        requests: Sender<RecognitionRequest>,
        results: Sender<RecognitionResult>,
        tickets: Receiver<RecognitionRequest>,
        updates: Receiver<TrackerUpdate>,
        notify: Receiver<NotifyEvent>,
        handle: thread::JoinHandle<()>,
    }

    fn spawn_router(timeout: Duration) -> Harness {
        let (request_tx, request_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();
        let (ticket_tx, ticket_rx) = unbounded();
        let (update_tx, update_rx) = unbounded();
        let (notify_tx, notify_rx) = unbounded();
        let handle = thread::spawn(move || {
            router_worker(
                request_rx,
                result_rx,
                ticket_tx,
                update_tx,
                Some(notify_tx),
                SubmissionGate::new(timeout),
            );
        });
        Harness {
            requests: request_tx,
            results: result_tx,
            tickets: ticket_rx,
            updates: update_rx,
            notify: notify_rx,
            handle,
        }
    }

    fn request(cx: f32) -> RecognitionRequest {
        RecognitionRequest {
            crop: RgbImage::new(4, 4),
            region: FaceBox::axis_aligned(cx, 50.0, 20.0, 20.0),
        }
    }

    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn admits_one_sheds_the_rest_and_reopens_on_result() {
        let h = spawn_router(Duration::from_secs(30));

        h.requests.send(request(100.0)).unwrap();
        let ticket = h.tickets.recv_timeout(WAIT).unwrap();
        assert_eq!(ticket.region.cx, 100.0);
        assert!(matches!(
            h.updates.recv_timeout(WAIT).unwrap(),
            TrackerUpdate::Pending(r) if r.cx == 100.0
        ));

        // Second face while the ticket is out: shed, nothing forwarded.
        h.requests.send(request(300.0)).unwrap();
        assert!(h.tickets.recv_timeout(Duration::from_millis(100)).is_err());

        h.results
            .send(RecognitionResult {
                label: "alice".into(),
                confidence: 0.93,
                crop: RgbImage::new(4, 4),
                region: ticket.region,
            })
            .unwrap();

        let event = h.notify.recv_timeout(WAIT).unwrap();
        assert_eq!(event.label, "alice");
        assert!(matches!(
            h.updates.recv_timeout(WAIT).unwrap(),
            TrackerUpdate::Labeled(r) if r.label == "alice"
        ));

        // Gate reopened: the shed face gets through on resubmission.
        h.requests.send(request(300.0)).unwrap();
        assert_eq!(h.tickets.recv_timeout(WAIT).unwrap().region.cx, 300.0);

        drop(h.requests);
        drop(h.results);
        h.handle.join().unwrap();
    }

    #[test]
    fn expires_a_ticket_whose_result_never_comes() {
        let h = spawn_router(Duration::from_millis(100));

        h.requests.send(request(100.0)).unwrap();
        let _ = h.tickets.recv_timeout(WAIT).unwrap();
        assert!(matches!(
            h.updates.recv_timeout(WAIT).unwrap(),
            TrackerUpdate::Pending(_)
        ));

        // No result arrives; the periodic tick must reopen the gate.
        assert!(matches!(
            h.updates.recv_timeout(WAIT).unwrap(),
            TrackerUpdate::PendingExpired(r) if r.cx == 100.0
        ));

        h.requests.send(request(100.0)).unwrap();
        assert!(h.tickets.recv_timeout(WAIT).is_ok());

        drop(h.requests);
        drop(h.results);
        h.handle.join().unwrap();
    }

    #[test]
    fn timeout_fires_despite_steady_request_traffic() {
        let h = spawn_router(Duration::from_millis(150));

        h.requests.send(request(100.0)).unwrap();
        let _ = h.tickets.recv_timeout(WAIT).unwrap();
        assert!(matches!(
            h.updates.recv_timeout(WAIT).unwrap(),
            TrackerUpdate::Pending(_)
        ));

        // A second face keeps resubmitting faster than the idle tick,
        // so expiry must be detected between messages, not only when
        // the router goes quiet.
        let mut expired = false;
        for _ in 0..100 {
            h.requests.send(request(300.0)).unwrap();
            thread::sleep(Duration::from_millis(20));
            if let Ok(TrackerUpdate::PendingExpired(r)) = h.updates.try_recv() {
                assert_eq!(r.cx, 100.0);
                expired = true;
                break;
            }
        }
        assert!(expired, "ticket expiry starved by request traffic");

        drop(h.requests);
        drop(h.results);
        h.handle.join().unwrap();
    }

    #[test]
    fn lost_recognizer_reverts_the_admission() {
        let h = spawn_router(Duration::from_secs(30));
        drop(h.tickets);

        h.requests.send(request(100.0)).unwrap();
        assert!(matches!(
            h.updates.recv_timeout(WAIT).unwrap(),
            TrackerUpdate::Pending(r) if r.cx == 100.0
        ));
        assert!(matches!(
            h.updates.recv_timeout(WAIT).unwrap(),
            TrackerUpdate::PendingExpired(r) if r.cx == 100.0
        ));

        // The gate reopened, so a later submission is admitted again.
        h.requests.send(request(300.0)).unwrap();
        assert!(matches!(
            h.updates.recv_timeout(WAIT).unwrap(),
            TrackerUpdate::Pending(r) if r.cx == 300.0
        ));

        drop(h.requests);
        drop(h.results);
        h.handle.join().unwrap();
    }

    #[test]
    fn closing_requests_closes_the_ticket_channel() {
        let h = spawn_router(Duration::from_secs(30));
        drop(h.requests);
        // The recognizer's input must drain to disconnect.
        assert!(h.tickets.recv_timeout(WAIT).is_err());
        drop(h.results);
        h.handle.join().unwrap();
    }
}
