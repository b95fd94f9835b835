// Capture worker: pulls frames from the video source and hands each
// one synchronously to the tracking thread.
//
// A grab failure is treated as transient: log, back off briefly, try
// again. The worker only exits when asked to stop or when the tracking
// side of the handoff goes away.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::imageops;
use tracing::{info, warn};

use crate::source::VideoSource;

use super::handoff::HandoffSender;
use super::types::Frame;

const GRAB_RETRY_DELAY: Duration = Duration::from_millis(50);

pub fn capture_worker(
    mut source: Box<dyn VideoSource>,
    frames: HandoffSender<Frame>,
    flip: bool,
    startup_delay: Duration,
    running: Arc<AtomicBool>,
) {
    if !startup_delay.is_zero() {
        // Give the sensor time to settle before the first grab.
        info!("capture paused for {startup_delay:?} before first frame");
        thread::sleep(startup_delay);
    }
    info!("capturing from {}", source.describe());

    let mut seq: u64 = 0;
    while running.load(Ordering::SeqCst) {
        let image = match source.grab() {
            Ok(image) => image,
            Err(e) => {
                warn!("frame grab failed: {e:#}");
                thread::sleep(GRAB_RETRY_DELAY);
                continue;
            }
        };
        let image = if flip { imageops::rotate180(&image) } else { image };

        // Blocks until the tracking thread has fully processed the
        // frame; this is the pipeline's pacing point.
        if frames.offer(Frame::new(seq, image)).is_err() {
            break;
        }
        seq += 1;
    }
    info!("capture worker finished after {seq} frames");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::handoff::sync_handoff;
    use anyhow::anyhow;
    use image::{Rgb, RgbImage};

    struct CountedSource {
        grabs: u32,
        fail_on: Option<u32>,
    }

    impl VideoSource for CountedSource {
        fn grab(&mut self) -> anyhow::Result<RgbImage> {
            self.grabs += 1;
            if Some(self.grabs) == self.fail_on {
                return Err(anyhow!("sensor hiccup"));
            }
            let mut image = RgbImage::new(4, 2);
            image.put_pixel(0, 0, Rgb([255, 0, 0]));
            Ok(image)
        }

        fn describe(&self) -> String {
            "counted test source".into()
        }
    }

    #[test]
    fn frames_arrive_in_sequence_and_survive_a_grab_failure() {
        let (tx, rx) = sync_handoff::<Frame>();
        let running = Arc::new(AtomicBool::new(true));
        let worker_running = running.clone();
        let worker = thread::spawn(move || {
            capture_worker(
                Box::new(CountedSource {
                    grabs: 0,
                    fail_on: Some(2),
                }),
                tx,
                false,
                Duration::ZERO,
                worker_running,
            );
        });

        let mut seqs = Vec::new();
        for _ in 0..3 {
            rx.process(|frame| seqs.push(frame.seq)).unwrap();
        }
        running.store(false, Ordering::SeqCst);
        // Drain anything offered before the flag was seen.
        while rx.process(|_| ()).is_ok() {}
        worker.join().unwrap();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn flip_rotates_the_image_before_handoff() {
        let (tx, rx) = sync_handoff::<Frame>();
        let running = Arc::new(AtomicBool::new(true));
        let worker_running = running.clone();
        let worker = thread::spawn(move || {
            capture_worker(
                Box::new(CountedSource {
                    grabs: 0,
                    fail_on: None,
                }),
                tx,
                true,
                Duration::ZERO,
                worker_running,
            );
        });

        rx.process(|frame| {
            // The marked corner moved from (0,0) to the opposite corner.
            assert_eq!(frame.image.get_pixel(3, 1), &Rgb([255, 0, 0]));
            assert_eq!(frame.image.get_pixel(0, 0), &Rgb([0, 0, 0]));
        })
        .unwrap();
        running.store(false, Ordering::SeqCst);
        while rx.process(|_| ()).is_ok() {}
        worker.join().unwrap();
    }

    #[test]
    fn worker_exits_when_the_tracking_side_disappears() {
        let (tx, rx) = sync_handoff::<Frame>();
        let running = Arc::new(AtomicBool::new(true));
        let worker = thread::spawn(move || {
            capture_worker(
                Box::new(CountedSource {
                    grabs: 0,
                    fail_on: None,
                }),
                tx,
                false,
                Duration::ZERO,
                running,
            );
        });

        rx.process(|_| ()).unwrap();
        drop(rx);
        worker.join().unwrap();
    }
}
