use std::{
    sync::{mpsc, Arc},
    thread,
};

use image::{imageops, RgbImage};
use tokio::sync::oneshot::{self, error::TryRecvError};

use super::{
    detectors::{DetectedObject, DetectorError, ObjectDetector},
    frame::Frame,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

type DetectReply = Result<Vec<DetectedObject>, DetectorError>;

struct DetectRequest {
    frame: Frame,
    reply: oneshot::Sender<DetectReply>,
}

/// Object detection on its own thread so the frame loop never waits on it.
///
/// At most one request is outstanding; `try_dispatch` refuses new frames
/// until the previous answer has been collected with `poll`.
pub struct ObjectWorker {
    tx: Option<mpsc::Sender<DetectRequest>>,
    pending: Option<oneshot::Receiver<DetectReply>>,
}

impl ObjectWorker {
    pub fn spawn(detector: Arc<dyn ObjectDetector>, input_size: u32) -> Result<Self, DetectorError> {
        let (tx, rx) = mpsc::channel::<DetectRequest>();

        thread::Builder::new()
            .name("object-detector".to_string())
            .spawn(move || {
                while let Ok(request) = rx.recv() {
                    let input = fit_within(&request.frame.image, input_size);
                    let result = detector.detect(&input);
                    // The pipeline may have stopped waiting; that's fine.
                    let _ = request.reply.send(result);
                }
                log_debug!("object detector thread exiting");
            })
            .map_err(|e| DetectorError::Load(format!("failed to start detector thread: {e}")))?;

        Ok(Self {
            tx: Some(tx),
            pending: None,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Hands `frame` to the worker unless a request is still in flight.
    pub fn try_dispatch(&mut self, frame: &Frame) -> bool {
        if self.pending.is_some() {
            return false;
        }
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };

        let (reply, answer) = oneshot::channel();
        let request = DetectRequest {
            frame: frame.clone(),
            reply,
        };
        if tx.send(request).is_err() {
            log_warn!("object detector thread is gone");
            self.tx = None;
            return false;
        }
        self.pending = Some(answer);
        true
    }

    /// Collects a finished answer without blocking.
    pub fn poll(&mut self) -> Option<DetectReply> {
        let pending = self.pending.as_mut()?;
        match pending.try_recv() {
            Ok(result) => {
                self.pending = None;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => {
                self.pending = None;
                Some(Err(DetectorError::WorkerGone))
            }
        }
    }

    /// Closes the request channel. An inference already running finishes on
    /// its own and its answer is discarded.
    pub fn shutdown(&mut self) {
        self.tx = None;
        self.pending = None;
    }
}

impl Drop for ObjectWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Shrinks `image` to fit a `size`x`size` square, keeping aspect ratio.
pub(crate) fn fit_within(image: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width <= size && height <= size {
        return image.clone();
    }
    let scale = size as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * scale).round() as u32).max(1);
    let new_height = ((height as f32 * scale).round() as u32).max(1);
    imageops::thumbnail(image, new_width, new_height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct SizeRecorder {
        seen: Mutex<Vec<(u32, u32)>>,
    }

    impl ObjectDetector for SizeRecorder {
        fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedObject>, DetectorError> {
            self.seen.lock().unwrap().push(image.dimensions());
            Ok(vec![DetectedObject::new("book", 0.9)])
        }
    }

    #[test]
    fn fit_within_keeps_aspect_ratio() {
        let image = RgbImage::new(640, 480);
        assert_eq!(fit_within(&image, 320).dimensions(), (320, 240));
        let small = RgbImage::new(100, 50);
        assert_eq!(fit_within(&small, 320).dimensions(), (100, 50));
    }

    #[tokio::test]
    async fn one_request_in_flight_at_a_time() {
        let detector = Arc::new(SizeRecorder {
            seen: Mutex::new(Vec::new()),
        });
        let mut worker = ObjectWorker::spawn(detector.clone(), 320).unwrap();
        let frame = Frame::new(0, RgbImage::new(640, 480));

        assert!(worker.try_dispatch(&frame));
        assert!(!worker.try_dispatch(&frame));

        let mut answer = None;
        for _ in 0..200 {
            if let Some(result) = worker.poll() {
                answer = Some(result);
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let objects = answer.expect("worker answered").unwrap();
        assert_eq!(objects[0].label, "book");
        assert!(!worker.is_busy());
        assert!(worker.try_dispatch(&frame));
        assert_eq!(detector.seen.lock().unwrap()[0], (320, 240));
    }
}
