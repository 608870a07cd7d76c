//! In-process stand-ins for the browser and the models: a fullscreen host,
//! a recording navigator, a synthetic camera and scripted detector backends.
//! The `proctor-sim` binary and the tests drive the engine with these.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use image::{Rgb, RgbImage};
use rand::Rng;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{
    guard::{FullscreenError, FullscreenHost, Navigator},
    vision::{
        Camera, CameraError, DetectedObject, DetectorBackend, DetectorError, Detectors,
        FaceLandmarks, Frame, HolisticResult, LandmarkDetector, MediaStream, MediaTrack,
        ObjectDetector, OverlaySink, Point, PoseLandmarks, TrackState,
    },
};
use crate::vision::landmarks::{
    FACE_MESH_POINTS, LEFT_EYE, LOWER_LIP, MOUTH_LEFT, MOUTH_RIGHT, NOSE_TIP, RIGHT_EYE, UPPER_LIP,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

// Face-mesh indices bounding the face oval.
const FOREHEAD: usize = 10;
const CHIN: usize = 152;
const CHEEK_LEFT: usize = 234;
const CHEEK_RIGHT: usize = 454;

/// Browser fullscreen API. Requests succeed unless `deny_requests` is set.
#[derive(Debug, Default)]
pub struct SimulatedHost {
    fullscreen: AtomicBool,
    deny: AtomicBool,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_requests(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    /// The candidate pressing Esc, or the browser granting a request on its own.
    pub fn set_fullscreen(&self, fullscreen: bool) {
        self.fullscreen.store(fullscreen, Ordering::SeqCst);
    }
}

impl FullscreenHost for SimulatedHost {
    fn request_fullscreen(&self) -> Result<(), FullscreenError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(FullscreenError::Denied(
                "request not triggered by user activation".into(),
            ));
        }
        self.fullscreen.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen.load(Ordering::SeqCst)
    }
}

/// Remembers every redirect instead of leaving the page.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<String> {
        self.routes
            .lock()
            .map(|routes| routes.clone())
            .unwrap_or_default()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        log_info!("navigating to {route}");
        if let Ok(mut routes) = self.routes.lock() {
            routes.push(route.to_string());
        }
    }
}

/// A 468-point mesh centred on `(eye_x, eye_y)`. `mouth_gap` and
/// `corner_raise` are shares of face height, matching what the mood
/// heuristic measures.
pub fn face_mesh(eye_x: f32, eye_y: f32, mouth_gap: f32, corner_raise: f32) -> FaceLandmarks {
    let (cx, cy) = (eye_x, eye_y);
    let face_height = 0.25;
    let mut points = vec![Point::new(cx, cy); FACE_MESH_POINTS];

    points[FOREHEAD] = Point::new(cx, cy - 0.1);
    points[CHIN] = Point::new(cx, cy + 0.15);
    points[CHEEK_LEFT] = Point::new(cx - 0.1, cy);
    points[CHEEK_RIGHT] = Point::new(cx + 0.1, cy);

    for index in LEFT_EYE {
        points[index] = Point::new(cx - 0.04, cy);
    }
    for index in RIGHT_EYE {
        points[index] = Point::new(cx + 0.04, cy);
    }
    points[NOSE_TIP] = Point::new(cx, cy + 0.03);

    let lip_centre = cy + 0.08;
    let half_gap = mouth_gap * face_height / 2.0;
    points[UPPER_LIP] = Point::new(cx, lip_centre - half_gap);
    points[LOWER_LIP] = Point::new(cx, lip_centre + half_gap);
    let corner_y = lip_centre - corner_raise * face_height;
    points[MOUTH_LEFT] = Point::new(cx - 0.03, corner_y);
    points[MOUTH_RIGHT] = Point::new(cx + 0.03, corner_y);

    FaceLandmarks::new(points)
}

/// What the models "see" on one frame.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFrame {
    pub face: Option<FaceLandmarks>,
    pub pose: Option<PoseLandmarks>,
    pub objects: Vec<DetectedObject>,
}

impl ScriptedFrame {
    /// A lone, neutral candidate looking straight at the screen.
    pub fn looking_at_screen() -> Self {
        Self {
            face: Some(face_mesh(0.5, 0.5, 0.0, 0.0)),
            pose: None,
            objects: vec![DetectedObject::new("person", 0.9)],
        }
    }
}

/// Replays a fixed script. Each detector walks the script at its own pace
/// and holds the last entry once it runs out.
#[derive(Clone)]
pub struct ScriptedBackend {
    script: Arc<Vec<ScriptedFrame>>,
    landmark_calls: Arc<AtomicUsize>,
    object_calls: Arc<AtomicUsize>,
    fail_every: Option<usize>,
    failing_loads: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn steady(frame: ScriptedFrame) -> Self {
        Self::sequence(vec![frame])
    }

    pub fn sequence(script: Vec<ScriptedFrame>) -> Self {
        let script = if script.is_empty() {
            vec![ScriptedFrame::default()]
        } else {
            script
        };
        Self {
            script: Arc::new(script),
            landmark_calls: Arc::new(AtomicUsize::new(0)),
            object_calls: Arc::new(AtomicUsize::new(0)),
            fail_every: None,
            failing_loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Landmark call `n` (counting from zero) fails when `n % every == 0`.
    pub fn failing_every(mut self, every: usize) -> Self {
        self.fail_every = Some(every.max(1));
        self
    }

    /// The first `count` loads fail.
    pub fn failing_loads(self, count: usize) -> Self {
        self.failing_loads.store(count, Ordering::SeqCst);
        self
    }

    fn entry(&self, call: usize) -> &ScriptedFrame {
        let last = self.script.len() - 1;
        &self.script[call.min(last)]
    }
}

struct ScriptedLandmarks(ScriptedBackend);

impl LandmarkDetector for ScriptedLandmarks {
    fn detect(&self, _image: &RgbImage) -> Result<HolisticResult, DetectorError> {
        let call = self.0.landmark_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(every) = self.0.fail_every {
            if call % every == 0 {
                return Err(DetectorError::Inference(format!("scripted failure on call {call}")));
            }
        }
        let entry = self.0.entry(call);
        Ok(HolisticResult {
            face: entry.face.clone(),
            pose: entry.pose,
        })
    }
}

struct ScriptedObjects(ScriptedBackend);

impl ObjectDetector for ScriptedObjects {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<DetectedObject>, DetectorError> {
        let call = self.0.object_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.0.entry(call).objects.clone())
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn load(&self) -> Result<Detectors, DetectorError> {
        let remaining = self.failing_loads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_loads.store(remaining - 1, Ordering::SeqCst);
            return Err(DetectorError::Load("model script failed to load".into()));
        }
        Ok(Detectors {
            landmarks: Arc::new(ScriptedLandmarks(self.clone())),
            objects: Arc::new(ScriptedObjects(self.clone())),
            expressions: None,
        })
    }
}

/// A restless candidate: small random head movement, an occasional glance
/// away or smile, and now and then a phone on the desk.
#[derive(Debug, Clone)]
pub struct JitterBackend {
    pub glance_chance: f64,
    pub smile_chance: f64,
    pub phone_chance: f64,
}

impl Default for JitterBackend {
    fn default() -> Self {
        Self {
            glance_chance: 0.15,
            smile_chance: 0.2,
            phone_chance: 0.1,
        }
    }
}

impl LandmarkDetector for JitterBackend {
    fn detect(&self, _image: &RgbImage) -> Result<HolisticResult, DetectorError> {
        let mut rng = rand::thread_rng();
        let mut eye_x = 0.5 + rng.gen_range(-0.03..0.03);
        let eye_y = 0.5 + rng.gen_range(-0.03..0.03);
        if rng.gen_bool(self.glance_chance) {
            eye_x = if rng.gen_bool(0.5) { 0.3 } else { 0.7 };
        }
        let (gap, raise) = if rng.gen_bool(self.smile_chance) {
            (0.02, 0.03)
        } else {
            (0.01, 0.0)
        };

        let nose_x = eye_x + rng.gen_range(-0.02..0.02);
        Ok(HolisticResult {
            face: Some(face_mesh(eye_x, eye_y, gap, raise)),
            pose: Some(PoseLandmarks {
                nose: Some(Point::new(nose_x, 0.45)),
                left_shoulder: Some(Point::new(0.3, 0.85)),
                right_shoulder: Some(Point::new(0.7, 0.85)),
            }),
        })
    }
}

impl ObjectDetector for JitterBackend {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<DetectedObject>, DetectorError> {
        let mut rng = rand::thread_rng();
        let mut found = vec![DetectedObject::new("person", rng.gen_range(0.8..0.99))];
        if rng.gen_bool(self.phone_chance) {
            found.push(DetectedObject::new("cell phone", rng.gen_range(0.5..0.9)));
        }
        Ok(found)
    }
}

impl DetectorBackend for JitterBackend {
    fn name(&self) -> &'static str {
        "jitter"
    }

    fn load(&self) -> Result<Detectors, DetectorError> {
        let backend = Arc::new(self.clone());
        Ok(Detectors {
            landmarks: backend.clone(),
            objects: backend,
            expressions: None,
        })
    }
}

#[derive(Clone)]
struct SyntheticTrack {
    live: Arc<AtomicBool>,
}

impl MediaTrack for SyntheticTrack {
    fn kind(&self) -> &str {
        "video"
    }

    fn ready_state(&self) -> TrackState {
        if self.live.load(Ordering::SeqCst) {
            TrackState::Live
        } else {
            TrackState::Ended
        }
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

/// Handles on the tracks a `SyntheticCamera` gave out, still readable
/// after the stream itself is gone.
#[derive(Clone, Default)]
pub struct IssuedTracks {
    tracks: Arc<Mutex<Vec<SyntheticTrack>>>,
}

impl IssuedTracks {
    fn register(&self, track: SyntheticTrack) {
        if let Ok(mut tracks) = self.tracks.lock() {
            tracks.push(track);
        }
    }

    /// At least one track was handed out and every one has been stopped.
    pub fn all_ended(&self) -> bool {
        self.tracks
            .lock()
            .map(|tracks| {
                !tracks.is_empty()
                    && tracks.iter().all(|t| t.ready_state() == TrackState::Ended)
            })
            .unwrap_or(false)
    }
}

/// Produces noisy grey frames on its own thread at a fixed rate. Frames are
/// dropped while the consumer is still busy with the previous one.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    frame_interval: Duration,
    failure: Option<CameraError>,
    answer_delay: Option<Duration>,
    issued: IssuedTracks,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_interval: Duration::from_millis(20),
            failure: None,
            answer_delay: None,
            issued: IssuedTracks::default(),
        }
    }

    pub fn failing_with(mut self, err: CameraError) -> Self {
        self.failure = Some(err);
        self
    }

    /// The permission prompt stays open this long before it is granted.
    pub fn answering_after(mut self, delay: Duration) -> Self {
        self.answer_delay = Some(delay);
        self
    }

    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn issued_tracks(&self) -> IssuedTracks {
        self.issued.clone()
    }
}

impl Camera for SyntheticCamera {
    fn acquire(&self) -> Result<MediaStream, CameraError> {
        if let Some(delay) = self.answer_delay {
            thread::sleep(delay);
        }
        if let Some(err) = self.failure.as_ref() {
            return Err(err.clone());
        }

        let track = SyntheticTrack {
            live: Arc::new(AtomicBool::new(true)),
        };
        self.issued.register(track.clone());

        let (tx, rx) = mpsc::channel(1);
        let (width, height, interval) = (self.width, self.height, self.frame_interval);
        let producer_live = track.live.clone();
        thread::Builder::new()
            .name("synthetic-camera".to_string())
            .spawn(move || {
                let mut index = 0u64;
                while producer_live.load(Ordering::SeqCst) {
                    let shade = rand::thread_rng().gen_range(90..110u8);
                    let image = RgbImage::from_pixel(width, height, Rgb([shade, shade, shade]));
                    match tx.try_send(Frame::new(index, image)) {
                        Ok(()) | Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Closed(_)) => break,
                    }
                    index += 1;
                    thread::sleep(interval);
                }
                log_debug!("synthetic camera stopped after {index} frames");
            })
            .map_err(|_| CameraError::NotReadable)?;

        Ok(MediaStream::new(vec![Box::new(track)], rx))
    }
}

/// Counts what the pipeline draws and whether the canvas was cleared.
#[derive(Debug, Default)]
pub struct RecordingOverlay {
    draws: AtomicUsize,
    clears: AtomicUsize,
    visible: AtomicBool,
}

impl RecordingOverlay {
    pub fn draws(&self) -> usize {
        self.draws.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Whether the canvas currently shows landmarks.
    pub fn is_showing(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }
}

impl OverlaySink for RecordingOverlay {
    fn draw(&self, _frame: &Frame, _landmarks: &HolisticResult) {
        self.draws.fetch_add(1, Ordering::SeqCst);
        self.visible.store(true, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.visible.store(false, Ordering::SeqCst);
    }
}
