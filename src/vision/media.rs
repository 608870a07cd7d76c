use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use super::{frame::Frame, landmarks::HolisticResult};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera device found")]
    NotFound,
    #[error("camera is already in use by another application")]
    InUse,
    #[error("camera stream ended before producing a frame")]
    NotReadable,
    #[error("camera did not produce a usable frame in time")]
    Timeout,
    #[error("model failed to load: {0}")]
    ModelLoad(String),
}

impl CameraError {
    /// Text for the denied/error display state.
    pub fn user_message(&self) -> String {
        match self {
            CameraError::PermissionDenied => {
                "Camera access was denied. Allow camera access in your browser settings and retry.".into()
            }
            CameraError::NotFound => "No camera was found. Connect a camera and retry.".into(),
            CameraError::InUse => {
                "Your camera is being used by another application. Close it and retry.".into()
            }
            CameraError::NotReadable | CameraError::Timeout => {
                "The camera did not start. Check the connection and retry.".into()
            }
            CameraError::ModelLoad(cause) => {
                format!("Proctoring models failed to load ({cause}). Check your connection and retry.")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum CameraStatus {
    Idle,
    Requesting,
    Granted,
    Denied { message: String },
}

impl CameraStatus {
    pub fn denied(err: &CameraError) -> Self {
        CameraStatus::Denied {
            message: err.user_message(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackState {
    Live,
    Ended,
}

pub trait MediaTrack: Send + Sync + 'static {
    fn kind(&self) -> &str;
    fn ready_state(&self) -> TrackState;
    /// Releases the device. Must be idempotent.
    fn stop(&self);
}

/// An acquired camera stream: its tracks plus the frame feed.
///
/// The feed is a bounded channel; the producer drops frames while the
/// pipeline is still busy with an earlier one.
pub struct MediaStream {
    tracks: Vec<Box<dyn MediaTrack>>,
    frames: mpsc::Receiver<Frame>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Box<dyn MediaTrack>>, frames: mpsc::Receiver<Frame>) -> Self {
        Self { tracks, frames }
    }

    pub fn track_kinds(&self) -> Vec<&str> {
        self.tracks.iter().map(|t| t.kind()).collect()
    }

    /// True once no track still holds the device.
    pub fn all_tracks_ended(&self) -> bool {
        self.tracks
            .iter()
            .all(|t| t.ready_state() == TrackState::Ended)
    }

    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }

    pub fn stop_all_tracks(&mut self) {
        for track in &self.tracks {
            track.stop();
        }
        self.frames.close();
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop_all_tracks();
    }
}

/// `getUserMedia`. Blocks until the user answers the permission prompt,
/// which may be never.
pub trait Camera: Send + Sync + 'static {
    fn acquire(&self) -> Result<MediaStream, CameraError>;
}

/// The preview canvas the pipeline draws landmarks on.
pub trait OverlaySink: Send + Sync + 'static {
    fn draw(&self, frame: &Frame, landmarks: &HolisticResult);
    fn clear(&self);
}
