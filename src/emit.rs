//! Named UI events. The host shell decides how a payload reaches the page;
//! the core only names the event and serialises the payload.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

pub const GUARD_STATE_CHANGED: &str = "guard-state-changed";
pub const GUARD_COUNTDOWN: &str = "guard-countdown";
pub const WARNINGS_CHANGED: &str = "warnings-changed";
pub const DETECTION_EVENT: &str = "detection-event";
pub const CAMERA_STATUS_CHANGED: &str = "camera-status-changed";

pub trait Emitter: Send + Sync + 'static {
    fn emit(&self, event: &str, payload: Value);
}

/// Serialise and emit, swallowing serialisation failures the way a UI emit
/// failure is swallowed: the core never stops because a banner didn't render.
pub(crate) fn emit_json<T: Serialize>(emitter: &dyn Emitter, event: &str, payload: &T) {
    match serde_json::to_value(payload) {
        Ok(value) => emitter.emit(event, value),
        Err(err) => log::warn!("failed to serialise {event} payload: {err}"),
    }
}

/// Writes every event to the log. Used by the simulator.
pub struct LogEmitter;

impl Emitter for LogEmitter {
    fn emit(&self, event: &str, payload: Value) {
        log::info!("[{event}] {payload}");
    }
}

/// Forwards events into a channel; the receiving end plays the UI.
#[derive(Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<(String, Value)>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Emitter for ChannelEmitter {
    fn emit(&self, event: &str, payload: Value) {
        let _ = self.tx.send((event.to_string(), payload));
    }
}
