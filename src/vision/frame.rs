use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::RgbImage;

/// One decoded camera frame. Cheap to clone; the pixels are shared.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub captured_at: DateTime<Utc>,
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            captured_at: Utc::now(),
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// The equivalent of a video element reporting enough data to draw.
    pub fn is_usable(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }
}
