use serde::{Deserialize, Serialize};

/// Landmark position normalised to the frame: (0,0) top-left, (1,1)
/// bottom-right.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

// Face-mesh indices (468-point topology).
pub const NOSE_TIP: usize = 1;
pub const UPPER_LIP: usize = 13;
pub const LOWER_LIP: usize = 14;
pub const MOUTH_LEFT: usize = 61;
pub const MOUTH_RIGHT: usize = 291;
pub const LEFT_EYE: [usize; 4] = [33, 133, 159, 145];
pub const RIGHT_EYE: [usize; 4] = [362, 263, 386, 374];
pub const FACE_MESH_POINTS: usize = 468;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FaceLandmarks {
    pub points: Vec<Point>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn get(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }

    pub fn centroid(&self, indices: &[usize]) -> Option<Point> {
        if indices.is_empty() {
            return None;
        }
        let mut x = 0.0;
        let mut y = 0.0;
        for index in indices {
            let p = self.get(*index)?;
            x += p.x;
            y += p.y;
        }
        let n = indices.len() as f32;
        Some(Point::new(x / n, y / n))
    }

    /// (min_x, min_y, max_x, max_y) over every point.
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let first = self.points.first()?;
        Some(self.points.iter().fold(
            (first.x, first.y, first.x, first.y),
            |(min_x, min_y, max_x, max_y), p| {
                (min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y))
            },
        ))
    }
}

/// The pose keypoints the gesture heuristic needs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PoseLandmarks {
    pub nose: Option<Point>,
    pub left_shoulder: Option<Point>,
    pub right_shoulder: Option<Point>,
}

/// Output of the holistic landmark model for one frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HolisticResult {
    pub face: Option<FaceLandmarks>,
    pub pose: Option<PoseLandmarks>,
}
