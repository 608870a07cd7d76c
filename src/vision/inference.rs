//! Geometric heuristics turning landmarks into per-frame classifications.

use serde::{Deserialize, Serialize};

use super::landmarks::{
    FaceLandmarks, HolisticResult, PoseLandmarks, LEFT_EYE, LOWER_LIP, MOUTH_LEFT, MOUTH_RIGHT,
    NOSE_TIP, RIGHT_EYE, UPPER_LIP,
};

/// Corners this far (as a share of face height) above the lip centre read
/// as a smile.
const SMILE_CORNER_RAISE: f32 = 0.015;
/// An open mouth only counts as a smile when the corners are at least level.
const OPEN_MOUTH_GAP: f32 = 0.06;

/// Nose offset from the shoulder midpoint, as a share of shoulder width.
const TURN_OFFSET: f32 = 0.25;
/// Nose offset from the face centre, as a share of face width.
const FACE_TURN_OFFSET: f32 = 0.15;

const GAZE_LEFT_X: f32 = 0.4;
const GAZE_RIGHT_X: f32 = 0.6;
const GAZE_UP_Y: f32 = 0.35;
const GAZE_DOWN_Y: f32 = 0.65;

pub const MOOD_HAPPY: &str = "happy";
pub const MOOD_NEUTRAL: &str = "neutral";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    LookingForward,
    LookingAway,
    TurnedLeft,
    TurnedRight,
    FacingForward,
}

impl Gesture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gesture::LookingForward => "looking_forward",
            Gesture::LookingAway => "looking_away",
            Gesture::TurnedLeft => "turned_left",
            Gesture::TurnedRight => "turned_right",
            Gesture::FacingForward => "facing_forward",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gaze {
    LookingLeft,
    LookingRight,
    LookingUp,
    LookingDown,
    LookingCenter,
}

impl Gaze {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gaze::LookingLeft => "looking_left",
            Gaze::LookingRight => "looking_right",
            Gaze::LookingUp => "looking_up",
            Gaze::LookingDown => "looking_down",
            Gaze::LookingCenter => "looking_center",
        }
    }
}

/// `happy` or `neutral` from mouth geometry, scaled by face height.
pub fn estimate_mood(face: &FaceLandmarks) -> Option<&'static str> {
    let upper = face.get(UPPER_LIP)?;
    let lower = face.get(LOWER_LIP)?;
    let left = face.get(MOUTH_LEFT)?;
    let right = face.get(MOUTH_RIGHT)?;
    let (_, min_y, _, max_y) = face.bounds()?;
    let face_height = max_y - min_y;
    if face_height <= f32::EPSILON {
        return None;
    }

    let mouth_gap = upper.distance(&lower) / face_height;
    let lip_centre_y = (upper.y + lower.y) / 2.0;
    let corner_y = (left.y + right.y) / 2.0;
    // y grows downwards, so raised corners sit above the lip centre.
    let corner_raise = (lip_centre_y - corner_y) / face_height;

    let smiling =
        corner_raise > SMILE_CORNER_RAISE || (mouth_gap > OPEN_MOUTH_GAP && corner_raise >= 0.0);
    Some(if smiling { MOOD_HAPPY } else { MOOD_NEUTRAL })
}

/// Head orientation. Shoulders give `turned_*`/`facing_forward`; a face mesh
/// alone gives `looking_forward`/`looking_away`.
pub fn estimate_gesture(result: &HolisticResult) -> Option<Gesture> {
    if let Some(gesture) = result.pose.as_ref().and_then(gesture_from_pose) {
        return Some(gesture);
    }
    result.face.as_ref().and_then(gesture_from_face)
}

fn gesture_from_pose(pose: &PoseLandmarks) -> Option<Gesture> {
    let nose = pose.nose?;
    let left = pose.left_shoulder?;
    let right = pose.right_shoulder?;
    let width = (left.x - right.x).abs();
    if width <= f32::EPSILON {
        return None;
    }

    let offset = (nose.x - (left.x + right.x) / 2.0) / width;
    Some(if offset < -TURN_OFFSET {
        Gesture::TurnedLeft
    } else if offset > TURN_OFFSET {
        Gesture::TurnedRight
    } else {
        Gesture::FacingForward
    })
}

fn gesture_from_face(face: &FaceLandmarks) -> Option<Gesture> {
    let nose = face.get(NOSE_TIP)?;
    let (min_x, _, max_x, _) = face.bounds()?;
    let width = max_x - min_x;
    if width <= f32::EPSILON {
        return None;
    }

    let ratio = (nose.x - min_x) / width;
    Some(if (ratio - 0.5).abs() > FACE_TURN_OFFSET {
        Gesture::LookingAway
    } else {
        Gesture::LookingForward
    })
}

/// Gaze from the eye-region centroid in frame coordinates. Horizontal
/// deviation wins over vertical.
pub fn estimate_gaze(face: &FaceLandmarks) -> Option<Gaze> {
    let left = face.centroid(&LEFT_EYE)?;
    let right = face.centroid(&RIGHT_EYE)?;
    let x = (left.x + right.x) / 2.0;
    let y = (left.y + right.y) / 2.0;

    Some(if x < GAZE_LEFT_X {
        Gaze::LookingLeft
    } else if x > GAZE_RIGHT_X {
        Gaze::LookingRight
    } else if y < GAZE_UP_Y {
        Gaze::LookingUp
    } else if y > GAZE_DOWN_Y {
        Gaze::LookingDown
    } else {
        Gaze::LookingCenter
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::face_mesh;
    use crate::vision::landmarks::Point;

    #[test]
    fn level_closed_mouth_is_neutral() {
        let face = face_mesh(0.5, 0.5, 0.0, 0.0);
        assert_eq!(estimate_mood(&face), Some(MOOD_NEUTRAL));
    }

    #[test]
    fn raised_corners_are_happy() {
        let face = face_mesh(0.5, 0.5, 0.0, 0.02);
        assert_eq!(estimate_mood(&face), Some(MOOD_HAPPY));
    }

    #[test]
    fn open_mouth_with_dropped_corners_is_neutral() {
        let face = face_mesh(0.5, 0.5, 0.05, -0.01);
        assert_eq!(estimate_mood(&face), Some(MOOD_NEUTRAL));
    }

    #[test]
    fn sparse_mesh_yields_nothing() {
        let face = FaceLandmarks::new(vec![Point::new(0.5, 0.5); 10]);
        assert_eq!(estimate_mood(&face), None);
        assert_eq!(estimate_gaze(&face), None);
    }

    #[test]
    fn gaze_follows_eye_centroid() {
        assert_eq!(estimate_gaze(&face_mesh(0.5, 0.5, 0.0, 0.0)), Some(Gaze::LookingCenter));
        assert_eq!(estimate_gaze(&face_mesh(0.3, 0.5, 0.0, 0.0)), Some(Gaze::LookingLeft));
        assert_eq!(estimate_gaze(&face_mesh(0.7, 0.5, 0.0, 0.0)), Some(Gaze::LookingRight));
        assert_eq!(estimate_gaze(&face_mesh(0.5, 0.25, 0.0, 0.0)), Some(Gaze::LookingUp));
        assert_eq!(estimate_gaze(&face_mesh(0.5, 0.8, 0.0, 0.0)), Some(Gaze::LookingDown));
    }

    #[test]
    fn pose_takes_precedence_over_face() {
        let shoulders = |nose_x| PoseLandmarks {
            nose: Some(Point::new(nose_x, 0.4)),
            left_shoulder: Some(Point::new(0.3, 0.8)),
            right_shoulder: Some(Point::new(0.7, 0.8)),
        };
        let mut result = HolisticResult {
            face: Some(face_mesh(0.5, 0.5, 0.0, 0.0)),
            pose: Some(shoulders(0.5)),
        };
        assert_eq!(estimate_gesture(&result), Some(Gesture::FacingForward));

        result.pose = Some(shoulders(0.35));
        assert_eq!(estimate_gesture(&result), Some(Gesture::TurnedLeft));
        result.pose = Some(shoulders(0.65));
        assert_eq!(estimate_gesture(&result), Some(Gesture::TurnedRight));
    }

    #[test]
    fn face_only_gesture_uses_nose_position() {
        let mut face = face_mesh(0.5, 0.5, 0.0, 0.0);
        let result = HolisticResult {
            face: Some(face.clone()),
            pose: None,
        };
        assert_eq!(estimate_gesture(&result), Some(Gesture::LookingForward));

        let (min_x, _, max_x, _) = face.bounds().unwrap();
        face.points[NOSE_TIP].x = min_x + (max_x - min_x) * 0.1;
        let result = HolisticResult {
            face: Some(face),
            pose: None,
        };
        assert_eq!(estimate_gesture(&result), Some(Gesture::LookingAway));
    }
}
