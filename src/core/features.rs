//! Geometric facial features derived from a 468-point face mesh.
//!
//! Distances are measured in pixel space so that non-square images do not
//! skew the ratios. The categorical labels are coarse buckets over those
//! ratios and only serve as prompt material for the recommender.

use crate::core::landmarks::{DetectorError, FACE_MESH_POINTS, FaceLandmarks};
use serde::{Deserialize, Serialize};

// face mesh indices
const FOREHEAD_TOP: usize = 10;
const CHIN: usize = 152;
const CHEEKBONE_LEFT: usize = 234;
const CHEEKBONE_RIGHT: usize = 454;
const JAW_LEFT: usize = 172;
const JAW_RIGHT: usize = 397;
const TEMPLE_LEFT: usize = 54;
const TEMPLE_RIGHT: usize = 284;

const RIGHT_EYE_OUTER: usize = 33;
const RIGHT_EYE_INNER: usize = 133;
const RIGHT_EYE_TOP: usize = 159;
const RIGHT_EYE_BOTTOM: usize = 145;
const LEFT_EYE_INNER: usize = 362;
const LEFT_EYE_OUTER: usize = 263;
const LEFT_EYE_TOP: usize = 386;
const LEFT_EYE_BOTTOM: usize = 374;

const UPPER_LIP_TOP: usize = 0;
const UPPER_LIP_BOTTOM: usize = 13;
const LOWER_LIP_TOP: usize = 14;
const LOWER_LIP_BOTTOM: usize = 17;
const MOUTH_LEFT: usize = 61;
const MOUTH_RIGHT: usize = 291;

const NOSE_WING_LEFT: usize = 129;
const NOSE_WING_RIGHT: usize = 358;
const NOSE_TIP: usize = 1;

// left/right outline points at cheekbone, lower face and mid-face height
const SYMMETRY_PAIRS: [(usize, usize); 3] = [(234, 454), (93, 323), (116, 345)];

// cheekbones wider than the jaw by this factor count as prominent
const PROMINENT_CHEEKBONES: f64 = 1.05;

const MIN_DISTANCE_PX: f64 = 1e-3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FacialRatios {
    pub face_length_to_width: f64,
    pub jaw_to_cheekbone: f64,
    pub forehead_to_cheekbone: f64,
    pub eye_aspect: f64,
    pub eye_spacing_to_eye_width: f64,
    pub lip_height_to_width: f64,
    pub upper_to_lower_lip: f64,
    pub nose_width_to_face_width: f64,
    /// 1.0 when both halves of the outline sit equally far from the nose tip.
    pub face_symmetry: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FaceShape {
    Oval,
    Round,
    Square,
    Heart,
    Oblong,
    Diamond,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EyeShape {
    Almond,
    Round,
    Narrow,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EyeSpacing {
    CloseSet,
    Balanced,
    WideSet,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LipFullness {
    Thin,
    Medium,
    Full,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoseWidth {
    Narrow,
    Medium,
    Wide,
}

impl FaceShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaceShape::Oval => "oval",
            FaceShape::Round => "round",
            FaceShape::Square => "square",
            FaceShape::Heart => "heart",
            FaceShape::Oblong => "oblong",
            FaceShape::Diamond => "diamond",
        }
    }

    pub fn classify(ratios: &FacialRatios) -> Self {
        let length = ratios.face_length_to_width;
        let jaw = ratios.jaw_to_cheekbone;
        let forehead = ratios.forehead_to_cheekbone;

        if length >= 1.5 {
            FaceShape::Oblong
        } else if jaw >= 0.85 && length < 1.35 {
            FaceShape::Square
        } else if length < 1.25 {
            FaceShape::Round
        } else if forehead >= 0.85 && jaw <= 0.75 && forehead - jaw >= 0.1 {
            FaceShape::Heart
        } else if forehead < 0.75 && jaw < 0.75 {
            FaceShape::Diamond
        } else {
            FaceShape::Oval
        }
    }
}

impl EyeShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            EyeShape::Almond => "almond",
            EyeShape::Round => "round",
            EyeShape::Narrow => "narrow",
        }
    }

    fn classify(eye_aspect: f64) -> Self {
        if eye_aspect >= 0.33 {
            EyeShape::Round
        } else if eye_aspect < 0.22 {
            EyeShape::Narrow
        } else {
            EyeShape::Almond
        }
    }
}

impl EyeSpacing {
    pub fn as_str(&self) -> &'static str {
        match self {
            EyeSpacing::CloseSet => "close-set",
            EyeSpacing::Balanced => "balanced",
            EyeSpacing::WideSet => "wide-set",
        }
    }

    fn classify(spacing_to_width: f64) -> Self {
        if spacing_to_width > 1.15 {
            EyeSpacing::WideSet
        } else if spacing_to_width < 0.9 {
            EyeSpacing::CloseSet
        } else {
            EyeSpacing::Balanced
        }
    }
}

impl LipFullness {
    pub fn as_str(&self) -> &'static str {
        match self {
            LipFullness::Thin => "thin",
            LipFullness::Medium => "medium",
            LipFullness::Full => "full",
        }
    }

    fn classify(height_to_width: f64) -> Self {
        if height_to_width >= 0.45 {
            LipFullness::Full
        } else if height_to_width < 0.3 {
            LipFullness::Thin
        } else {
            LipFullness::Medium
        }
    }
}

impl NoseWidth {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoseWidth::Narrow => "narrow",
            NoseWidth::Medium => "medium",
            NoseWidth::Wide => "wide",
        }
    }

    fn classify(nose_to_face: f64) -> Self {
        if nose_to_face > 0.28 {
            NoseWidth::Wide
        } else if nose_to_face < 0.22 {
            NoseWidth::Narrow
        } else {
            NoseWidth::Medium
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureSet {
    pub face_shape: FaceShape,
    pub eye_shape: EyeShape,
    pub eye_spacing: EyeSpacing,
    pub lip_fullness: LipFullness,
    pub nose_width: NoseWidth,
    pub has_prominent_cheekbones: bool,
    pub ratios: FacialRatios,
}

struct Mesh<'a> {
    face: &'a FaceLandmarks,
    width: u32,
    height: u32,
}

impl Mesh<'_> {
    fn point(&self, index: usize) -> Result<(f64, f64), DetectorError> {
        self.face
            .pixel(index, self.width, self.height)
            .ok_or_else(|| DetectorError::InvalidLandmarks(format!("missing landmark {}", index)))
    }

    fn distance(&self, a: usize, b: usize) -> Result<f64, DetectorError> {
        let (ax, ay) = self.point(a)?;
        let (bx, by) = self.point(b)?;
        Ok(((ax - bx).powi(2) + (ay - by).powi(2)).sqrt())
    }

    // denominators must be non-degenerate or every ratio turns into inf/NaN
    fn span(&self, a: usize, b: usize, what: &str) -> Result<f64, DetectorError> {
        let d = self.distance(a, b)?;
        if d < MIN_DISTANCE_PX {
            return Err(DetectorError::InvalidLandmarks(format!(
                "degenerate {} measurement",
                what
            )));
        }
        Ok(d)
    }

    // horizontal balance of each outline pair around the nose tip, averaged
    fn symmetry(&self) -> Result<f64, DetectorError> {
        let (center_x, _) = self.point(NOSE_TIP)?;
        let mut scores = Vec::with_capacity(SYMMETRY_PAIRS.len());
        for (left, right) in SYMMETRY_PAIRS {
            let left = (self.point(left)?.0 - center_x).abs();
            let right = (self.point(right)?.0 - center_x).abs();
            let spread = left + right;
            if spread > MIN_DISTANCE_PX {
                scores.push(1.0 - (left - right).abs() / spread);
            }
        }

        if scores.is_empty() {
            return Err(DetectorError::InvalidLandmarks(
                "degenerate symmetry measurement".to_string(),
            ));
        }
        Ok(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

pub fn extract(
    face: &FaceLandmarks,
    image_width: u32,
    image_height: u32,
) -> Result<FeatureSet, DetectorError> {
    if face.landmarks.len() < FACE_MESH_POINTS {
        return Err(DetectorError::InvalidLandmarks(format!(
            "expected {} landmarks, got {}",
            FACE_MESH_POINTS,
            face.landmarks.len()
        )));
    }

    let mesh = Mesh {
        face,
        width: image_width,
        height: image_height,
    };

    let face_width = mesh.span(CHEEKBONE_LEFT, CHEEKBONE_RIGHT, "cheekbone")?;
    let face_length = mesh.distance(FOREHEAD_TOP, CHIN)?;
    let jaw_width = mesh.distance(JAW_LEFT, JAW_RIGHT)?;
    let forehead_width = mesh.distance(TEMPLE_LEFT, TEMPLE_RIGHT)?;

    let right_eye_width = mesh.span(RIGHT_EYE_OUTER, RIGHT_EYE_INNER, "right eye")?;
    let left_eye_width = mesh.span(LEFT_EYE_INNER, LEFT_EYE_OUTER, "left eye")?;
    let right_eye_height = mesh.distance(RIGHT_EYE_TOP, RIGHT_EYE_BOTTOM)?;
    let left_eye_height = mesh.distance(LEFT_EYE_TOP, LEFT_EYE_BOTTOM)?;
    let eye_width = (right_eye_width + left_eye_width) / 2.0;
    let eye_height = (right_eye_height + left_eye_height) / 2.0;
    let eye_gap = mesh.distance(RIGHT_EYE_INNER, LEFT_EYE_INNER)?;

    let mouth_width = mesh.span(MOUTH_LEFT, MOUTH_RIGHT, "mouth")?;
    let lip_height = mesh.distance(UPPER_LIP_TOP, LOWER_LIP_BOTTOM)?;
    let upper_lip = mesh.distance(UPPER_LIP_TOP, UPPER_LIP_BOTTOM)?;
    let lower_lip = mesh.span(LOWER_LIP_TOP, LOWER_LIP_BOTTOM, "lower lip")?;

    let nose_width = mesh.distance(NOSE_WING_LEFT, NOSE_WING_RIGHT)?;
    let face_symmetry = mesh.symmetry()?;

    let ratios = FacialRatios {
        face_length_to_width: round3(face_length / face_width),
        jaw_to_cheekbone: round3(jaw_width / face_width),
        forehead_to_cheekbone: round3(forehead_width / face_width),
        eye_aspect: round3(eye_height / eye_width),
        eye_spacing_to_eye_width: round3(eye_gap / eye_width),
        lip_height_to_width: round3(lip_height / mouth_width),
        upper_to_lower_lip: round3(upper_lip / lower_lip),
        nose_width_to_face_width: round3(nose_width / face_width),
        face_symmetry: round3(face_symmetry),
    };

    Ok(FeatureSet {
        face_shape: FaceShape::classify(&ratios),
        eye_shape: EyeShape::classify(ratios.eye_aspect),
        eye_spacing: EyeSpacing::classify(ratios.eye_spacing_to_eye_width),
        lip_fullness: LipFullness::classify(ratios.lip_height_to_width),
        nose_width: NoseWidth::classify(ratios.nose_width_to_face_width),
        has_prominent_cheekbones: face_width > jaw_width * PROMINENT_CHEEKBONES,
        ratios,
    })
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
