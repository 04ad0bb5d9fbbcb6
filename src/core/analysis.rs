use crate::core::features::{
    self, EyeShape, EyeSpacing, FaceShape, FacialRatios, LipFullness, NoseWidth,
};
use crate::core::landmarks::{DetectorError, LandmarkDetector};
use crate::core::skin_tone::{self, SkinTone};
use crate::core::uploads::StagedUpload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Everything the UI shows about a face, and the recommender's input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FaceAnalysis {
    pub face_detected: bool,
    pub face_count: usize,
    pub image_width: u32,
    pub image_height: u32,
    pub face_shape: FaceShape,
    pub eye_shape: EyeShape,
    pub eye_spacing: EyeSpacing,
    pub lip_fullness: LipFullness,
    pub nose_width: NoseWidth,
    pub has_prominent_cheekbones: bool,
    pub ratios: FacialRatios,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin_tone: Option<SkinTone>,
    pub analyzed_at: DateTime<Utc>,
}

pub async fn analyze_upload(
    detector: &dyn LandmarkDetector,
    upload: &StagedUpload,
) -> Result<FaceAnalysis, DetectorError> {
    let started = std::time::Instant::now();
    let detection = detector
        .detect(upload.path(), &upload.info.content_type)
        .await?;
    let face = detection.primary_face()?;

    // the sidecar reports the dimensions it decoded; trust it over our own reading
    let (width, height) = if detection.image_width > 0 && detection.image_height > 0 {
        (detection.image_width, detection.image_height)
    } else {
        (upload.info.width, upload.info.height)
    };

    let features = features::extract(face, width, height)?;
    let skin_tone = skin_tone::sample(upload.path(), face).await;

    info!(
        "analyzed {} in {:?}: {} face, {} face(s) found",
        upload.info.file_id,
        started.elapsed(),
        features.face_shape.as_str(),
        detection.faces.len()
    );

    Ok(FaceAnalysis {
        face_detected: true,
        face_count: detection.faces.len(),
        image_width: width,
        image_height: height,
        face_shape: features.face_shape,
        eye_shape: features.eye_shape,
        eye_spacing: features.eye_spacing,
        lip_fullness: features.lip_fullness,
        nose_width: features.nose_width,
        has_prominent_cheekbones: features.has_prominent_cheekbones,
        ratios: features.ratios,
        skin_tone,
        analyzed_at: Utc::now(),
    })
}
