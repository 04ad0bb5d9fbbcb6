use crate::core::landmarks::FaceLandmarks;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// mid-cheek points, clear of the nose and lips
const CHEEK_LEFT: usize = 50;
const CHEEK_RIGHT: usize = 280;
const CHEEKBONE_LEFT: usize = 234;
const CHEEKBONE_RIGHT: usize = 454;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Fair,
    Light,
    Medium,
    Tan,
    Deep,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Undertone {
    Warm,
    Cool,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkinTone {
    pub rgb: [u8; 3],
    pub hex: String,
    pub depth: Depth,
    pub undertone: Undertone,
}

impl Depth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Depth::Fair => "fair",
            Depth::Light => "light",
            Depth::Medium => "medium",
            Depth::Tan => "tan",
            Depth::Deep => "deep",
        }
    }
}

impl Undertone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Undertone::Warm => "warm",
            Undertone::Cool => "cool",
            Undertone::Neutral => "neutral",
        }
    }
}

impl SkinTone {
    pub fn from_rgb(rgb: [u8; 3]) -> Self {
        let [r, g, b] = rgb.map(f64::from);
        let luminance = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        let depth = match luminance {
            l if l > 200.0 => Depth::Fair,
            l if l > 170.0 => Depth::Light,
            l if l > 130.0 => Depth::Medium,
            l if l > 90.0 => Depth::Tan,
            _ => Depth::Deep,
        };

        // red-blue spread grows with golden undertones and shrinks with pink ones
        let spread = (r - b) / r.max(1.0);
        let undertone = if spread > 0.3 {
            Undertone::Warm
        } else if spread < 0.2 {
            Undertone::Cool
        } else {
            Undertone::Neutral
        };

        Self {
            rgb,
            hex: format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2]),
            depth,
            undertone,
        }
    }
}

/// Average colour of two cheek patches. `None` when the patches fall outside
/// the image.
pub fn sample_image(image: &RgbImage, face: &FaceLandmarks) -> Option<SkinTone> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let face_width = match (
        face.pixel(CHEEKBONE_LEFT, width, height),
        face.pixel(CHEEKBONE_RIGHT, width, height),
    ) {
        (Some((lx, _)), Some((rx, _))) => (rx - lx).abs(),
        _ => return None,
    };
    // landmarks come from another process; keep the patch inside the image
    let side = i64::from(width.min(height));
    let radius = ((face_width * 0.03).round() as i64).max(2).min(side);
    let (max_x, max_y) = (i64::from(width) - 1, i64::from(height) - 1);

    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for index in [CHEEK_LEFT, CHEEK_RIGHT] {
        let Some((cx, cy)) = face.pixel(index, width, height) else {
            continue;
        };
        let (cx, cy) = (cx.round() as i64, cy.round() as i64);
        let (x0, x1) = (cx.saturating_sub(radius).max(0), cx.saturating_add(radius).min(max_x));
        let (y0, y1) = (cy.saturating_sub(radius).max(0), cy.saturating_add(radius).min(max_y));
        if x0 > x1 || y0 > y1 {
            continue;
        }
        for y in y0..=y1 {
            for x in x0..=x1 {
                let pixel = image.get_pixel(x as u32, y as u32);
                for (channel, value) in sum.iter_mut().zip(pixel.0) {
                    *channel += value as u64;
                }
                count += 1;
            }
        }
    }

    if count == 0 {
        return None;
    }
    Some(SkinTone::from_rgb(sum.map(|s| (s / count) as u8)))
}

/// Decodes the staged image off the async runtime and samples it.
pub async fn sample(path: &Path, face: &FaceLandmarks) -> Option<SkinTone> {
    let path: PathBuf = path.to_path_buf();
    let face = face.clone();
    let result = tokio::task::spawn_blocking(move || {
        image::open(&path).map(|img| sample_image(&img.to_rgb8(), &face))
    })
    .await;

    match result {
        Ok(Ok(tone)) => tone,
        Ok(Err(e)) => {
            tracing::warn!("skin tone sampling skipped, decode failed: {}", e);
            None
        }
        Err(e) => {
            tracing::warn!("skin tone sampling task failed: {}", e);
            None
        }
    }
}
