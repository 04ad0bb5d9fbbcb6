//! Built-in recommendations served when Claude fails or answers with
//! something that is not the requested JSON.
//!
//! The content is deterministic and keyed on the measured features, so the
//! UI always gets the same shape of answer it gets from the model.

use crate::core::analysis::FaceAnalysis;
use crate::core::features::{EyeShape, EyeSpacing, FaceShape, LipFullness};
use crate::core::recommender::{MakeupLook, Recommendations};
use crate::core::skin_tone::Undertone;
use std::collections::BTreeMap;

struct Palette {
    neutrals: [&'static str; 3],
    accents: [&'static str; 2],
    lips: [&'static str; 3],
    blush: [&'static str; 2],
}

static WARM: Palette = Palette {
    neutrals: ["Camel", "Warm bronze", "Golden beige"],
    accents: ["Copper", "Olive green"],
    lips: ["Terracotta", "Warm coral", "Brick red"],
    blush: ["Peach", "Apricot"],
};

static COOL: Palette = Palette {
    neutrals: ["Taupe", "Mushroom grey", "Cool beige"],
    accents: ["Plum", "Navy"],
    lips: ["Berry", "Blue red", "Mauve pink"],
    blush: ["Cool pink", "Rose"],
};

static NEUTRAL: Palette = Palette {
    neutrals: ["Soft brown", "Champagne", "Beige"],
    accents: ["Bronze", "Dusty rose"],
    lips: ["Nude rose", "Classic red", "Soft pink"],
    blush: ["Rose gold", "Soft coral"],
};

const TOOLS: [&str; 4] = [
    "Damp makeup sponge",
    "Fluffy blending brush",
    "Angled contour brush",
    "Fine eyeliner brush",
];

fn contour_for(shape: FaceShape) -> [&'static str; 2] {
    match shape {
        FaceShape::Oval => [
            "Keep contour soft and just under the cheekbones",
            "Highlight the centre of the forehead and the chin",
        ],
        FaceShape::Round => [
            "Contour from the ears toward the mouth corners to add length",
            "Shade the sides of the forehead and the jaw",
        ],
        FaceShape::Square => [
            "Soften the jaw corners with contour blended downward",
            "Shade the outer corners of the forehead",
        ],
        FaceShape::Heart => [
            "Contour the temples and outer forehead",
            "Highlight the jaw and chin to balance the forehead",
        ],
        FaceShape::Oblong => [
            "Contour along the hairline and under the chin to shorten the face",
            "Keep blush and contour horizontal across the cheeks",
        ],
        FaceShape::Diamond => [
            "Highlight the forehead and chin to widen them",
            "Keep contour light on the cheekbones",
        ],
    }
}

fn priority_for(shape: FaceShape) -> &'static str {
    match shape {
        FaceShape::Oval => "Your proportions are balanced: invest in skin prep and let one feature lead",
        FaceShape::Round => "Vertical contour and highlight placement lengthen a round face",
        FaceShape::Square => "Soften the jaw corners and keep blush rounded",
        FaceShape::Heart => "Brighten the lower face to balance a wider forehead",
        FaceShape::Oblong => "Place blush and contour horizontally to shorten a long face",
        FaceShape::Diamond => "Widen the forehead and chin with highlight; the cheekbones need little help",
    }
}

fn eyeliner_for(shape: EyeShape) -> &'static str {
    match shape {
        EyeShape::Almond => "Thin line along the upper lashes with a subtle wing",
        EyeShape::Round => "Line thickened toward the outer corner and winged out to elongate",
        EyeShape::Narrow => "Tightlined upper waterline with a soft smudged lower line",
    }
}

fn spacing_tip(spacing: EyeSpacing) -> &'static str {
    match spacing {
        EyeSpacing::CloseSet => "Brighten the inner corners and keep depth on the outer third",
        EyeSpacing::Balanced => "Balanced spacing suits shadow spread evenly across the lid",
        EyeSpacing::WideSet => "Bring shadow toward the inner corner and run liner the full length",
    }
}

fn lip_avoid(lips: LipFullness) -> &'static str {
    match lips {
        LipFullness::Thin => "Dark matte lip colours that make lips look smaller",
        LipFullness::Medium => "Lip liner much darker than the lipstick",
        LipFullness::Full => "Heavy overlining",
    }
}

pub fn fallback_recommendations(analysis: &FaceAnalysis) -> Recommendations {
    let shape = analysis.face_shape.as_str();
    let eyes = analysis.eye_shape.as_str();
    let palette = match analysis.skin_tone.as_ref().map(|t| t.undertone) {
        Some(Undertone::Warm) => &WARM,
        Some(Undertone::Cool) => &COOL,
        Some(Undertone::Neutral) | None => &NEUTRAL,
    };
    let contour = contour_for(analysis.face_shape);
    let blush_placement = if analysis.has_prominent_cheekbones {
        "Sweep along the top of the cheekbones toward the temples"
    } else {
        "Apply to the apples of the cheeks and blend up toward the temples"
    };

    let (foundation_match, skin_tone_tips) = match &analysis.skin_tone {
        Some(tone) => (
            format!(
                "Match foundation at the jawline to your {} skin with its {} undertone",
                tone.depth.as_str(),
                tone.undertone.as_str()
            ),
            vec![
                format!(
                    "{} skin with a {} undertone suits {} and {}",
                    capitalize(tone.depth.as_str()),
                    tone.undertone.as_str(),
                    palette.accents[0].to_lowercase(),
                    palette.accents[1].to_lowercase()
                ),
                "Check every shade in daylight before committing".to_string(),
            ],
        ),
        None => (
            "Match foundation at the jawline in daylight".to_string(),
            vec![
                "Swatch foundation on the jawline and pick the shade that disappears".to_string(),
                "Check every shade in daylight before committing".to_string(),
            ],
        ),
    };

    let eyeliner_style = eyeliner_for(analysis.eye_shape).to_string();
    let recommended_looks = vec![
        MakeupLook {
            look_name: "Natural Everyday".to_string(),
            description: format!("A fresh, light look that works with your {} face", shape),
            foundation_tips: vec![
                foundation_match.clone(),
                "Apply a sheer layer with a damp sponge".to_string(),
            ],
            contour_tips: vec![
                contour[0].to_string(),
                "Blend until no edge is visible".to_string(),
            ],
            eyeshadow_colors: to_strings(&palette.neutrals),
            eyeliner_style: eyeliner_style.clone(),
            lip_colors: to_strings(&[palette.lips[0], palette.lips[2]]),
            blush_placement: blush_placement.to_string(),
            avoid: to_strings(&["Heavy contour in daylight", lip_avoid(analysis.lip_fullness)]),
            difficulty_level: "Beginner".to_string(),
            occasion: "Daily wear, work, casual outings".to_string(),
        },
        MakeupLook {
            look_name: "Evening Definition".to_string(),
            description: format!("More depth on the eyes and a defined {} outline", shape),
            foundation_tips: vec![
                "Use a medium coverage foundation and set the T-zone".to_string(),
                foundation_match.clone(),
            ],
            contour_tips: to_strings(&contour),
            eyeshadow_colors: to_strings(&[
                palette.neutrals[1],
                palette.accents[0],
                palette.neutrals[2],
            ]),
            eyeliner_style,
            lip_colors: to_strings(&[palette.lips[1], palette.lips[0]]),
            blush_placement: blush_placement.to_string(),
            avoid: to_strings(&["Strong eyes and a strong lip at the same time"]),
            difficulty_level: "Intermediate".to_string(),
            occasion: "Dinners, date nights, theatre".to_string(),
        },
        MakeupLook {
            look_name: "Special Occasion".to_string(),
            description: "A long-wearing, camera-ready look".to_string(),
            foundation_tips: vec![
                "Prime thoroughly and use a long-wear foundation".to_string(),
                foundation_match,
            ],
            contour_tips: vec![
                contour[1].to_string(),
                "Build contour and highlight in thin layers".to_string(),
            ],
            eyeshadow_colors: to_strings(&[
                palette.accents[0],
                palette.accents[1],
                palette.neutrals[0],
            ]),
            eyeliner_style: "Bold wing with a smudged lower lash line".to_string(),
            lip_colors: to_strings(&[palette.lips[1], palette.lips[2]]),
            blush_placement: blush_placement.to_string(),
            avoid: to_strings(&["Shimmer on the whole face under flash photography"]),
            difficulty_level: "Advanced".to_string(),
            occasion: "Weddings, galas, photoshoots".to_string(),
        },
    ];

    let color_palette = BTreeMap::from([
        ("neutrals".to_string(), to_strings(&palette.neutrals)),
        ("accents".to_string(), to_strings(&palette.accents)),
        ("lips".to_string(), to_strings(&palette.lips)),
        ("blush".to_string(), to_strings(&palette.blush)),
    ]);

    Recommendations {
        recommended_looks,
        face_shape_tips: to_strings(&contour),
        eye_shape_tips: vec![
            format!(
                "{} eyes: {}",
                capitalize(eyes),
                eyeliner_for(analysis.eye_shape).to_lowercase()
            ),
            spacing_tip(analysis.eye_spacing).to_string(),
        ],
        skin_tone_tips,
        recommended_tools: to_strings(&TOOLS),
        color_palette,
        top_priority_tip: priority_for(analysis.face_shape).to_string(),
        model: None,
        fallback: true,
        raw_text: None,
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
