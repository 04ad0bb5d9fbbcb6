pub mod analysis;
pub mod fallback;
pub mod features;
pub mod landmarks;
pub mod recommender;
pub mod skin_tone;
pub mod uploads;
