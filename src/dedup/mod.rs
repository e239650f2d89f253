//! Duplicate suppression.
//!
//! Two tiers: links already recorded for a channel are dropped before any
//! request is made ([`filter_already_downloaded`]); images that look like one
//! already seen this run are skipped after download ([`DuplicateDetector`]).

mod perceptual;
mod precheck;

pub use perceptual::{
    DownloadIdCounter, DuplicateDetector, HashCatalog, HashMatch, PerceptualHash,
};
pub use precheck::filter_already_downloaded;
