//! Perceptual image hashing against an append-only in-process catalog.
//!
//! Hashes are 64-bit difference hashes: the image is reduced to 9x8
//! grayscale and each bit records whether a pixel is brighter than its right
//! neighbour. Scores are Hamming distance divided by 64, so `0.0` means
//! identical and `1.0` means every bit differs.

use std::sync::atomic::{AtomicU64, Ordering};

use image::imageops::FilterType;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const HASH_WIDTH: u32 = 9;
const HASH_HEIGHT: u32 = 8;
const HASH_BITS: f64 = 64.0;

/// Extensions never hashed even when the class is image.
const SKIPPED_EXTENSIONS: [&str; 2] = [".gif", ".webp"];

/// A 64-bit difference hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerceptualHash(u64);

impl PerceptualHash {
    /// Decodes `bytes` as an image and hashes it.
    ///
    /// # Errors
    ///
    /// Returns the decoder error when the bytes are not a supported image.
    pub fn from_image_bytes(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let image = image::load_from_memory(bytes)?;
        let small = image
            .resize_exact(HASH_WIDTH, HASH_HEIGHT, FilterType::Triangle)
            .to_luma8();

        let mut bits = 0u64;
        for y in 0..HASH_HEIGHT {
            for x in 0..HASH_WIDTH - 1 {
                let left = small.get_pixel(x, y).0[0];
                let right = small.get_pixel(x + 1, y).0[0];
                bits = (bits << 1) | u64::from(left > right);
            }
        }
        Ok(Self(bits))
    }

    #[must_use]
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[must_use]
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Normalized Hamming distance in `0.0..=1.0`.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        f64::from((self.0 ^ other.0).count_ones()) / HASH_BITS
    }
}

/// One catalog hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HashMatch {
    pub id: u64,
    pub score: f64,
}

/// Append-only list of hashes seen this run.
#[derive(Debug, Default)]
pub struct HashCatalog {
    entries: Vec<(u64, PerceptualHash)>,
}

impl HashCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: u64, hash: PerceptualHash) {
        self.entries.push((id, hash));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry scored against `hash`, best (lowest) first.
    #[must_use]
    pub fn query(&self, hash: PerceptualHash) -> Vec<HashMatch> {
        let mut matches: Vec<HashMatch> = self
            .entries
            .iter()
            .map(|(id, entry)| HashMatch {
                id: *id,
                score: hash.distance(*entry),
            })
            .collect();
        matches.sort_by(|a, b| a.score.total_cmp(&b.score));
        matches
    }
}

/// Process-wide monotonic id handed to each download attempt.
#[derive(Debug, Default)]
pub struct DownloadIdCounter(AtomicU64);

impl DownloadIdCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next id, starting at 1.
    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[must_use]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Skips images that look like one already saved.
#[derive(Debug)]
pub struct DuplicateDetector {
    enabled: bool,
    threshold: f64,
    catalog: RwLock<HashCatalog>,
}

impl DuplicateDetector {
    #[must_use]
    pub fn new(enabled: bool, threshold: f64) -> Self {
        Self {
            enabled,
            threshold,
            catalog: RwLock::new(HashCatalog::new()),
        }
    }

    /// A detector that never reports duplicates.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(false, 0.0)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns true when the detector applies to this class and extension.
    #[must_use]
    pub fn applies_to(&self, class: &str, extension: &str) -> bool {
        self.enabled && class == "image" && !SKIPPED_EXTENSIONS.contains(&extension)
    }

    /// Checks `bytes` against the catalog, adding them under `download_id`
    /// when they are not a duplicate.
    ///
    /// Decoding runs on the blocking pool. Undecodable images and failed
    /// hashing tasks are logged and treated as unique.
    pub async fn is_duplicate(
        &self,
        bytes: &[u8],
        class: &str,
        extension: &str,
        download_id: u64,
    ) -> bool {
        if !self.applies_to(class, extension) {
            return false;
        }

        let data = bytes.to_vec();
        let hash = match tokio::task::spawn_blocking(move || PerceptualHash::from_image_bytes(&data))
            .await
        {
            Ok(Ok(hash)) => hash,
            Ok(Err(e)) => {
                warn!(error = %e, "could not decode image for hashing");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "image hashing task failed");
                return false;
            }
        };

        // Held across query and insert so concurrent copies cannot both pass.
        let mut catalog = self.catalog.write().await;
        if let Some(best) = catalog.query(hash).first()
            && best.score < self.threshold
        {
            info!(score = best.score, matched = best.id, "duplicate image detected");
            return true;
        }
        catalog.add(download_id, hash);
        debug!(id = download_id, size = catalog.len(), "image cataloged");
        false
    }

    /// Number of cataloged images.
    pub async fn catalog_len(&self) -> usize {
        self.catalog.read().await.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Luma};
    use std::io::Cursor;

    /// PNG gradient; `flip` reverses its direction.
    fn gradient_png(flip: bool) -> Vec<u8> {
        let img = ImageBuffer::from_fn(32, 32, |x, _| {
            let v = u8::try_from(x * 8).unwrap();
            Luma([if flip { 255 - v } else { v }])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    // ==================== Hash Tests ====================

    #[test]
    fn test_distance_bounds() {
        let a = PerceptualHash::from_bits(0);
        let b = PerceptualHash::from_bits(u64::MAX);
        assert!((a.distance(a) - 0.0).abs() < f64::EPSILON);
        assert!((a.distance(b) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_identical_images_hash_equal() {
        let a = PerceptualHash::from_image_bytes(&gradient_png(false)).unwrap();
        let b = PerceptualHash::from_image_bytes(&gradient_png(false)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_opposite_gradients_are_far_apart() {
        let a = PerceptualHash::from_image_bytes(&gradient_png(false)).unwrap();
        let b = PerceptualHash::from_image_bytes(&gradient_png(true)).unwrap();
        assert!(a.distance(b) > 0.5);
    }

    #[test]
    fn test_catalog_query_sorted_ascending() {
        let mut catalog = HashCatalog::new();
        catalog.add(1, PerceptualHash::from_bits(0xFF));
        catalog.add(2, PerceptualHash::from_bits(0x01));
        let matches = catalog.query(PerceptualHash::from_bits(0));
        assert_eq!(matches[0].id, 2);
        assert_eq!(matches[1].id, 1);
    }

    #[test]
    fn test_counter_is_monotonic() {
        let counter = DownloadIdCounter::new();
        assert_eq!(counter.next_id(), 1);
        assert_eq!(counter.next_id(), 2);
        assert_eq!(counter.current(), 2);
    }

    // ==================== Detector Tests ====================

    #[tokio::test]
    async fn test_second_copy_is_duplicate() {
        let detector = DuplicateDetector::new(true, 0.1);
        let png = gradient_png(false);
        assert!(!detector.is_duplicate(&png, "image", ".png", 1).await);
        assert!(detector.is_duplicate(&png, "image", ".png", 2).await);
        assert_eq!(detector.catalog_len().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_images_are_cataloged() {
        let detector = DuplicateDetector::new(true, 0.1);
        assert!(!detector.is_duplicate(&gradient_png(false), "image", ".png", 1).await);
        assert!(!detector.is_duplicate(&gradient_png(true), "image", ".png", 2).await);
        assert_eq!(detector.catalog_len().await, 2);
    }

    #[tokio::test]
    async fn test_zero_threshold_never_matches() {
        let detector = DuplicateDetector::new(true, 0.0);
        let png = gradient_png(false);
        assert!(!detector.is_duplicate(&png, "image", ".png", 1).await);
        assert!(!detector.is_duplicate(&png, "image", ".png", 2).await);
    }

    #[tokio::test]
    async fn test_skips_gif_webp_and_non_images() {
        let detector = DuplicateDetector::new(true, 0.5);
        let png = gradient_png(false);
        assert!(!detector.applies_to("image", ".gif"));
        assert!(!detector.applies_to("image", ".webp"));
        assert!(!detector.applies_to("video", ".mp4"));
        assert!(!detector.is_duplicate(&png, "video", ".mp4", 1).await);
        assert_eq!(detector.catalog_len().await, 0);
    }

    #[tokio::test]
    async fn test_disabled_detector_never_checks() {
        let detector = DuplicateDetector::disabled();
        let png = gradient_png(false);
        assert!(!detector.is_duplicate(&png, "image", ".png", 1).await);
        assert!(!detector.is_duplicate(&png, "image", ".png", 2).await);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_hashing_yields_to_other_tasks() {
        use std::sync::Arc;
        use std::sync::atomic::AtomicBool;

        let img = ImageBuffer::from_fn(1024, 1024, |x, y| Luma([u8::try_from((x ^ y) & 0xFF).unwrap()]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        let png = out.into_inner();

        let detector = Arc::new(DuplicateDetector::new(true, 0.1));
        let ticked = Arc::new(AtomicBool::new(false));

        let hashing = {
            let detector = Arc::clone(&detector);
            let ticked = Arc::clone(&ticked);
            tokio::spawn(async move {
                let duplicate = detector.is_duplicate(&png, "image", ".png", 1).await;
                (duplicate, ticked.load(Ordering::SeqCst))
            })
        };
        let ticker = {
            let ticked = Arc::clone(&ticked);
            tokio::spawn(async move { ticked.store(true, Ordering::SeqCst) })
        };

        let (duplicate, ticked_during_hash) = hashing.await.unwrap();
        ticker.await.unwrap();
        assert!(!duplicate);
        assert!(ticked_during_hash, "decoding held the runtime thread");
        assert_eq!(detector.catalog_len().await, 1);
    }

    #[tokio::test]
    async fn test_undecodable_image_is_not_duplicate() {
        let detector = DuplicateDetector::new(true, 0.5);
        assert!(!detector.is_duplicate(b"not an image", "image", ".png", 1).await);
        assert!(!detector.is_duplicate(b"not an image", "image", ".png", 2).await);
        assert_eq!(detector.catalog_len().await, 0);
    }
}
