//! Dust classification
//!
//! The classifier is an external collaborator: anything that can turn a
//! panel id into a dust level and a confidence. Two implementations ship
//! here, a seeded random one for demos and a brightness heuristic over raw
//! grayscale frames.

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use solarsage_core::{compute_frame_hash, frame_ref, ClassifierError, PanelId};
use std::path::PathBuf;
use std::sync::Mutex;

/// Raw classifier output, before it becomes a `PanelObservation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Normalized obstruction in [0, 1]
    pub dust_level: f64,
    /// In [0, 1]
    pub confidence: f64,
    pub image_ref: String,
}

impl Classification {
    /// Reject readings that are not numbers. Out-of-range values are clamped later.
    pub fn validate(self) -> Result<Self, ClassifierError> {
        if !self.dust_level.is_finite() {
            return Err(ClassifierError::InvalidReading {
                field: "dust_level".to_string(),
                value: self.dust_level.to_string(),
            });
        }
        if !self.confidence.is_finite() {
            return Err(ClassifierError::InvalidReading {
                field: "confidence".to_string(),
                value: self.confidence.to_string(),
            });
        }
        Ok(self)
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short name for logs and health reports.
    fn name(&self) -> &str;

    async fn classify(&self, panel_id: &PanelId) -> Result<Classification, ClassifierError>;
}

// ============================================================================
// SIMULATED
// ============================================================================

/// Random readings in the demo ranges: dust 40-85 %, confidence 82-95 %.
pub struct SimulatedClassifier {
    rng: Mutex<StdRng>,
}

impl SimulatedClassifier {
    pub const DUST_RANGE: (f64, f64) = (0.40, 0.85);
    pub const CONFIDENCE_RANGE: (f64, f64) = (0.82, 0.95);

    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for SimulatedClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for SimulatedClassifier {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn classify(&self, panel_id: &PanelId) -> Result<Classification, ClassifierError> {
        let mut rng = self.rng.lock().map_err(|_| ClassifierError::Unavailable {
            reason: "simulated classifier rng poisoned".to_string(),
        })?;
        let (dust_min, dust_max) = Self::DUST_RANGE;
        let (conf_min, conf_max) = Self::CONFIDENCE_RANGE;
        let dust_level = rng.random_range(dust_min..=dust_max);
        let confidence = rng.random_range(conf_min..=conf_max);
        Ok(Classification {
            dust_level,
            confidence,
            image_ref: format!("sim://{}/{}", panel_id, Utc::now().timestamp_millis()),
        })
    }
}

// ============================================================================
// BRIGHTNESS HEURISTIC
// ============================================================================

/// Supplies the latest 8-bit grayscale frame for a panel.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn latest_frame(&self, panel_id: &PanelId) -> Result<Vec<u8>, ClassifierError>;
}

/// Frames stored as `<root>/<panel_id>.gray`, one byte per pixel.
#[derive(Debug, Clone)]
pub struct DirectoryFrameSource {
    root: PathBuf,
}

impl DirectoryFrameSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn frame_path(&self, panel_id: &PanelId) -> PathBuf {
        self.root.join(format!("{}.gray", panel_id))
    }
}

#[async_trait]
impl FrameSource for DirectoryFrameSource {
    async fn latest_frame(&self, panel_id: &PanelId) -> Result<Vec<u8>, ClassifierError> {
        let path = self.frame_path(panel_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ClassifierError::FrameMissing {
                    panel_id: panel_id.clone(),
                })
            }
            Err(e) => Err(ClassifierError::Unavailable {
                reason: format!("reading {}: {}", path.display(), e),
            }),
        }
    }
}

/// Mean brightness at or above which a panel reads as clean.
const CLEAN_BRIGHTNESS: f64 = 200.0;
/// Brightness drop over which dust goes from 0 to 1.
const BRIGHTNESS_SPAN: f64 = 120.0;

/// Dust level from the mean brightness of a grayscale frame; `None` for an empty frame.
pub fn brightness_dust_level(frame: &[u8]) -> Option<f64> {
    if frame.is_empty() {
        return None;
    }
    let sum: u64 = frame.iter().map(|&p| u64::from(p)).sum();
    let mean = sum as f64 / frame.len() as f64;
    Some(((CLEAN_BRIGHTNESS - mean) / BRIGHTNESS_SPAN).clamp(0.0, 1.0))
}

/// Dust from frame brightness: darker frames mean more dust.
pub struct BrightnessClassifier<S> {
    source: S,
    confidence: f64,
}

impl<S: FrameSource> BrightnessClassifier<S> {
    pub const DEFAULT_CONFIDENCE: f64 = 0.85;

    pub fn new(source: S) -> Self {
        Self {
            source,
            confidence: Self::DEFAULT_CONFIDENCE,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

#[async_trait]
impl<S: FrameSource> Classifier for BrightnessClassifier<S> {
    fn name(&self) -> &str {
        "brightness"
    }

    async fn classify(&self, panel_id: &PanelId) -> Result<Classification, ClassifierError> {
        let frame = self.source.latest_frame(panel_id).await?;
        let dust_level =
            brightness_dust_level(&frame).ok_or_else(|| ClassifierError::InvalidReading {
                field: "frame".to_string(),
                value: "empty".to_string(),
            })?;
        Ok(Classification {
            dust_level,
            confidence: self.confidence,
            image_ref: frame_ref(&compute_frame_hash(&frame)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel(id: &str) -> PanelId {
        PanelId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_simulated_ranges() {
        let classifier = SimulatedClassifier::seeded(7);
        for _ in 0..200 {
            let c = classifier.classify(&panel("panel_01")).await.unwrap();
            assert!((0.40..=0.85).contains(&c.dust_level));
            assert!((0.82..=0.95).contains(&c.confidence));
            assert!(c.image_ref.starts_with("sim://panel_01/"));
        }
    }

    #[tokio::test]
    async fn test_simulated_seed_is_reproducible() {
        let a = SimulatedClassifier::seeded(42);
        let b = SimulatedClassifier::seeded(42);
        let p = panel("panel_02");
        let ca = a.classify(&p).await.unwrap();
        let cb = b.classify(&p).await.unwrap();
        assert_eq!(ca.dust_level, cb.dust_level);
        assert_eq!(ca.confidence, cb.confidence);
    }

    #[test]
    fn test_brightness_mapping() {
        assert_eq!(brightness_dust_level(&[]), None);
        assert_eq!(brightness_dust_level(&[255; 16]), Some(0.0));
        assert_eq!(brightness_dust_level(&[200; 16]), Some(0.0));
        assert_eq!(brightness_dust_level(&[80; 16]), Some(1.0));
        assert_eq!(brightness_dust_level(&[0; 16]), Some(1.0));
        assert_eq!(brightness_dust_level(&[140; 16]), Some(0.5));
    }

    #[tokio::test]
    async fn test_brightness_classifier_reads_directory() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectoryFrameSource::new(dir.path());
        let p = panel("panel_03");
        std::fs::write(source.frame_path(&p), vec![140u8; 64]).unwrap();

        let classifier = BrightnessClassifier::new(source);
        let c = classifier.classify(&p).await.unwrap();
        assert_eq!(c.dust_level, 0.5);
        assert_eq!(c.confidence, 0.85);
        assert!(c.image_ref.starts_with("sha256:"));
    }

    #[tokio::test]
    async fn test_brightness_classifier_missing_frame() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = BrightnessClassifier::new(DirectoryFrameSource::new(dir.path()));
        let p = panel("panel_04");
        let err = classifier.classify(&p).await.unwrap_err();
        assert_eq!(err, ClassifierError::FrameMissing { panel_id: p });
    }

    #[test]
    fn test_frame_path_stays_under_root() {
        let source = DirectoryFrameSource::new("/var/lib/solarsage/frames");
        for id in ["panel_01", "..", "row.2"] {
            let path = source.frame_path(&panel(id));
            assert_eq!(path.parent(), Some(std::path::Path::new("/var/lib/solarsage/frames")));
        }
        assert!(PanelId::new("/etc/x").is_err());
    }

    #[test]
    fn test_validate_rejects_nan() {
        let reading = Classification {
            dust_level: f64::NAN,
            confidence: 0.9,
            image_ref: String::new(),
        };
        assert!(matches!(
            reading.validate(),
            Err(ClassifierError::InvalidReading { .. })
        ));
    }
}
