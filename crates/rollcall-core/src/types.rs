use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box, in [0, 1].
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter_w = ((self.x + self.width).min(other.x + other.width) - self.x.max(other.x)).max(0.0);
        let inter_h =
            ((self.y + self.height).min(other.y + other.height) - self.y.max(other.y)).max(0.0);
        let inter = inter_w * inter_h;
        let union = self.area() + other.area() - inter;
        if union > 0.0 { inter / union } else { 0.0 }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two embeddings of equal dimensionality.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One detected face and the embedding computed for it.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceEncoding {
    pub region: BoundingBox,
    pub embedding: Embedding,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidIdentity {
    #[error("identity is empty")]
    Empty,
    #[error("identity {0:?} is reserved")]
    Reserved(String),
    #[error("identity {0:?} contains a path separator or control character")]
    IllegalCharacter(String),
}

/// Human-readable label for an enrolled person.
///
/// The identity doubles as the file stem of the person's reference image,
/// so it must be usable as a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Validate and normalize an identity (surrounding whitespace is trimmed).
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentity> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(InvalidIdentity::Empty);
        }
        if name.starts_with('.') {
            return Err(InvalidIdentity::Reserved(name.to_string()));
        }
        if name.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
            return Err(InvalidIdentity::IllegalCharacter(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An enrolled person: one identity, one embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub identity: Identity,
    pub embedding: Embedding,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 1.0, landmarks: None }
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.3, -0.2, 0.9]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_euclidean_distance_345() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_identical() {
        let a = bbox(0.0, 0.0, 100.0, 100.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_partial() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(5.0, 0.0, 10.0, 10.0);
        // 50 shared out of 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_identity_trims_whitespace() {
        let id = Identity::parse("  alice ").unwrap();
        assert_eq!(id.as_str(), "alice");
        assert_eq!(id.to_string(), "alice");
    }

    #[test]
    fn test_identity_allows_spaces_and_commas() {
        assert!(Identity::parse("Doe, Jane").is_ok());
        assert!(Identity::parse("Jean-Luc Picard").is_ok());
    }

    #[test]
    fn test_identity_rejects_empty() {
        assert_eq!(Identity::parse(""), Err(InvalidIdentity::Empty));
        assert_eq!(Identity::parse("   "), Err(InvalidIdentity::Empty));
    }

    #[test]
    fn test_identity_rejects_path_components() {
        assert!(matches!(Identity::parse(".."), Err(InvalidIdentity::Reserved(_))));
        assert!(matches!(Identity::parse(".hidden"), Err(InvalidIdentity::Reserved(_))));
        assert!(matches!(Identity::parse("a/b"), Err(InvalidIdentity::IllegalCharacter(_))));
        assert!(matches!(Identity::parse("a\\b"), Err(InvalidIdentity::IllegalCharacter(_))));
        assert!(matches!(Identity::parse("a\nb"), Err(InvalidIdentity::IllegalCharacter(_))));
    }
}
