//! rollcall-core: face embedding and matching engine.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime, behind the [`EmbeddingProvider`] trait.
//! Identification is a nearest-neighbor search over enrolled embeddings.

pub mod alignment;
pub mod detector;
pub mod matcher;
pub mod provider;
pub mod recognizer;
pub mod types;

pub use matcher::{EuclideanMatcher, MatchError, MatchOutcome, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use provider::{DetectionMode, EmbeddingProvider, EncodeOptions, OnnxProvider, ProviderError};
pub use types::{BoundingBox, Embedding, EnrollmentRecord, FaceEncoding, Identity, InvalidIdentity};
