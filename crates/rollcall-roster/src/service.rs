//! The enroll / verify contract offered to transports.
//!
//! Transports hand over raw encoded image bytes and translate the returned
//! `Result` into their own protocol. The provider is passed per call so the
//! caller decides which thread owns inference state.

use crate::attendance::{AttendanceEvent, AttendanceRecorder};
use crate::error::RosterError;
use crate::store::{decode_image, EnrollmentStore, ReloadReport};
use rollcall_core::{
    EmbeddingProvider, EncodeOptions, EuclideanMatcher, Identity, MatchOutcome, Matcher,
    DEFAULT_MATCH_THRESHOLD,
};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceConfig {
    /// Euclidean distance a match must stay strictly below.
    pub threshold: f32,
    /// Provider settings for enrollment and reload (slower, more accurate).
    pub enroll: EncodeOptions,
    /// Provider settings for verification (faster).
    pub verify: EncodeOptions,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            enroll: EncodeOptions::enrollment(),
            verify: EncodeOptions::verification(),
        }
    }
}

/// Result of a verification that found at least one face.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Verification {
    /// A face matched and an attendance event was recorded at `timestamp`.
    Identified {
        identity: Identity,
        distance: f32,
        timestamp: String,
    },
    /// Faces were found but none matched an enrolled identity.
    Unknown { faces: usize },
}

pub struct AttendanceService {
    store: EnrollmentStore,
    recorder: AttendanceRecorder,
    config: ServiceConfig,
}

impl AttendanceService {
    /// Open the attendance log and set up an (empty) store over `faces_dir`.
    ///
    /// Call [`reload`](Self::reload) to populate the store.
    pub fn open(
        faces_dir: impl Into<PathBuf>,
        log_path: impl Into<PathBuf>,
        config: ServiceConfig,
    ) -> Result<Self, RosterError> {
        let recorder = AttendanceRecorder::open(log_path)?;
        let store = EnrollmentStore::new(faces_dir, config.enroll);
        Ok(Self { store, recorder, config })
    }

    pub fn store(&self) -> &EnrollmentStore {
        &self.store
    }

    pub fn recorder(&self) -> &AttendanceRecorder {
        &self.recorder
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn reload(&self, provider: &mut dyn EmbeddingProvider) -> Result<ReloadReport, RosterError> {
        self.store.reload(provider)
    }

    pub fn enroll(
        &self,
        provider: &mut dyn EmbeddingProvider,
        identity: &str,
        image: &[u8],
    ) -> Result<Identity, RosterError> {
        self.store.enroll(provider, identity, image)
    }

    /// Identify the first matching face in `image` and record attendance for it.
    ///
    /// Faces are tried in detection order; the first accepted match wins and
    /// later faces are not examined. Zero detected faces is `NoFaceDetected`.
    pub fn verify(
        &self,
        provider: &mut dyn EmbeddingProvider,
        image: &[u8],
    ) -> Result<Verification, RosterError> {
        let decoded = decode_image(image)?;
        let faces = provider.detect_and_encode(&decoded, &self.config.verify)?;
        tracing::debug!(faces = faces.len(), "verify: faces detected");
        if faces.is_empty() {
            return Err(RosterError::NoFaceDetected);
        }

        let gallery = self.store.all();
        let matcher = EuclideanMatcher;

        for (i, face) in faces.iter().enumerate() {
            match matcher.compare(&face.embedding, &gallery, self.config.threshold)? {
                MatchOutcome::Identified { identity, distance } => {
                    let timestamp = self.recorder.record(&identity)?;
                    tracing::info!(identity = %identity, distance, face = i, "verify: identified");
                    return Ok(Verification::Identified { identity, distance, timestamp });
                }
                MatchOutcome::NoMatch { nearest } => {
                    tracing::debug!(face = i, ?nearest, "verify: face not recognized");
                }
            }
        }

        tracing::info!(faces = faces.len(), enrolled = gallery.len(), "verify: unknown face");
        Ok(Verification::Unknown { faces: faces.len() })
    }

    pub fn identities(&self) -> Vec<Identity> {
        self.store.identities()
    }

    pub fn events(&self) -> Result<Vec<AttendanceEvent>, RosterError> {
        self.recorder.events()
    }
}
