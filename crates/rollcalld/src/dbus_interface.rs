use crate::engine::{EngineError, EngineHandle};
use rollcall_roster::{AttendanceService, RosterError, Verification};
use std::sync::Arc;
use zbus::interface;

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

/// D-Bus interface for the rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct RollcallService {
    engine: EngineHandle,
    service: Arc<AttendanceService>,
}

impl RollcallService {
    pub fn new(engine: EngineHandle, service: Arc<AttendanceService>) -> Self {
        Self { engine, service }
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl RollcallService {
    /// Enroll or replace an identity from an encoded JPEG/PNG image.
    /// Returns the stored identity.
    async fn enroll(&self, identity: &str, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(identity, bytes = image.len(), "enroll requested");
        match self.engine.enroll(identity.to_string(), image).await {
            Ok(stored) => Ok(stored.to_string()),
            Err(err) => {
                log_failure("enroll", &err);
                Err(to_fdo_error(err))
            }
        }
    }

    /// Identify the face in an encoded image and record attendance on a match.
    /// Returns a JSON object describing the outcome.
    async fn verify(&self, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(bytes = image.len(), "verify requested");
        let result = self.engine.verify(image).await;
        if let Err(err) = &result {
            log_failure("verify", err);
        }
        verify_reply(result)
    }

    /// Rebuild the enrollment store from disk. Returns the number of identities loaded.
    async fn reload(&self) -> zbus::fdo::Result<u32> {
        tracing::info!("reload requested");
        match self.engine.reload().await {
            Ok(report) => Ok(u32::try_from(report.loaded).unwrap_or(u32::MAX)),
            Err(err) => {
                log_failure("reload", &err);
                Err(to_fdo_error(err))
            }
        }
    }

    /// List enrolled identities as a JSON array.
    async fn list_identities(&self) -> zbus::fdo::Result<String> {
        let identities = self.service.identities();
        serde_json::to_string(&identities).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let config = self.service.config();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "enrolled": self.service.store().len(),
            "faces_dir": self.service.store().dir().display().to_string(),
            "attendance_log": self.service.recorder().path().display().to_string(),
            "match_threshold": config.threshold,
            "enroll": config.enroll,
            "verify": config.verify,
        })
        .to_string())
    }
}

/// Map a verification result to the JSON reply.
///
/// No face in the image is an outcome, not an error.
fn verify_reply(result: Result<Verification, EngineError>) -> zbus::fdo::Result<String> {
    let reply = match result {
        Ok(Verification::Identified { identity, distance, timestamp }) => serde_json::json!({
            "identified": true,
            "identity": identity,
            "timestamp": timestamp,
            "distance": distance,
        }),
        Ok(Verification::Unknown { faces }) => serde_json::json!({
            "identified": false,
            "reason": "unknown",
            "faces": faces,
        }),
        Err(EngineError::Roster(RosterError::NoFaceDetected)) => serde_json::json!({
            "identified": false,
            "reason": "no_face",
        }),
        Err(err) => return Err(to_fdo_error(err)),
    };
    Ok(reply.to_string())
}

fn to_fdo_error(err: EngineError) -> zbus::fdo::Error {
    match err {
        EngineError::Roster(RosterError::InvalidInput(msg)) => zbus::fdo::Error::InvalidArgs(msg),
        other => zbus::fdo::Error::Failed(other.to_string()),
    }
}

fn log_failure(op: &str, err: &EngineError) {
    match err {
        EngineError::Roster(e) if e.is_expected() => tracing::info!(op, error = %e, "request rejected"),
        e => tracing::error!(op, error = %e, "request failed"),
    }
}
