use rollcall_core::{EmbeddingProvider, Identity};
use rollcall_roster::{AttendanceService, ReloadReport, RosterError, Verification};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Enroll {
        identity: String,
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Identity, RosterError>>,
    },
    Verify {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Verification, RosterError>>,
    },
    Reload {
        reply: oneshot::Sender<Result<ReloadReport, RosterError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Enroll (or replace) `identity` from an encoded image.
    pub async fn enroll(&self, identity: String, image: Vec<u8>) -> Result<Identity, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Enroll { identity, image, reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Identify a face in an encoded image, recording attendance on a match.
    pub async fn verify(&self, image: Vec<u8>) -> Result<Verification, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Verify { image, reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Rebuild the enrollment store from the reference images on disk.
    pub async fn reload(&self) -> Result<ReloadReport, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Reload { reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    async fn send(&self, req: EngineRequest) -> Result<(), EngineError> {
        self.tx.send(req).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns `provider`, so inference never runs on the async runtime
/// and requests are served one at a time in arrival order. The loop ends when
/// every [`EngineHandle`] has been dropped.
pub fn spawn_engine<P>(
    mut provider: P,
    service: Arc<AttendanceService>,
) -> Result<EngineHandle, EngineError>
where
    P: EmbeddingProvider + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll { identity, image, reply } => {
                        let result = service.enroll(&mut provider, &identity, &image);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Verify { image, reply } => {
                        let result = service.verify(&mut provider, &image);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Reload { reply } => {
                        let result = service.reload(&mut provider);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
